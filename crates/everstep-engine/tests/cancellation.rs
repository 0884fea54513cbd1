//! Durable cancellation pre-empts step execution: no closure call, no new
//! step row, and the state is observable from a second store on the same
//! file.

#![cfg(feature = "sqlite-persistence")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use everstep_engine::{step, DurableContext, SqliteStore, StepError, Store};

fn test_db_path(name: &str) -> std::path::PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("everstep-{name}-{ts}.sqlite"))
}

#[test]
fn cancelled_workflow_rejects_steps_without_store_writes() {
    let path = test_db_path("cancel");
    let store = Arc::new(SqliteStore::new(&path));
    store.cancel_workflow("w6").unwrap();

    let ctx = DurableContext::new("w6", Arc::clone(&store) as Arc<dyn Store>);
    let calls = AtomicUsize::new(0);
    let err = step::run::<String, _>(&ctx, "any", || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok("x".to_string())
    })
    .unwrap_err();

    assert!(matches!(err, StepError::Cancelled { workflow_id } if workflow_id == "w6"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.find("w6", "any#1").unwrap(), None);
}

#[test]
fn cancellation_is_durable_and_visible_to_other_stores() {
    let path = test_db_path("cancel-durable");
    {
        let store = SqliteStore::new(&path);
        store.cancel_workflow("w7").unwrap();
    }

    // A different process holding a store on the same file sees it.
    let other = Arc::new(SqliteStore::new(&path));
    assert!(other.is_cancelled("w7").unwrap());

    let ctx = DurableContext::new("w7", other as Arc<dyn Store>);
    let err = ctx.check_cancelled().unwrap_err();
    assert!(matches!(err, StepError::Cancelled { .. }));
}

#[test]
fn steps_completed_before_cancellation_stay_memoized() {
    let path = test_db_path("cancel-after-steps");
    let store = Arc::new(SqliteStore::new(&path));

    let ctx = DurableContext::new("w8", Arc::clone(&store) as Arc<dyn Store>);
    let _: String = step::run(&ctx, "prepare", || Ok("done".to_string())).unwrap();

    store.cancel_workflow("w8").unwrap();

    // New steps are rejected, but the memo survives for inspection.
    let ctx2 = DurableContext::new("w8", Arc::clone(&store) as Arc<dyn Store>);
    let err = step::run::<String, _>(&ctx2, "prepare", || Ok("again".to_string())).unwrap_err();
    assert!(matches!(err, StepError::Cancelled { .. }));
    assert_eq!(store.completed_steps("w8").unwrap().len(), 1);
}
