//! Memoized steps survive a store close and reopen on the same file:
//! completed work is never re-run, distinct names memoize independently,
//! and outputs round-trip through the serialized form.

#![cfg(feature = "sqlite-persistence")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use everstep_engine::{step, DurableContext, SqliteStore, Store};

fn test_db_path(name: &str) -> std::path::PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("everstep-{name}-{ts}.sqlite"))
}

#[test]
fn step_is_memoized_across_store_reopen() {
    let path = test_db_path("memoized-reopen");
    let calls = AtomicUsize::new(0);

    {
        let store = Arc::new(SqliteStore::new(&path));
        let ctx = DurableContext::new("w1", store as Arc<dyn Store>);
        let result: String = step::run(&ctx, "s", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("A".to_string())
        })
        .unwrap();
        assert_eq!(result, "A");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    // Restart: new store on the same file, new context with the same id.
    let store = Arc::new(SqliteStore::new(&path));
    let ctx = DurableContext::new("w1", store as Arc<dyn Store>);
    let result: String = step::run(&ctx, "s", || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok("A".to_string())
    })
    .unwrap();

    assert_eq!(result, "A");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "closure must not re-run");
}

#[test]
fn distinct_steps_get_distinct_keys_and_rows() {
    let path = test_db_path("distinct-steps");
    let store = Arc::new(SqliteStore::new(&path));
    let ctx = DurableContext::new("w2", Arc::clone(&store) as Arc<dyn Store>);

    let ra: String = step::run(&ctx, "a", || Ok("ra".to_string())).unwrap();
    let rb: String = step::run(&ctx, "b", || Ok("rb".to_string())).unwrap();
    assert_eq!(ra, "ra");
    assert_eq!(rb, "rb");

    let completed = store.completed_steps("w2").unwrap();
    let keys: Vec<&str> = completed.iter().map(|r| r.step_key.as_str()).collect();
    assert_eq!(keys, ["a#1", "b#2"]);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Provisioned {
    asset_tag: String,
    warranty_months: u32,
}

#[test]
fn structured_output_round_trips_through_the_memo() {
    let path = test_db_path("struct-roundtrip");
    let original = Provisioned {
        asset_tag: "LT-0042".to_string(),
        warranty_months: 36,
    };

    {
        let store = Arc::new(SqliteStore::new(&path));
        let ctx = DurableContext::new("w3", store as Arc<dyn Store>);
        let value = original.clone();
        let result: Provisioned = step::run(&ctx, "provision", move || Ok(value)).unwrap();
        assert_eq!(result, original);
    }

    let store = Arc::new(SqliteStore::new(&path));
    let ctx = DurableContext::new("w3", Arc::clone(&store) as Arc<dyn Store>);
    let memoized: Provisioned =
        step::run(&ctx, "provision", || panic!("closure must not run")).unwrap();
    assert_eq!(memoized, original);

    // The stored output is the canonical serialized form of the result.
    let record = store.find("w3", "provision#1").unwrap().expect("record");
    let decoded: Provisioned = serde_json::from_str(record.output.as_deref().unwrap()).unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn zombie_running_row_is_re_executed_on_the_next_run() {
    let path = test_db_path("zombie");
    {
        // A prior process died mid-execution: the row is stuck RUNNING.
        let store = SqliteStore::new(&path);
        store.mark_running("w4", "deploy#1", "deploy", 1).unwrap();
    }

    let store = Arc::new(SqliteStore::new(&path));
    let ctx = DurableContext::new("w4", Arc::clone(&store) as Arc<dyn Store>);
    let calls = AtomicUsize::new(0);
    let result: String = step::run(&ctx, "deploy", || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok("deployed".to_string())
    })
    .unwrap();

    assert_eq!(result, "deployed");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "zombie must not be memoized");
    let record = store.find("w4", "deploy#1").unwrap().expect("record");
    assert!(record.is_completed());
}
