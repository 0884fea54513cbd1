//! Everstep: a durable workflow execution engine.
//!
//! Application code expresses a multi-step business process as ordinary
//! imperative Rust; every completed step is memoized in a store keyed by
//! `(workflow_id, step_key)`, so a restarted process re-runs the workflow
//! function and skips every step that already committed. Steps execute
//! at-least-once; idempotency of external side effects stays with the caller.

pub mod engine;

pub use engine::context::{Compensation, DurableContext};
pub use engine::error::{BoxError, StepError};
pub use engine::identity::{step_key, Seq, StepKey, WorkflowId};
pub use engine::metrics;
pub use engine::record::{StepRecord, WorkflowRecord};
pub use engine::retry::RetryPolicy;
pub use engine::sequence::SequenceManager;
#[cfg(feature = "sqlite-persistence")]
pub use engine::sqlite_store::SqliteStore;
pub use engine::status::{StepStatus, WorkflowStatus};
pub use engine::step;
pub use engine::store::{now_millis, InMemoryStore, Store, StoreError};
