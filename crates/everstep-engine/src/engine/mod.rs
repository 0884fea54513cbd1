//! Engine internals.
//!
//! Minimal complete set of pieces: Store (the memo table is the source of
//! truth), DurableContext (per-workflow runtime: naming, compensation stack,
//! cancellation check), step executor (lookup → mark-running → execute →
//! mark-completed), saga driver (LIFO compensation on failure), RetryPolicy,
//! and process-wide metrics.

pub mod context;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod record;
pub mod retry;
pub mod sequence;
#[cfg(feature = "sqlite-persistence")]
pub mod sqlite_store;
pub mod status;
pub mod step;
pub mod store;
