//! Identity types for the engine.
//!
//! WorkflowId identifies one workflow instance (the unit of memoization and
//! cancellation); Seq is the per-run step sequence number; StepKey is the
//! `"<name>#<seq>"` string keying a step's memo record within a workflow.

/// Identifies a workflow instance. Opaque, chosen by the caller.
pub type WorkflowId = String;

/// Per-run step sequence number, assigned by
/// [SequenceManager](crate::engine::sequence::SequenceManager).
pub type Seq = u64;

/// Memo key of a step within a workflow: `"<step_name>#<sequence_id>"`.
pub type StepKey = String;

/// Derives the memo key for a step name and sequence number.
///
/// The key is stable across restarts as long as the workflow function
/// reaches its step calls in a deterministic order.
pub fn step_key(name: &str, seq: Seq) -> StepKey {
    format!("{name}#{seq}")
}
