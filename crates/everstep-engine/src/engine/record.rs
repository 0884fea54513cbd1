//! Persisted record types: one row per step attempt, one row per workflow.
//!
//! Records are immutable values; the store mutates rows, the engine only
//! reads them. The memo is the record: a COMPLETED row's output, once
//! written, is never rewritten.

use serde::{Deserialize, Serialize};

use crate::engine::identity::{Seq, StepKey, WorkflowId};
use crate::engine::status::{StepStatus, WorkflowStatus};

/// One persisted step attempt, keyed by `(workflow_id, step_key)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub workflow_id: WorkflowId,
    pub step_key: StepKey,
    pub step_name: String,
    pub sequence_id: Seq,
    pub status: StepStatus,
    /// Serialized step output; present iff `status` is COMPLETED.
    pub output: Option<String>,
    /// Error message from the last failed attempt.
    pub error: Option<String>,
    /// Number of failed attempts observed.
    pub retry_count: u32,
    /// Unix millisecond timestamp after which the step is eligible for
    /// another attempt, when a retry has been scheduled.
    pub next_retry_at: Option<u64>,
    /// Unix milliseconds.
    pub created_at: u64,
    /// Unix milliseconds.
    pub updated_at: u64,
}

impl StepRecord {
    pub fn is_running(&self) -> bool {
        self.status == StepStatus::Running
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }

    /// Whether this record is a failed attempt whose scheduled retry time
    /// has passed.
    pub fn retry_due(&self, now_ms: u64) -> bool {
        self.is_failed() && self.next_retry_at.is_some_and(|at| at <= now_ms)
    }
}

/// One persisted workflow instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    /// Unix milliseconds.
    pub created_at: u64,
    /// Unix milliseconds.
    pub updated_at: u64,
}
