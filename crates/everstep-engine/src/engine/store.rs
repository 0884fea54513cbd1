//! Store trait and in-memory backend for step and workflow records.
//!
//! **Constraints (must hold in all implementations):**
//! - every mutating operation commits before returning; a crash after return
//!   guarantees the write survives;
//! - all operations are serializable against each other (a single mutex over
//!   the backing handle is sufficient at the expected fan-out);
//! - `mark_running` inserts a fresh record or overwrites an existing one for
//!   the same `(workflow_id, step_key)`, resetting status/output/error/retry;
//!   this overwrite reclaims zombie RUNNING rows without a cleanup path;
//! - `completed_steps` returns records ordered by `sequence_id` ascending.
//!
//! I/O errors propagate to the caller; the store never retries internally.
//! Retry lives at the step level, not the storage level.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::engine::identity::{Seq, StepKey, WorkflowId};
use crate::engine::record::{StepRecord, WorkflowRecord};
use crate::engine::status::{StepStatus, WorkflowStatus};

/// Current Unix time in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Storage-level error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Durable persistence for step memos and workflow status.
pub trait Store: Send + Sync {
    /// Reads a step record by primary key.
    fn find(&self, workflow_id: &str, step_key: &str) -> Result<Option<StepRecord>, StoreError>;

    /// Inserts a fresh RUNNING record, or overwrites an existing record with
    /// those identity columns and resets status/output/error/retry.
    fn mark_running(
        &self,
        workflow_id: &str,
        step_key: &str,
        step_name: &str,
        sequence_id: Seq,
    ) -> Result<(), StoreError>;

    /// Transitions the row to COMPLETED with the serialized output. No-op if
    /// the row is absent (caller's bug).
    fn mark_completed(
        &self,
        workflow_id: &str,
        step_key: &str,
        output: &str,
    ) -> Result<(), StoreError>;

    /// Transitions the row to FAILED. No-op if the row is absent.
    fn mark_failed(&self, workflow_id: &str, step_key: &str, error: &str)
        -> Result<(), StoreError>;

    /// Transitions the row to FAILED and records retry accounting.
    fn mark_failed_with_retry(
        &self,
        workflow_id: &str,
        step_key: &str,
        error: &str,
        retry_count: u32,
        next_retry_at: u64,
    ) -> Result<(), StoreError>;

    /// Inserts or replaces the workflow row.
    fn upsert_workflow(&self, workflow_id: &str, status: WorkflowStatus) -> Result<(), StoreError>;

    /// Reads the workflow status, if the workflow row exists.
    fn workflow_status(&self, workflow_id: &str) -> Result<Option<WorkflowStatus>, StoreError>;

    fn is_cancelled(&self, workflow_id: &str) -> Result<bool, StoreError> {
        Ok(self.workflow_status(workflow_id)? == Some(WorkflowStatus::Cancelled))
    }

    fn cancel_workflow(&self, workflow_id: &str) -> Result<(), StoreError> {
        self.upsert_workflow(workflow_id, WorkflowStatus::Cancelled)
    }

    /// All COMPLETED steps of the workflow, ordered by sequence_id ascending.
    /// Used by drivers for resume diagnostics; the executor does not need it.
    fn completed_steps(&self, workflow_id: &str) -> Result<Vec<StepRecord>, StoreError>;
}

/// In-memory store for tests and single-process use.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    steps: RwLock<HashMap<(WorkflowId, StepKey), StepRecord>>,
    workflows: RwLock<HashMap<WorkflowId, WorkflowRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    fn find(&self, workflow_id: &str, step_key: &str) -> Result<Option<StepRecord>, StoreError> {
        let steps = self
            .steps
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(steps
            .get(&(workflow_id.to_string(), step_key.to_string()))
            .cloned())
    }

    fn mark_running(
        &self,
        workflow_id: &str,
        step_key: &str,
        step_name: &str,
        sequence_id: Seq,
    ) -> Result<(), StoreError> {
        let mut steps = self
            .steps
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let key = (workflow_id.to_string(), step_key.to_string());
        let now = now_millis();
        let created_at = steps.get(&key).map(|r| r.created_at).unwrap_or(now);
        steps.insert(
            key,
            StepRecord {
                workflow_id: workflow_id.to_string(),
                step_key: step_key.to_string(),
                step_name: step_name.to_string(),
                sequence_id,
                status: StepStatus::Running,
                output: None,
                error: None,
                retry_count: 0,
                next_retry_at: None,
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    fn mark_completed(
        &self,
        workflow_id: &str,
        step_key: &str,
        output: &str,
    ) -> Result<(), StoreError> {
        let mut steps = self
            .steps
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if let Some(record) = steps.get_mut(&(workflow_id.to_string(), step_key.to_string())) {
            record.status = StepStatus::Completed;
            record.output = Some(output.to_string());
            record.updated_at = now_millis();
        }
        Ok(())
    }

    fn mark_failed(
        &self,
        workflow_id: &str,
        step_key: &str,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut steps = self
            .steps
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if let Some(record) = steps.get_mut(&(workflow_id.to_string(), step_key.to_string())) {
            record.status = StepStatus::Failed;
            record.error = Some(error.to_string());
            record.updated_at = now_millis();
        }
        Ok(())
    }

    fn mark_failed_with_retry(
        &self,
        workflow_id: &str,
        step_key: &str,
        error: &str,
        retry_count: u32,
        next_retry_at: u64,
    ) -> Result<(), StoreError> {
        let mut steps = self
            .steps
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if let Some(record) = steps.get_mut(&(workflow_id.to_string(), step_key.to_string())) {
            record.status = StepStatus::Failed;
            record.error = Some(error.to_string());
            record.retry_count = retry_count;
            record.next_retry_at = Some(next_retry_at);
            record.updated_at = now_millis();
        }
        Ok(())
    }

    fn upsert_workflow(&self, workflow_id: &str, status: WorkflowStatus) -> Result<(), StoreError> {
        let mut workflows = self
            .workflows
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let now = now_millis();
        let created_at = workflows
            .get(workflow_id)
            .map(|r| r.created_at)
            .unwrap_or(now);
        workflows.insert(
            workflow_id.to_string(),
            WorkflowRecord {
                workflow_id: workflow_id.to_string(),
                status,
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    fn workflow_status(&self, workflow_id: &str) -> Result<Option<WorkflowStatus>, StoreError> {
        let workflows = self
            .workflows
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(workflows.get(workflow_id).map(|r| r.status))
    }

    fn completed_steps(&self, workflow_id: &str) -> Result<Vec<StepRecord>, StoreError> {
        let steps = self
            .steps
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut completed: Vec<StepRecord> = steps
            .values()
            .filter(|r| r.workflow_id == workflow_id && r.is_completed())
            .cloned()
            .collect();
        completed.sort_by_key(|r| r.sequence_id);
        Ok(completed)
    }
}
