//! Per-workflow runtime state threading naming, compensation, and
//! cancellation through step calls.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::error::{BoxError, StepError};
use crate::engine::identity::WorkflowId;
use crate::engine::metrics;
use crate::engine::sequence::SequenceManager;
use crate::engine::store::Store;

/// A rollback action registered by a saga step. Runs at most once, in
/// reverse registration order, when a later step fails.
pub type Compensation = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

/// Per-workflow runtime: workflow id, store handle, step sequencing, and the
/// in-memory saga compensation stack.
///
/// One context serves one workflow invocation. The sequence manager is
/// atomic and the compensation stack is internally locked, so a context can
/// be shared across parallel step threads; parallel branches must use step
/// names unique to their branch or their memo keys will not be stable across
/// restarts.
pub struct DurableContext {
    pub workflow_id: WorkflowId,
    pub store: Arc<dyn Store>,
    pub sequence: SequenceManager,
    compensations: Mutex<Vec<Compensation>>,
}

impl DurableContext {
    pub fn new(workflow_id: impl Into<WorkflowId>, store: Arc<dyn Store>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            store,
            sequence: SequenceManager::new(),
            compensations: Mutex::new(Vec::new()),
        }
    }

    /// Fails with [`StepError::Cancelled`] if the workflow is durably marked
    /// CANCELLED. Store errors during the check are logged and swallowed:
    /// this is a best-effort liveness check, not a correctness gate; the
    /// step's own store writes remain authoritative.
    pub fn check_cancelled(&self) -> Result<(), StepError> {
        match self.store.is_cancelled(&self.workflow_id) {
            Ok(true) => Err(StepError::Cancelled {
                workflow_id: self.workflow_id.clone(),
            }),
            Ok(false) => Ok(()),
            Err(err) => {
                tracing::warn!(
                    workflow_id = %self.workflow_id,
                    error = %err,
                    "cancellation check failed; continuing"
                );
                Ok(())
            }
        }
    }

    /// Pushes a compensation onto the stack.
    pub fn add_compensation(
        &self,
        compensation: impl FnOnce() -> Result<(), BoxError> + Send + 'static,
    ) {
        self.stack().push(Box::new(compensation));
    }

    /// Pops and runs every registered compensation in LIFO order. A failing
    /// compensation is logged and skipped; the remaining compensations still
    /// run. One broken rollback must not block the rest.
    pub fn execute_compensations(&self) {
        loop {
            // Take one action per iteration so a compensation that itself
            // registers a compensation cannot deadlock on the stack lock.
            let Some(compensation) = self.stack().pop() else {
                break;
            };
            metrics::record_compensation();
            if let Err(err) = compensation() {
                tracing::warn!(
                    workflow_id = %self.workflow_id,
                    error = %err,
                    "compensation failed; continuing with remaining compensations"
                );
            }
        }
    }

    /// Number of registered compensations. Observable for tests.
    pub fn compensation_count(&self) -> usize {
        self.stack().len()
    }

    fn stack(&self) -> MutexGuard<'_, Vec<Compensation>> {
        // The stack is best-effort rollback state; a panic while holding the
        // lock must not wedge the remaining compensations.
        match self.compensations.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::engine::store::InMemoryStore;

    fn context(workflow_id: &str) -> DurableContext {
        DurableContext::new(workflow_id, Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn check_cancelled_passes_for_unknown_and_running_workflows() {
        let ctx = context("w1");
        assert!(ctx.check_cancelled().is_ok());

        ctx.store
            .upsert_workflow("w1", crate::engine::status::WorkflowStatus::Running)
            .unwrap();
        assert!(ctx.check_cancelled().is_ok());
    }

    #[test]
    fn check_cancelled_fails_after_cancel() {
        let ctx = context("w2");
        ctx.store.cancel_workflow("w2").unwrap();
        let err = ctx.check_cancelled().unwrap_err();
        assert!(matches!(err, StepError::Cancelled { workflow_id } if workflow_id == "w2"));
    }

    #[test]
    fn compensations_run_in_reverse_registration_order() {
        let ctx = context("w3");
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            ctx.add_compensation(move || {
                order.lock().unwrap().push(label);
                Ok(())
            });
        }
        assert_eq!(ctx.compensation_count(), 3);

        ctx.execute_compensations();
        assert_eq!(ctx.compensation_count(), 0);
        assert_eq!(*order.lock().unwrap(), vec!["third", "second", "first"]);
    }

    #[test]
    fn failing_compensation_does_not_block_the_rest() {
        let ctx = context("w4");
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        ctx.add_compensation(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        ctx.add_compensation(|| Err("rollback exploded".into()));

        ctx.execute_compensations();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.compensation_count(), 0);
    }
}
