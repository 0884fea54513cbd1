//! Caller-facing error taxonomy for step execution.
//!
//! Three kinds: the workflow was cancelled, the retry budget is spent, or
//! the step failed. Closure errors, storage I/O errors, and codec errors all
//! surface as `Failed` with the original cause preserved.

use crate::engine::identity::{StepKey, WorkflowId};

/// Boxed error type accepted from user closures and compensations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error surfaced by the step executor and the saga driver.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The workflow is durably marked CANCELLED; no store write occurred.
    #[error("workflow cancelled: {workflow_id}")]
    Cancelled { workflow_id: WorkflowId },

    /// The step's retry budget is exhausted. `source` is the final
    /// attempt's error, absent when the limit was detected before running
    /// the closure.
    #[error("retry limit exceeded for step: {step_key}")]
    RetryLimitExceeded {
        step_key: StepKey,
        #[source]
        source: Option<BoxError>,
    },

    /// The step's closure, a store operation, or output encoding failed.
    #[error("step failed: {step_key}")]
    Failed {
        step_key: StepKey,
        #[source]
        source: BoxError,
    },
}

impl StepError {
    pub(crate) fn failed(step_key: &str, source: impl Into<BoxError>) -> Self {
        StepError::Failed {
            step_key: step_key.to_string(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_preserves_the_cause() {
        let err = StepError::failed("s#1", "connection refused");
        assert_eq!(err.to_string(), "step failed: s#1");
        let source = std::error::Error::source(&err).expect("cause");
        assert_eq!(source.to_string(), "connection refused");
    }

    #[test]
    fn retry_limit_without_final_attempt_has_no_source() {
        let err = StepError::RetryLimitExceeded {
            step_key: "s#1".into(),
            source: None,
        };
        assert!(std::error::Error::source(&err).is_none());
    }
}
