//! Step and workflow status enums.
//!
//! Both round-trip through the TEXT columns of the backing store; `parse`
//! accepts exactly the strings `as_str` emits.

use serde::{Deserialize, Serialize};

/// Status of a single step record.
///
/// A RUNNING row with no terminal follow-up is a zombie step (the process
/// died mid-execution); it is legal and is overwritten on the next run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Running => "RUNNING",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(StepStatus::Running),
            "COMPLETED" => Some(StepStatus::Completed),
            "FAILED" => Some(StepStatus::Failed),
            _ => None,
        }
    }
}

/// Status of a workflow instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Running,
    Cancelled,
    Completed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Running => "RUNNING",
            WorkflowStatus::Cancelled => "CANCELLED",
            WorkflowStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(WorkflowStatus::Running),
            "CANCELLED" => Some(WorkflowStatus::Cancelled),
            "COMPLETED" => Some(WorkflowStatus::Completed),
            _ => None,
        }
    }
}
