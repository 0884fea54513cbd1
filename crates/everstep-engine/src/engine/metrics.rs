//! Process-wide metric counters.
//!
//! Observability only; the counters play no part in memoization correctness.
//! They are scoped to the process lifecycle, with `reset` for test isolation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static STEPS: AtomicU64 = AtomicU64::new(0);
static FAILURES: AtomicU64 = AtomicU64::new(0);
static WORKFLOW_RESTARTS: AtomicU64 = AtomicU64::new(0);
static COMPENSATIONS: AtomicU64 = AtomicU64::new(0);

pub fn record_step() {
    STEPS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_failure() {
    FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_restart() {
    WORKFLOW_RESTARTS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_compensation() {
    COMPENSATIONS.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time view of all counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub steps: u64,
    pub failures: u64,
    pub workflow_restarts: u64,
    pub compensations: u64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "steps={}, failures={}, restarts={}, compensations={}",
            self.steps, self.failures, self.workflow_restarts, self.compensations
        )
    }
}

pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        steps: STEPS.load(Ordering::Relaxed),
        failures: FAILURES.load(Ordering::Relaxed),
        workflow_restarts: WORKFLOW_RESTARTS.load(Ordering::Relaxed),
        compensations: COMPENSATIONS.load(Ordering::Relaxed),
    }
}

/// Zeroes all counters. Only used in tests and at driver startup.
pub fn reset() {
    STEPS.store(0, Ordering::Relaxed);
    FAILURES.store(0, Ordering::Relaxed);
    WORKFLOW_RESTARTS.store(0, Ordering::Relaxed);
    COMPENSATIONS.store(0, Ordering::Relaxed);
}
