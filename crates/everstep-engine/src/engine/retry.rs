//! Declarative retry limits and backoff schedule.

use serde::{Deserialize, Serialize};

/// Retry policy for step execution: attempt limit plus pure exponential
/// backoff (no jitter).
///
/// Passing no policy at the executor API is distinct from [`RetryPolicy::NONE`]:
/// without a policy, failures mark the record FAILED with no retry accounting
/// at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, counting the first (>= 1).
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles for each attempt after.
    pub initial_backoff_ms: u64,
}

impl RetryPolicy {
    /// 3 attempts, 1 second initial backoff.
    pub const DEFAULT: RetryPolicy = RetryPolicy::new(3, 1000);

    /// 5 attempts, 500 ms initial backoff.
    pub const AGGRESSIVE: RetryPolicy = RetryPolicy::new(5, 500);

    /// Single attempt, no backoff.
    pub const NONE: RetryPolicy = RetryPolicy::new(1, 0);

    pub const fn new(max_attempts: u32, initial_backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms,
        }
    }

    /// Backoff in milliseconds before retrying after the given attempt
    /// (1-indexed): `initial_backoff_ms * 2^(attempt - 1)`, saturating.
    pub fn backoff_for_attempt(&self, attempt: u32) -> u64 {
        self.initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)))
    }
}
