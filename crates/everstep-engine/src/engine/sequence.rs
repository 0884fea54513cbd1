//! Per-context step sequence numbering.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::identity::Seq;

/// Monotonic per-context counter producing stable step-key suffixes.
///
/// The i-th call to `next` returns i (starting from 1). Across two
/// executions of the same workflow code path this yields the same numbers,
/// which is what keeps step keys stable, provided the caller reaches its
/// step calls in a deterministic order.
#[derive(Debug, Default)]
pub struct SequenceManager {
    counter: AtomicU64,
}

impl SequenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically increments and returns the new value.
    pub fn next(&self) -> Seq {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current value without incrementing.
    pub fn current(&self) -> Seq {
        self.counter.load(Ordering::SeqCst)
    }

    /// Returns the counter to zero. Only used in tests.
    pub fn reset(&self) {
        self.counter.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_starts_at_one_and_increases() {
        let seq = SequenceManager::new();
        assert_eq!(seq.current(), 0);
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.next(), 3);
        assert_eq!(seq.current(), 3);
    }

    #[test]
    fn reset_returns_to_zero() {
        let seq = SequenceManager::new();
        seq.next();
        seq.next();
        seq.reset();
        assert_eq!(seq.current(), 0);
        assert_eq!(seq.next(), 1);
    }

    #[test]
    fn concurrent_next_yields_distinct_values() {
        let seq = SequenceManager::new();
        let mut seen: Vec<Seq> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| seq.next())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        seen.sort_unstable();
        assert_eq!(seen, (1..=8).collect::<Vec<_>>());
    }
}
