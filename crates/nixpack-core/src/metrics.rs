//! Process-wide repair counters.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single `info!` event at
//! the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters, no locking.
pub struct Metrics {
    evaluations: AtomicU64,
    corrections: AtomicU64,
    hash_fixes: AtomicU64,
    accepted: AtomicU64,
    rolled_back: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            evaluations: AtomicU64::new(0),
            corrections: AtomicU64::new(0),
            hash_fixes: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rolled_back: AtomicU64::new(0),
        }
    }

    pub fn inc_evaluations(&self) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations", "counter incremented");
    }

    pub fn inc_corrections(&self) {
        self.corrections.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "corrections", "counter incremented");
    }

    pub fn inc_hash_fixes(&self) {
        self.hash_fixes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "hash_fixes", "counter incremented");
    }

    pub fn inc_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "accepted", "counter incremented");
    }

    pub fn inc_rolled_back(&self) {
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rolled_back", "counter incremented");
    }

    /// Emit all current counter values as one `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            evaluations = self.evaluations(),
            corrections = self.corrections(),
            hash_fixes = self.hash_fixes(),
            accepted = self.accepted(),
            rolled_back = self.rolled_back(),
        );
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn corrections(&self) -> u64 {
        self.corrections.load(Ordering::Relaxed)
    }

    pub fn hash_fixes(&self) -> u64 {
        self.hash_fixes.load(Ordering::Relaxed)
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rolled_back(&self) -> u64 {
        self.rolled_back.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.evaluations.store(0, Ordering::Relaxed);
        self.corrections.store(0, Ordering::Relaxed);
        self.hash_fixes.store(0, Ordering::Relaxed);
        self.accepted.store(0, Ordering::Relaxed);
        self.rolled_back.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_evaluations();
        m.inc_evaluations();
        m.inc_hash_fixes();
        m.inc_rolled_back();
        assert_eq!(m.evaluations(), 2);
        assert_eq!(m.hash_fixes(), 1);
        assert_eq!(m.rolled_back(), 1);
        assert_eq!(m.accepted(), 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_corrections();
        m.inc_accepted();
        m.reset();
        assert_eq!(m.corrections(), 0);
        assert_eq!(m.accepted(), 0);
    }
}
