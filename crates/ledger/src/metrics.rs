//! Ledger outcome counters.
//!
//! All atomic operations use `Ordering::Relaxed`. Each counter is independent
//! and monotonically increasing, so a [`LedgerMetricsSnapshot`] may show
//! counters that are slightly inconsistent with each other. That is fine for
//! telemetry, which works on time-aggregated data.
//!
//! # Usage
//!
//! ```
//! use coffer_ledger::LedgerMetrics;
//!
//! let metrics = LedgerMetrics::new();
//! metrics.record_conflict();
//! metrics.record_commit();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.commits, 1);
//! assert_eq!(snapshot.conflict_retries, 1);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Point-in-time copy of the ledger counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerMetricsSnapshot {
    /// Conditional writes that committed (deposits, withdrawals, closes).
    pub commits: u64,
    /// Conditional writes that lost to a concurrent writer and were retried.
    pub conflict_retries: u64,
    /// Operations that gave up with `ConcurrentUpdateConflict`.
    pub conflicts_exhausted: u64,
    /// Operations rejected by a business rule (amount, ownership, funds).
    pub rejections: u64,
    /// History or audit records that could not be stored.
    pub history_write_failures: u64,
    /// Operations that failed with `StoreUnavailable`.
    pub store_failures: u64,
}

impl LedgerMetricsSnapshot {
    /// Fraction of conditional write attempts that hit a conflict.
    #[must_use]
    pub fn conflict_rate(&self) -> f64 {
        let attempts = self.commits + self.conflict_retries + self.conflicts_exhausted;
        if attempts == 0 {
            return 0.0;
        }
        (self.conflict_retries + self.conflicts_exhausted) as f64 / attempts as f64
    }
}

/// Shared, cloneable ledger counters.
#[derive(Clone, Default)]
pub struct LedgerMetrics {
    inner: Arc<LedgerMetricsInner>,
}

// All fields use `Ordering::Relaxed`, see module-level docs.
#[derive(Default)]
struct LedgerMetricsInner {
    commits: AtomicU64,
    conflict_retries: AtomicU64,
    conflicts_exhausted: AtomicU64,
    rejections: AtomicU64,
    history_write_failures: AtomicU64,
    store_failures: AtomicU64,
}

impl LedgerMetrics {
    /// Creates a new set of zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_commit(&self) {
        self.inner.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.inner.conflict_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a conflicting write on the final attempt.
    pub fn record_conflict_exhausted(&self) {
        self.inner.conflicts_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.inner.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_history_write_failure(&self) {
        self.inner.history_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_failure(&self) {
        self.inner.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> LedgerMetricsSnapshot {
        LedgerMetricsSnapshot {
            commits: self.inner.commits.load(Ordering::Relaxed),
            conflict_retries: self.inner.conflict_retries.load(Ordering::Relaxed),
            conflicts_exhausted: self.inner.conflicts_exhausted.load(Ordering::Relaxed),
            rejections: self.inner.rejections.load(Ordering::Relaxed),
            history_write_failures: self.inner.history_write_failures.load(Ordering::Relaxed),
            store_failures: self.inner.store_failures.load(Ordering::Relaxed),
        }
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        self.inner.commits.store(0, Ordering::Relaxed);
        self.inner.conflict_retries.store(0, Ordering::Relaxed);
        self.inner.conflicts_exhausted.store(0, Ordering::Relaxed);
        self.inner.rejections.store(0, Ordering::Relaxed);
        self.inner.history_write_failures.store(0, Ordering::Relaxed);
        self.inner.store_failures.store(0, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for LedgerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerMetrics").field("snapshot", &self.snapshot()).finish()
    }
}
