//! Worker pool counters.
//!
//! Plain atomics shared by every worker loop of a pool. External monitoring
//! reads them through [`WorkerStats::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    acked: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    unhandled: AtomicU64,
    loop_errors: AtomicU64,
    dispatch_errors: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatsSnapshot {
    /// Events popped and dispatched
    pub processed: u64,
    /// Events acknowledged after every handler succeeded
    pub acked: u64,
    /// Failed deliveries sent back for another attempt
    pub retried: u64,
    /// Events moved to the dead-letter list after exhausting retries
    pub dead_lettered: u64,
    /// Events acknowledged without any matching handler
    pub unhandled: u64,
    /// Loop iterations whose pop failed
    pub loop_errors: u64,
    /// Failed ack, retry or nack calls for a single event
    pub dispatch_errors: u64,
}

impl WorkerStats {
    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acked(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unhandled(&self) {
        self.unhandled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_loop_error(&self) {
        self.loop_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch_error(&self) {
        self.dispatch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            unhandled: self.unhandled.load(Ordering::Relaxed),
            loop_errors: self.loop_errors.load(Ordering::Relaxed),
            dispatch_errors: self.dispatch_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = WorkerStats::default();
        stats.record_processed();
        stats.record_processed();
        stats.record_acked();
        stats.record_loop_error();
        stats.record_dispatch_error();
        stats.record_dispatch_error();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.acked, 1);
        assert_eq!(snapshot.loop_errors, 1);
        assert_eq!(snapshot.dispatch_errors, 2);
        assert_eq!(snapshot.retried, 0);
    }
}
