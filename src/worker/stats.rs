//! Pool counters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Snapshot of a pool's counters.
///
/// `failed` excludes cancelled tasks, which are counted in `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    /// Tasks accepted into the queue.
    pub submitted: u64,
    /// Tasks executing right now.
    pub running: usize,
    /// Highest value `running` has reached.
    pub peak_running: usize,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Worker threads replaced after a handler panic.
    pub respawned: u64,
}

impl PoolStats {
    /// Tasks that reached a terminal state.
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed + self.cancelled
    }
}

/// Live counters shared by the pool and its workers.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    submitted: AtomicU64,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    succeeded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    respawned: AtomicU64,
}

impl PoolCounters {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_started(&self) {
        let running = self.running.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_running.fetch_max(running, Ordering::AcqRel);
    }

    pub(crate) fn record_stopped(&self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn record_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_respawned(&self) {
        self.respawned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        PoolStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Acquire),
            peak_running: self.peak_running.load(Ordering::Acquire),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            respawned: self.respawned.load(Ordering::Relaxed),
        }
    }
}
