//! Scheduler metrics
//!
//! Relaxed atomic counters observing the scheduling core. Nothing in the
//! scheduler reads these back; they exist for shells, tests and debugging.

use core::sync::atomic::{AtomicU64, Ordering};

/// Ordering used for counters (metrics don't need strict ordering)
const RELAXED: Ordering = Ordering::Relaxed;

/// Event counters for one scheduler instance
#[derive(Debug, Default)]
pub struct SchedMetrics {
    /// Queues created
    pub queues_created: AtomicU64,
    /// Threads enqueued via `wait_for_access`
    pub waits_enqueued: AtomicU64,
    /// Uncontended grants via `acquire`
    pub grants: AtomicU64,
    /// Ownership transfers via `next_thread`
    pub transfers: AtomicU64,
    /// Waits removed via `cancel_wait`
    pub cancelled_waits: AtomicU64,
    /// Donation walks started
    pub walk_passes: AtomicU64,
    /// Effective-priority values rewritten by walks
    pub walk_updates: AtomicU64,
    /// Deepest donation walk observed (hops)
    pub walk_depth_max: AtomicU64,
}

impl SchedMetrics {
    pub(crate) const fn new() -> Self {
        Self {
            queues_created: AtomicU64::new(0),
            waits_enqueued: AtomicU64::new(0),
            grants: AtomicU64::new(0),
            transfers: AtomicU64::new(0),
            cancelled_waits: AtomicU64::new(0),
            walk_passes: AtomicU64::new(0),
            walk_updates: AtomicU64::new(0),
            walk_depth_max: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, RELAXED);
    }

    pub(crate) fn record_walk(&self, hops: u64, updates: u64) {
        self.walk_passes.fetch_add(1, RELAXED);
        self.walk_updates.fetch_add(updates, RELAXED);
        self.walk_depth_max.fetch_max(hops, RELAXED);
    }

    /// Copy out all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queues_created: self.queues_created.load(RELAXED),
            waits_enqueued: self.waits_enqueued.load(RELAXED),
            grants: self.grants.load(RELAXED),
            transfers: self.transfers.load(RELAXED),
            cancelled_waits: self.cancelled_waits.load(RELAXED),
            walk_passes: self.walk_passes.load(RELAXED),
            walk_updates: self.walk_updates.load(RELAXED),
            walk_depth_max: self.walk_depth_max.load(RELAXED),
        }
    }
}

/// Point-in-time copy of [`SchedMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queues_created: u64,
    pub waits_enqueued: u64,
    pub grants: u64,
    pub transfers: u64,
    pub cancelled_waits: u64,
    pub walk_passes: u64,
    pub walk_updates: u64,
    pub walk_depth_max: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_depth_keeps_maximum() {
        let metrics = SchedMetrics::new();
        metrics.record_walk(2, 2);
        metrics.record_walk(5, 1);
        metrics.record_walk(3, 0);

        let snap = metrics.snapshot();
        assert_eq!(snap.walk_passes, 3);
        assert_eq!(snap.walk_updates, 3);
        assert_eq!(snap.walk_depth_max, 5);
    }
}
