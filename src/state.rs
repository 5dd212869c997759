//! Per-thread scheduling record
//!
//! One `ThreadSchedState` per thread the scheduler has interacted with,
//! created lazily on first contact. The record never owns the thread itself;
//! [`ThreadId`] is an opaque identity supplied by the execution substrate.

use alloc::vec::Vec;

use crate::clock::Tick;
use crate::priority::Priority;
use crate::queue::QueueId;

/// Opaque thread identity, owned by the execution substrate
pub type ThreadId = u64;

/// Scheduling state of one thread
///
/// A thread is either unblocked or blocked on exactly one queue
/// (`waiting_on`), and may hold any number of queues at the same time.
pub(crate) struct ThreadSchedState {
    /// Base priority, mutated only by an explicit priority-set
    pub(crate) base: Priority,
    /// Derived priority, always >= base; written only by the donation walk
    pub(crate) effective: Priority,
    /// Tick captured when the current wait began
    pub(crate) enqueued_at: Tick,
    /// Queues this thread has acquired and not yet released
    pub(crate) held: Vec<QueueId>,
    /// The queue this thread is blocked in, if any
    pub(crate) waiting_on: Option<QueueId>,
}

impl ThreadSchedState {
    pub(crate) fn new() -> Self {
        Self {
            base: Priority::default(),
            effective: Priority::default(),
            enqueued_at: 0,
            held: Vec::new(),
            waiting_on: None,
        }
    }

    /// Record ownership of `queue`; idempotent
    pub(crate) fn hold(&mut self, queue: QueueId) {
        if !self.held.contains(&queue) {
            self.held.push(queue);
        }
    }

    /// Drop ownership of `queue`; removing an absent entry is a no-op
    pub(crate) fn release(&mut self, queue: QueueId) {
        self.held.retain(|&held| held != queue);
    }
}
