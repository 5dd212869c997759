//! Resource wait queue
//!
//! One `ResourceQueue` per guarded resource (a lock, a join point). The
//! waiter list is deliberately unordered: effective priorities can change
//! anywhere in the donation graph at any moment, so the best waiter is
//! selected lazily at each inspection instead of maintaining a sorted
//! structure that would go stale.

use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

use crate::clock::Tick;
use crate::priority::Priority;
use crate::state::{ThreadId, ThreadSchedState};

/// Stable handle into the scheduler's queue arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(pub(crate) u32);

impl QueueId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue#{}", self.0)
    }
}

/// Wait queue for one resource
pub(crate) struct ResourceQueue {
    /// Waiters donate effective priority to the holder; fixed at creation
    transfers_priority: bool,
    /// Unordered waiter membership; ordering is recomputed on selection
    waiters: Vec<ThreadId>,
    /// Thread currently granted the resource
    holder: Option<ThreadId>,
}

impl ResourceQueue {
    pub(crate) fn new(transfers_priority: bool) -> Self {
        Self {
            transfers_priority,
            waiters: Vec::new(),
            holder: None,
        }
    }

    #[inline]
    pub(crate) fn transfers_priority(&self) -> bool {
        self.transfers_priority
    }

    #[inline]
    pub(crate) fn holder(&self) -> Option<ThreadId> {
        self.holder
    }

    pub(crate) fn set_holder(&mut self, holder: Option<ThreadId>) {
        self.holder = holder;
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn push_waiter(&mut self, thread: ThreadId) {
        self.waiters.push(thread);
    }

    /// Remove `thread` from the waiter list; absent entries are a no-op
    pub(crate) fn remove_waiter(&mut self, thread: ThreadId) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|&waiter| waiter != thread);
        self.waiters.len() != before
    }

    /// The waiter `next_thread` would grant: highest effective priority,
    /// earliest enqueue tick among ties. Pure selection, consumes nothing.
    pub(crate) fn best_waiter(
        &self,
        threads: &HashMap<ThreadId, ThreadSchedState>,
    ) -> Option<ThreadId> {
        let mut best: Option<(Priority, Tick, ThreadId)> = None;
        for &tid in &self.waiters {
            let Some(state) = threads.get(&tid) else {
                continue;
            };
            let beats = match best {
                None => true,
                Some((priority, tick, _)) => {
                    state.effective > priority
                        || (state.effective == priority && state.enqueued_at < tick)
                }
            };
            if beats {
                best = Some((state.effective, state.enqueued_at, tid));
            }
        }
        best.map(|(_, _, tid)| tid)
    }

    /// All waiters in selection order, for inspection and debug dumps
    pub(crate) fn waiters_in_order(
        &self,
        threads: &HashMap<ThreadId, ThreadSchedState>,
    ) -> Vec<ThreadId> {
        let mut ordered: Vec<ThreadId> = self.waiters.clone();
        ordered.sort_by_key(|tid| {
            threads
                .get(tid)
                .map(|state| (core::cmp::Reverse(state.effective), state.enqueued_at))
                .unwrap_or((core::cmp::Reverse(Priority::min()), Tick::MAX))
        });
        ordered
    }
}

/// Point-in-time view of one queue, waiters in selection order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub transfers_priority: bool,
    pub holder: Option<ThreadId>,
    pub waiters: Vec<ThreadId>,
}
