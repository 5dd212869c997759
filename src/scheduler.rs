//! Priority scheduler
//!
//! The scheduling core: a thread-state arena, a queue arena, and the
//! donation walk that keeps effective priorities consistent while threads
//! block on each other's resources.
//!
//! ## Donation model
//!
//! A holder's effective priority is `max(base, best waiter of every held
//! transferring queue)`. Whenever an operation can change that quantity for
//! some thread, the walk recomputes the thread and then follows its
//! wait-edge to the holder of the queue it is blocked on, continuing only
//! while values actually change. Queues created without
//! `transfers_priority` are opaque to the walk.
//!
//! The graph (thread -> queue waited on -> holder -> ...) is acyclic under
//! correct lock usage. The walk still carries a hop bound equal to the
//! thread population and fails loudly if it is ever exceeded.

use alloc::boxed::Box;
use alloc::vec::Vec;

use hashbrown::HashMap;
use log::{debug, trace};
use spin::Mutex;

use crate::clock::{ClockSource, TickClock};
use crate::error::{SchedError, SchedResult};
use crate::metrics::{MetricsSnapshot, SchedMetrics};
use crate::priority::{Priority, PRIORITY_MAX, PRIORITY_MIN};
use crate::queue::{QueueId, QueueSnapshot, ResourceQueue};
use crate::state::{ThreadId, ThreadSchedState};

/// Arena state behind the facade's lock
struct SchedCore {
    /// Per-thread records, created lazily on first contact
    threads: HashMap<ThreadId, ThreadSchedState>,
    /// Queue arena; queues live for the lifetime of their resource
    queues: Vec<ResourceQueue>,
    /// Tick source for enqueue stamps
    clock: Box<dyn ClockSource>,
}

impl SchedCore {
    fn new(clock: Box<dyn ClockSource>) -> Self {
        Self {
            threads: HashMap::new(),
            queues: Vec::new(),
            clock,
        }
    }

    fn queue(&self, queue: QueueId) -> SchedResult<&ResourceQueue> {
        self.queues
            .get(queue.index())
            .ok_or(SchedError::UnknownQueue { queue })
    }

    fn queue_mut(&mut self, queue: QueueId) -> SchedResult<&mut ResourceQueue> {
        self.queues
            .get_mut(queue.index())
            .ok_or(SchedError::UnknownQueue { queue })
    }

    fn state_mut(&mut self, thread: ThreadId) -> &mut ThreadSchedState {
        self.threads
            .entry(thread)
            .or_insert_with(ThreadSchedState::new)
    }

    fn new_queue(&mut self, transfers_priority: bool) -> QueueId {
        let id = QueueId(self.queues.len() as u32);
        self.queues.push(ResourceQueue::new(transfers_priority));
        debug!("created {} (transfers_priority: {})", id, transfers_priority);
        id
    }

    fn base_priority(&self, thread: ThreadId) -> Priority {
        self.threads
            .get(&thread)
            .map(|state| state.base)
            .unwrap_or_default()
    }

    fn effective_priority(&self, thread: ThreadId) -> Priority {
        self.threads
            .get(&thread)
            .map(|state| state.effective)
            .unwrap_or_default()
    }

    fn set_priority(
        &mut self,
        thread: ThreadId,
        value: u8,
        metrics: &SchedMetrics,
    ) -> SchedResult<()> {
        let priority = Priority::new(value).ok_or(SchedError::PriorityOutOfRange {
            value,
            min: PRIORITY_MIN,
            max: PRIORITY_MAX,
        })?;
        let state = self.state_mut(thread);
        if state.base == priority {
            return Ok(());
        }
        state.base = priority;
        debug!("thread {} base priority set to {}", thread, priority);
        self.recompute_from(thread, metrics)
    }

    fn increase_priority(&mut self, thread: ThreadId, metrics: &SchedMetrics) -> SchedResult<bool> {
        let state = self.state_mut(thread);
        let Some(next) = state.base.step_up() else {
            return Ok(false);
        };
        state.base = next;
        self.recompute_from(thread, metrics)?;
        Ok(true)
    }

    fn decrease_priority(&mut self, thread: ThreadId, metrics: &SchedMetrics) -> SchedResult<bool> {
        let state = self.state_mut(thread);
        let Some(next) = state.base.step_down() else {
            return Ok(false);
        };
        state.base = next;
        self.recompute_from(thread, metrics)?;
        Ok(true)
    }

    fn wait_for_access(
        &mut self,
        queue: QueueId,
        thread: ThreadId,
        metrics: &SchedMetrics,
    ) -> SchedResult<()> {
        let holder = self.queue(queue)?.holder();
        if holder == Some(thread) {
            return Err(SchedError::WaiterIsHolder { queue, thread });
        }
        if let Some(blocked_on) = self.threads.get(&thread).and_then(|s| s.waiting_on) {
            return Err(SchedError::AlreadyWaiting {
                thread,
                queue: blocked_on,
            });
        }

        let tick = self.clock.now();
        let state = self.state_mut(thread);
        state.waiting_on = Some(queue);
        state.enqueued_at = tick;
        self.queues[queue.index()].push_waiter(thread);
        SchedMetrics::inc(&metrics.waits_enqueued);
        debug!("thread {} waits on {} (tick {})", thread, queue, tick);

        self.recompute_from(thread, metrics)?;
        if let Some(holder) = holder {
            self.recompute_from(holder, metrics)?;
        }
        Ok(())
    }

    fn acquire(
        &mut self,
        queue: QueueId,
        thread: ThreadId,
        metrics: &SchedMetrics,
    ) -> SchedResult<()> {
        let (waiters, holder) = {
            let q = self.queue(queue)?;
            (q.len(), q.holder())
        };
        if waiters != 0 {
            return Err(SchedError::QueueNotEmpty { queue, waiters });
        }
        if let Some(holder) = holder {
            return Err(SchedError::QueueAlreadyHeld { queue, holder });
        }

        self.queues[queue.index()].set_holder(Some(thread));
        self.state_mut(thread).hold(queue);
        SchedMetrics::inc(&metrics.grants);
        debug!("{} acquired uncontended by thread {}", queue, thread);
        self.recompute_from(thread, metrics)
    }

    fn pick_next_thread(&self, queue: QueueId) -> SchedResult<Option<ThreadId>> {
        Ok(self.queue(queue)?.best_waiter(&self.threads))
    }

    fn next_thread(&mut self, queue: QueueId, metrics: &SchedMetrics) -> SchedResult<Option<ThreadId>> {
        let winner = self.queue(queue)?.best_waiter(&self.threads);
        let previous = self.queues[queue.index()].holder();

        // The previous holder releases the queue whether or not anyone is
        // next; holder field and held set stay mirrored.
        if let Some(prev) = previous {
            if let Some(state) = self.threads.get_mut(&prev) {
                state.release(queue);
            }
        }

        let Some(next) = winner else {
            self.queues[queue.index()].set_holder(None);
            if let Some(prev) = previous {
                self.recompute_from(prev, metrics)?;
            }
            return Ok(None);
        };

        self.queues[queue.index()].remove_waiter(next);
        {
            let state = self.state_mut(next);
            state.waiting_on = None;
            state.hold(queue);
        }
        self.queues[queue.index()].set_holder(Some(next));
        SchedMetrics::inc(&metrics.transfers);
        debug!("{} transferred from {:?} to thread {}", queue, previous, next);

        if let Some(prev) = previous {
            self.recompute_from(prev, metrics)?;
        }
        self.recompute_from(next, metrics)?;
        Ok(Some(next))
    }

    fn cancel_wait(&mut self, thread: ThreadId, metrics: &SchedMetrics) -> SchedResult<bool> {
        let Some(queue) = self
            .threads
            .get_mut(&thread)
            .and_then(|state| state.waiting_on.take())
        else {
            return Ok(false);
        };

        let removed = self.queue_mut(queue)?.remove_waiter(thread);
        debug_assert!(removed, "waiting_on pointed at a queue without the waiter");
        SchedMetrics::inc(&metrics.cancelled_waits);
        debug!("thread {} abandoned its wait on {}", thread, queue);

        if let Some(holder) = self.queues[queue.index()].holder() {
            self.recompute_from(holder, metrics)?;
        }
        Ok(true)
    }

    fn snapshot(&self, queue: QueueId) -> SchedResult<QueueSnapshot> {
        let q = self.queue(queue)?;
        Ok(QueueSnapshot {
            transfers_priority: q.transfers_priority(),
            holder: q.holder(),
            waiters: q.waiters_in_order(&self.threads),
        })
    }

    /// Donation walk. Recomputes `start` from its base priority and held
    /// queues, then follows the wait-edge to the holder of the queue `start`
    /// blocks on, continuing while values change. A recomputation that
    /// leaves a value unchanged ends the walk (idempotence).
    fn recompute_from(&mut self, start: ThreadId, metrics: &SchedMetrics) -> SchedResult<()> {
        let limit = self.threads.len().max(1);
        let mut current = start;
        let mut hops: u64 = 0;
        let mut updates: u64 = 0;

        loop {
            self.threads
                .entry(current)
                .or_insert_with(ThreadSchedState::new);
            let (base, held, waiting_on) = match self.threads.get(&current) {
                Some(state) => (state.base, state.held.clone(), state.waiting_on),
                None => break,
            };

            let mut candidate = base;
            for held_queue in held {
                let Some(q) = self.queues.get(held_queue.index()) else {
                    continue;
                };
                if !q.transfers_priority() {
                    continue;
                }
                if let Some(donor) = q.best_waiter(&self.threads) {
                    if let Some(donor_state) = self.threads.get(&donor) {
                        candidate = candidate.max(donor_state.effective);
                    }
                }
            }

            let Some(state) = self.threads.get_mut(&current) else {
                break;
            };
            if state.effective == candidate {
                break;
            }
            trace!(
                "donation: thread {} effective {} -> {}",
                current,
                state.effective,
                candidate
            );
            state.effective = candidate;
            updates += 1;

            let Some(next) = waiting_on
                .and_then(|qid| self.queues.get(qid.index()))
                .and_then(|q| q.holder())
            else {
                break;
            };
            hops += 1;
            if hops as usize > limit {
                metrics.record_walk(hops, updates);
                return Err(SchedError::DonationDepthExceeded { start, limit });
            }
            current = next;
        }

        metrics.record_walk(hops, updates);
        Ok(())
    }
}

/// Priority scheduler facade
///
/// Always grants a resource to the waiter of highest effective priority,
/// breaking ties longest-waiting-first, and donates priority through
/// ownership chains of transferring queues to bound priority inversion.
///
/// The single internal spin lock is the global scheduling critical section
/// of the kernel; every operation takes it for its full duration. The
/// structures beneath carry no further synchronization. On a live kernel,
/// entry points are additionally called with interrupts masked; that is
/// the caller's obligation, the crate only excludes concurrent mutation.
///
/// Thread identity is always explicit; the scheduler never consults an
/// ambient "currently running thread".
pub struct PriorityScheduler {
    core: Mutex<SchedCore>,
    metrics: SchedMetrics,
}

impl PriorityScheduler {
    /// Scheduler with the default tick counter
    pub fn new() -> Self {
        Self::with_clock(Box::new(TickClock::new()))
    }

    /// Scheduler stamping enqueues from the timer facility's own source
    pub fn with_clock(clock: Box<dyn ClockSource>) -> Self {
        Self {
            core: Mutex::new(SchedCore::new(clock)),
            metrics: SchedMetrics::new(),
        }
    }

    /// Allocate a queue; `transfers_priority` is fixed for its lifetime
    pub fn new_queue(&self, transfers_priority: bool) -> QueueId {
        SchedMetrics::inc(&self.metrics.queues_created);
        self.core.lock().new_queue(transfers_priority)
    }

    /// Base priority; a thread the scheduler has not seen reads as default
    pub fn priority(&self, thread: ThreadId) -> Priority {
        self.core.lock().base_priority(thread)
    }

    /// Donation-adjusted priority, never below base
    pub fn effective_priority(&self, thread: ThreadId) -> Priority {
        self.core.lock().effective_priority(thread)
    }

    /// Set base priority; out-of-range values are refused, equal values are
    /// a no-op, anything else triggers the donation walk
    pub fn set_priority(&self, thread: ThreadId, value: u8) -> SchedResult<()> {
        self.core.lock().set_priority(thread, value, &self.metrics)
    }

    /// One step up; `Ok(false)` means already at the upper bound
    pub fn increase_priority(&self, thread: ThreadId) -> SchedResult<bool> {
        self.core.lock().increase_priority(thread, &self.metrics)
    }

    /// One step down; `Ok(false)` means already at the lower bound
    pub fn decrease_priority(&self, thread: ThreadId) -> SchedResult<bool> {
        self.core.lock().decrease_priority(thread, &self.metrics)
    }

    /// Enqueue `thread` as a waiter of `queue`, stamping its enqueue tick.
    /// The thread must not hold the queue and must not be waiting elsewhere.
    pub fn wait_for_access(&self, queue: QueueId, thread: ThreadId) -> SchedResult<()> {
        self.core.lock().wait_for_access(queue, thread, &self.metrics)
    }

    /// Uncontended grant: the queue must have no waiters and no holder
    pub fn acquire(&self, queue: QueueId, thread: ThreadId) -> SchedResult<()> {
        self.core.lock().acquire(queue, thread, &self.metrics)
    }

    /// Dequeue-and-transfer: the previous holder releases the queue, the
    /// best waiter (if any) becomes holder and is returned. Called by
    /// whatever currently controls the resource, never by a waiter.
    pub fn next_thread(&self, queue: QueueId) -> SchedResult<Option<ThreadId>> {
        self.core.lock().next_thread(queue, &self.metrics)
    }

    /// The thread `next_thread` would return, without consuming it
    pub fn pick_next_thread(&self, queue: QueueId) -> SchedResult<Option<ThreadId>> {
        self.core.lock().pick_next_thread(queue)
    }

    /// Remove `thread` from the queue it waits in (timer-facility path).
    /// `Ok(false)` if it waits nowhere; the removal is idempotent.
    pub fn cancel_wait(&self, thread: ThreadId) -> SchedResult<bool> {
        self.core.lock().cancel_wait(thread, &self.metrics)
    }

    /// Current holder of `queue`
    pub fn holder(&self, queue: QueueId) -> SchedResult<Option<ThreadId>> {
        Ok(self.core.lock().queue(queue)?.holder())
    }

    /// Number of threads waiting in `queue`
    pub fn queue_len(&self, queue: QueueId) -> SchedResult<usize> {
        Ok(self.core.lock().queue(queue)?.len())
    }

    /// Debug view of `queue`, waiters in selection order
    pub fn queue_snapshot(&self, queue: QueueId) -> SchedResult<QueueSnapshot> {
        self.core.lock().snapshot(queue)
    }

    /// Counters since construction
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Default for PriorityScheduler {
    fn default() -> Self {
        Self::new()
    }
}
