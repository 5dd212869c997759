//! Scheduler error handling
//!
//! Typed errors for every scheduling operation. Each variant is a programming
//! contract violation on the caller's side: the operation refuses to proceed
//! and nothing is retried at run time.

use core::fmt;

use crate::queue::QueueId;
use crate::state::ThreadId;

/// Scheduler error types with contract context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// Requested base priority is outside the allowed range
    PriorityOutOfRange { value: u8, min: u8, max: u8 },

    /// `acquire` called on a queue that has waiters
    QueueNotEmpty { queue: QueueId, waiters: usize },

    /// `acquire` called on a queue that already has a holder
    QueueAlreadyHeld { queue: QueueId, holder: ThreadId },

    /// A thread tried to wait on a queue it currently holds
    WaiterIsHolder { queue: QueueId, thread: ThreadId },

    /// A thread tried to wait while already blocked on another queue
    AlreadyWaiting { thread: ThreadId, queue: QueueId },

    /// Queue handle does not name a queue of this scheduler
    UnknownQueue { queue: QueueId },

    /// Donation walk exceeded the thread-population bound
    DonationDepthExceeded { start: ThreadId, limit: usize },
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PriorityOutOfRange { value, min, max } => {
                write!(f, "priority {} outside range {}..={}", value, min, max)
            }
            Self::QueueNotEmpty { queue, waiters } => {
                write!(f, "uncontended acquire of {} with {} waiter(s)", queue, waiters)
            }
            Self::QueueAlreadyHeld { queue, holder } => {
                write!(f, "uncontended acquire of {} held by thread {}", queue, holder)
            }
            Self::WaiterIsHolder { queue, thread } => {
                write!(f, "thread {} cannot wait on {} it holds", thread, queue)
            }
            Self::AlreadyWaiting { thread, queue } => {
                write!(f, "thread {} is already waiting on {}", thread, queue)
            }
            Self::UnknownQueue { queue } => {
                write!(f, "{} does not exist", queue)
            }
            Self::DonationDepthExceeded { start, limit } => {
                write!(
                    f,
                    "donation walk from thread {} exceeded {} hops",
                    start, limit
                )
            }
        }
    }
}

/// Result type for scheduler operations
pub type SchedResult<T> = Result<T, SchedError>;
