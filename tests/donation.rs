//! End-to-end scheduling scenarios
//!
//! Exercises the public facade the way the kernel's lock and join layers do:
//! explicit thread identities, queues created per resource, ownership moved
//! only through `next_thread`.

use rondo_sched::{PriorityScheduler, SchedError, PRIORITY_DEFAULT, PRIORITY_MAX, PRIORITY_MIN};

#[test]
fn low_priority_holder_inherits_from_waiter() {
    // Thread 1 at the default priority acquires a transferring queue;
    // thread 2 at priority 5 blocks on it.
    let sched = PriorityScheduler::new();
    let q = sched.new_queue(true);

    sched.acquire(q, 1).unwrap();
    sched.set_priority(2, 5).unwrap();
    sched.wait_for_access(q, 2).unwrap();

    assert_eq!(sched.priority(1).value(), PRIORITY_DEFAULT);
    assert_eq!(sched.effective_priority(1).value(), 5);
    // The waiter itself is unchanged.
    assert_eq!(sched.effective_priority(2).value(), 5);
    assert_eq!(sched.priority(2).value(), 5);
}

#[test]
fn equal_priority_waiters_drain_fifo() {
    let sched = PriorityScheduler::new();
    let q = sched.new_queue(true);

    sched.acquire(q, 99).unwrap();
    for thread in [1, 2, 3] {
        sched.set_priority(thread, 2).unwrap();
        sched.wait_for_access(q, thread).unwrap();
    }

    assert_eq!(sched.next_thread(q).unwrap(), Some(1));
    assert_eq!(sched.next_thread(q).unwrap(), Some(2));
    assert_eq!(sched.next_thread(q).unwrap(), Some(3));
    assert_eq!(sched.next_thread(q).unwrap(), None);
}

#[test]
fn reentering_waiter_goes_to_the_back_of_its_class() {
    let sched = PriorityScheduler::new();
    let q = sched.new_queue(true);

    sched.acquire(q, 99).unwrap();
    for thread in [1, 2, 3] {
        sched.set_priority(thread, 2).unwrap();
        sched.wait_for_access(q, thread).unwrap();
    }

    // 1 is granted the queue, releases it and waits again: round-robin
    // within the priority class puts it behind 2 and 3.
    assert_eq!(sched.next_thread(q).unwrap(), Some(1));
    assert_eq!(sched.next_thread(q).unwrap(), Some(2));
    sched.wait_for_access(q, 1).unwrap();
    assert_eq!(sched.next_thread(q).unwrap(), Some(3));
    assert_eq!(sched.next_thread(q).unwrap(), Some(1));
}

#[test]
fn priority_set_on_waiter_reaches_holder_without_other_calls() {
    let sched = PriorityScheduler::new();
    let q = sched.new_queue(true);

    sched.acquire(q, 1).unwrap();
    sched.set_priority(2, 2).unwrap();
    sched.wait_for_access(q, 2).unwrap();

    sched.set_priority(2, 7).unwrap();
    assert!(sched.effective_priority(1).value() >= 7);
}

#[test]
fn donation_crosses_two_locks() {
    let sched = PriorityScheduler::new();
    let q1 = sched.new_queue(true);
    let q2 = sched.new_queue(true);

    // C(2) holds q2. A(1) holds q1 and blocks on q2. B(5) blocks on q1.
    sched.set_priority(1, 1).unwrap();
    sched.set_priority(2, 5).unwrap();
    sched.set_priority(3, 2).unwrap();
    sched.acquire(q2, 3).unwrap();
    sched.acquire(q1, 1).unwrap();
    sched.wait_for_access(q2, 1).unwrap();
    sched.wait_for_access(q1, 2).unwrap();

    assert_eq!(sched.effective_priority(1).value(), 5);
    assert!(sched.effective_priority(3).value() >= 5);

    // C hands q2 over; A becomes its holder and C drops back to base.
    assert_eq!(sched.next_thread(q2).unwrap(), Some(1));
    assert_eq!(sched.effective_priority(3).value(), 2);
    assert_eq!(sched.effective_priority(1).value(), 5);
}

#[test]
fn effective_priority_is_stable_without_changes() {
    let sched = PriorityScheduler::new();
    let q = sched.new_queue(true);

    sched.acquire(q, 1).unwrap();
    sched.set_priority(2, 4).unwrap();
    sched.wait_for_access(q, 2).unwrap();

    let first = sched.effective_priority(1);
    // A same-value set is a no-op and must not perturb anything.
    sched.set_priority(2, 4).unwrap();
    assert_eq!(sched.effective_priority(1), first);
    assert_eq!(sched.effective_priority(1), first);
}

#[test]
fn priority_bounds_are_enforced() {
    let sched = PriorityScheduler::new();

    assert!(matches!(
        sched.set_priority(1, PRIORITY_MAX + 1),
        Err(SchedError::PriorityOutOfRange { .. })
    ));

    sched.set_priority(1, PRIORITY_MAX).unwrap();
    assert_eq!(sched.increase_priority(1).unwrap(), false);
    assert_eq!(sched.priority(1).value(), PRIORITY_MAX);

    sched.set_priority(1, PRIORITY_MIN).unwrap();
    assert_eq!(sched.decrease_priority(1).unwrap(), false);
    assert_eq!(sched.priority(1).value(), PRIORITY_MIN);

    // Off the boundary both steps report a change.
    sched.set_priority(1, 3).unwrap();
    assert_eq!(sched.increase_priority(1).unwrap(), true);
    assert_eq!(sched.decrease_priority(1).unwrap(), true);
    assert_eq!(sched.priority(1).value(), 3);
}

#[test]
fn timer_wakeup_cancels_the_wait_idempotently() {
    let sched = PriorityScheduler::new();
    let q = sched.new_queue(true);

    sched.acquire(q, 1).unwrap();
    sched.set_priority(2, 6).unwrap();
    sched.wait_for_access(q, 2).unwrap();
    assert_eq!(sched.effective_priority(1).value(), 6);

    // The timer facility woke thread 2; it deregisters the wait.
    assert_eq!(sched.cancel_wait(2).unwrap(), true);
    assert_eq!(sched.cancel_wait(2).unwrap(), false);
    assert_eq!(sched.queue_len(q).unwrap(), 0);
    assert_eq!(sched.effective_priority(1).value(), PRIORITY_DEFAULT);

    // The thread can wait again afterwards.
    sched.wait_for_access(q, 2).unwrap();
    assert_eq!(sched.pick_next_thread(q).unwrap(), Some(2));
}

#[test]
fn snapshot_lists_waiters_in_selection_order() {
    let sched = PriorityScheduler::new();
    let q = sched.new_queue(true);

    sched.acquire(q, 99).unwrap();
    sched.set_priority(1, 2).unwrap();
    sched.set_priority(2, 7).unwrap();
    sched.set_priority(3, 2).unwrap();
    sched.wait_for_access(q, 1).unwrap();
    sched.wait_for_access(q, 2).unwrap();
    sched.wait_for_access(q, 3).unwrap();

    let snap = sched.queue_snapshot(q).unwrap();
    assert!(snap.transfers_priority);
    assert_eq!(snap.holder, Some(99));
    assert_eq!(snap.waiters, vec![2, 1, 3]);
}
