//! Condition variables
//!
//! A condition variable pairs with whatever mutex the waiter holds at
//! the time of the wait (the head of its owned list). The wait
//! atomically releases that mutex and parks; signal and broadcast hand
//! the woken waiter straight back to the mutex, re-queueing it there
//! when the mutex is already taken, so by the time the waiter runs
//! again it owns the mutex. The one exception is a timed-out wait,
//! which returns without the mutex; the caller re-locks before
//! re-checking its predicate.

use rtk_core::{KernelResult, Message, Timeout, MSG_OK, MSG_RESET};

use crate::arena::Arena;
use crate::kernel::{with_kernel, Kernel, Outcome};
use crate::thread::{CondId, ThreadId, ThreadState};
use crate::tqueue::ThreadQueue;
use crate::{halt, kernel_assert, MAX_CONDVARS};

/// A condition variable: a priority-ordered queue of waiters.
pub struct CondVar {
    pub(crate) queue: ThreadQueue,
}

impl CondVar {
    pub(crate) fn new() -> Self {
        CondVar {
            queue: ThreadQueue::new(),
        }
    }
}

fn cond_ref(condvars: &Arena<CondVar, MAX_CONDVARS>, cond: CondId) -> &CondVar {
    match condvars.get(cond) {
        Some(record) => record,
        None => halt("stale condvar handle"),
    }
}

fn cond_mut(condvars: &mut Arena<CondVar, MAX_CONDVARS>, cond: CondId) -> &mut CondVar {
    match condvars.get_mut(cond) {
        Some(record) => record,
        None => halt("stale condvar handle"),
    }
}

impl Kernel {
    /// Creates a condition variable.
    pub fn cond_create(&mut self) -> KernelResult<CondId> {
        self.condvars.alloc(CondVar::new())
    }

    /// Frees a condition variable, which must have no waiters.
    pub fn cond_free(&mut self, cond: CondId) {
        kernel_assert!(
            cond_ref(&self.condvars, cond).queue.is_empty(),
            "freeing a condvar with waiters"
        );
        self.condvars.free(cond);
    }

    /// Releases the caller's most recently locked mutex and parks on the
    /// condition variable, all under the same critical section. On
    /// signal or broadcast the mutex is re-acquired before the thread
    /// resumes; on timeout it is not. S-class.
    pub fn cond_wait_s(&mut self, cond: CondId, timeout: Timeout) -> Outcome {
        let waiter = self.current();
        let mutex = match self.thread(waiter).owned {
            Some(mutex) => mutex,
            None => halt("condition wait without a locked mutex"),
        };
        kernel_assert!(
            !timeout.is_immediate(),
            "condition wait with an immediate timeout"
        );

        self.mtx_unlock_inner(mutex);
        let mut queue = cond_ref(&self.condvars, cond).queue;
        queue.insert_priority(&mut self.threads, waiter);
        cond_mut(&mut self.condvars, cond).queue = queue;
        self.go_to_sleep_timeout_s(ThreadState::WtCond { cond, mutex }, timeout)
    }

    /// Wakes the highest-priority waiter with `MSG_OK`. I-class.
    pub fn cond_signal_i(&mut self, cond: CondId) {
        let mut queue = cond_ref(&self.condvars, cond).queue;
        let woken = queue.pop_front(&mut self.threads);
        cond_mut(&mut self.condvars, cond).queue = queue;
        if let Some(t) = woken {
            self.hand_back_to_mutex(t, MSG_OK);
        }
    }

    /// [`cond_signal_i`](Self::cond_signal_i) plus a preemption check.
    /// S-class.
    pub fn cond_signal_s(&mut self, cond: CondId) {
        self.cond_signal_i(cond);
        self.reschedule_s();
    }

    /// Wakes every waiter with `MSG_RESET`, so resumed threads can tell
    /// a broadcast from a directed signal. I-class.
    pub fn cond_broadcast_i(&mut self, cond: CondId) {
        let mut queue = cond_ref(&self.condvars, cond).queue;
        while let Some(t) = queue.pop_front(&mut self.threads) {
            self.hand_back_to_mutex(t, MSG_RESET);
        }
        cond_mut(&mut self.condvars, cond).queue = queue;
    }

    /// [`cond_broadcast_i`](Self::cond_broadcast_i) plus a preemption
    /// check. S-class.
    pub fn cond_broadcast_s(&mut self, cond: CondId) {
        self.cond_broadcast_i(cond);
        self.reschedule_s();
    }

    /// Moves a woken condvar waiter to its mutex. The wait timer is
    /// disarmed here so an in-flight timeout cannot swallow the signal
    /// while the thread queues for the mutex.
    fn hand_back_to_mutex(&mut self, t: ThreadId, msg: Message) {
        let mutex = match self.thread(t).state {
            ThreadState::WtCond { mutex, .. } => mutex,
            _ => halt("condvar queue held a non-waiting thread"),
        };
        self.disarm_wait_timer(t);
        if self.mtx_grant_or_enqueue(mutex, t, msg) {
            self.make_ready(t, msg);
        }
    }
}

/// X-class wrapper: signal from thread context with preemption.
pub fn signal(cond: CondId) {
    with_kernel(|k| k.cond_signal_s(cond));
}

/// X-class wrapper: broadcast from thread context with preemption.
pub fn broadcast(cond: CondId) {
    with_kernel(|k| k.cond_broadcast_s(cond));
}
