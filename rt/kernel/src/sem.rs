//! Counting semaphores
//!
//! The counter goes negative while threads wait: `-n` means `n` queued
//! waiters. Waiters queue FIFO; the counter is never positive while the
//! queue is non-empty.

use rtk_core::{KernelResult, Timeout, WaitResult, MSG_OK, MSG_RESET};

use crate::arena::Arena;
use crate::kernel::{with_kernel, Kernel, Outcome};
use crate::thread::{SemId, ThreadState};
use crate::tqueue::ThreadQueue;
use crate::{halt, kernel_assert, MAX_SEMAPHORES};

/// A counting semaphore: a counter plus a queue of waiters.
pub struct Semaphore {
    pub(crate) counter: i32,
    pub(crate) queue: ThreadQueue,
}

impl Semaphore {
    pub(crate) fn new(initial: i32) -> Self {
        Semaphore {
            counter: initial,
            queue: ThreadQueue::new(),
        }
    }
}

fn sem_ref(sems: &Arena<Semaphore, MAX_SEMAPHORES>, sem: SemId) -> &Semaphore {
    match sems.get(sem) {
        Some(record) => record,
        None => halt("stale semaphore handle"),
    }
}

fn sem_mut(sems: &mut Arena<Semaphore, MAX_SEMAPHORES>, sem: SemId) -> &mut Semaphore {
    match sems.get_mut(sem) {
        Some(record) => record,
        None => halt("stale semaphore handle"),
    }
}

impl Kernel {
    /// Creates a semaphore with a non-negative initial count.
    pub fn sem_create(&mut self, initial: i32) -> KernelResult<SemId> {
        kernel_assert!(initial >= 0, "semaphore created with negative count");
        self.sems.alloc(Semaphore::new(initial))
    }

    /// Frees a semaphore. Pending waits are aborted as by
    /// [`sem_reset_i`](Self::sem_reset_i).
    pub fn sem_free(&mut self, sem: SemId) {
        self.sem_reset_i(sem, 0);
        self.sems.free(sem);
    }

    /// Current counter value; negative values count queued waiters.
    pub fn sem_counter(&self, sem: SemId) -> i32 {
        sem_ref(&self.sems, sem).counter
    }

    /// Takes the semaphore, blocking up to `timeout` when the counter
    /// is not positive. S-class.
    pub fn sem_wait_s(&mut self, sem: SemId, timeout: Timeout) -> Outcome {
        let record = sem_mut(&mut self.sems, sem);
        record.counter -= 1;
        if record.counter >= 0 {
            return Outcome::Ready(WaitResult::Completed(MSG_OK));
        }
        if timeout.is_immediate() {
            record.counter += 1;
            return Outcome::Ready(WaitResult::Timeout);
        }

        let waiter = self.current();
        let mut queue = sem_ref(&self.sems, sem).queue;
        queue.insert_back(&mut self.threads, waiter);
        sem_mut(&mut self.sems, sem).queue = queue;
        self.go_to_sleep_timeout_s(ThreadState::WtSem(sem), timeout)
    }

    /// Releases the semaphore: wakes the longest-waiting thread, or
    /// increments the counter when nobody waits. I-class.
    pub fn sem_signal_i(&mut self, sem: SemId) {
        let record = sem_mut(&mut self.sems, sem);
        record.counter += 1;
        if record.counter <= 0 {
            let mut queue = record.queue;
            let woken = queue.pop_front(&mut self.threads);
            sem_mut(&mut self.sems, sem).queue = queue;
            match woken {
                Some(t) => self.make_ready(t, MSG_OK),
                None => halt("negative semaphore with empty queue"),
            }
        }
    }

    /// [`sem_signal_i`](Self::sem_signal_i) followed by a preemption
    /// check. S-class.
    pub fn sem_signal_s(&mut self, sem: SemId) {
        self.sem_signal_i(sem);
        self.reschedule_s();
    }

    /// Aborts every pending wait with [`WaitResult::Reset`] and sets
    /// the counter to `n`. I-class.
    pub fn sem_reset_i(&mut self, sem: SemId, n: i32) {
        kernel_assert!(n >= 0, "semaphore reset to negative count");
        let mut queue = sem_ref(&self.sems, sem).queue;
        while let Some(t) = queue.pop_front(&mut self.threads) {
            self.make_ready(t, MSG_RESET);
        }
        let record = sem_mut(&mut self.sems, sem);
        record.queue = queue;
        record.counter = n;
    }

    /// Lock-free-style fast take: decrements without ever blocking.
    ///
    /// Precondition (not checked): the caller has proven the counter is
    /// positive, e.g. by a preceding [`sem_counter`](Self::sem_counter)
    /// under the same critical section. I-class.
    pub fn sem_fast_wait_i(&mut self, sem: SemId) {
        let record = sem_mut(&mut self.sems, sem);
        record.counter -= 1;
        kernel_assert!(record.counter >= 0, "fast wait drove the counter negative");
    }

    /// Fast give: increments without waking anybody.
    ///
    /// Precondition (not checked): no thread is queued on the
    /// semaphore. I-class.
    pub fn sem_fast_signal_i(&mut self, sem: SemId) {
        let record = sem_mut(&mut self.sems, sem);
        kernel_assert!(record.queue.is_empty(), "fast signal with queued waiters");
        record.counter += 1;
    }
}

/// X-class wrapper: signal from thread context with preemption.
pub fn signal(sem: SemId) {
    with_kernel(|k| k.sem_signal_s(sem));
}

/// X-class wrapper: abort all pending waits.
pub fn reset(sem: SemId, n: i32) {
    with_kernel(|k| {
        k.sem_reset_i(sem, n);
        k.reschedule_s();
    });
}
