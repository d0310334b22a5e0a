//! Ready-list scheduler
//!
//! The ready list holds runnable threads in descending effective
//! priority, FIFO among equals; the current thread is held outside the
//! queue. After every operation that can change the ready-list head the
//! caller runs [`Kernel::reschedule_s`], which guarantees the invariant
//! that the head never has strictly higher priority than the current
//! thread.
//!
//! These are infrastructure calls with no failure semantics: caller
//! invariants (never readying a runnable thread, never switching to a
//! non-ready thread) are enforced by kernel assertions.

use rtk_core::{Message, Timeout, WaitResult};

use crate::kernel::{Kernel, Outcome, Switch};
use crate::thread::{ThreadId, ThreadState};
use crate::vt::VtAction;
use crate::{halt, kernel_assert};

impl Kernel {
    /// Inserts a thread into the ready list at the position dictated by
    /// its effective priority and returns it. I-class.
    pub fn ready_i(&mut self, t: ThreadId, msg: Message) -> ThreadId {
        self.make_ready(t, msg);
        t
    }

    /// Removes a thread from its wait state and makes it ready, storing
    /// `msg` as its wakeup message. I-class.
    pub fn wakeup_i(&mut self, t: ThreadId, msg: Message) {
        kernel_assert!(self.thread(t).state.is_waiting(), "wakeup of a non-waiting thread");
        self.unlink_from_wait_queue(t);
        self.make_ready(t, msg);
    }

    /// [`wakeup_i`](Self::wakeup_i) followed by a preemption check.
    /// S-class.
    pub fn wakeup_s(&mut self, t: ThreadId, msg: Message) {
        self.wakeup_i(t, msg);
        self.reschedule_s();
    }

    /// Parks the current thread in `new_state` and switches to the head
    /// of the ready list. S-class.
    pub fn go_to_sleep_s(&mut self, new_state: ThreadState) {
        kernel_assert!(new_state.is_waiting(), "sleeping into a runnable state");
        let from = self.current;
        self.thread_mut(from).state = new_state;
        let next = self.pop_ready();
        self.switch_to(from, next);
    }

    /// As [`go_to_sleep_s`](Self::go_to_sleep_s), arming the current
    /// thread's wait timer so an un-woken wait ends with
    /// [`WaitResult::Timeout`]. The caller has already handled
    /// `Timeout::Immediate` and enqueued the thread. S-class.
    pub fn go_to_sleep_timeout_s(&mut self, new_state: ThreadState, timeout: Timeout) -> Outcome {
        match timeout.normalized() {
            Timeout::Immediate => halt("immediate timeout reached the sleep path"),
            Timeout::Infinite => {}
            Timeout::Ticks(ticks) => {
                let current = self.current;
                let timer = match self.thread(current).wait_timer {
                    Some(timer) => timer,
                    None => halt("thread has no wait timer"),
                };
                self.vt_arm_i(timer, ticks, VtAction::TimeoutWake(current), 0);
            }
        }
        self.go_to_sleep_s(new_state);
        Outcome::Suspended
    }

    /// Preemption check: switches to the ready-list head if it has
    /// strictly higher priority than the current thread, or equal
    /// priority when the round-robin quantum has expired. Returns
    /// whether a switch happened. S-class.
    pub fn reschedule_s(&mut self) -> bool {
        let head = match self.ready.front() {
            Some(head) => head,
            None => return false,
        };
        let head_prio = self.thread(head).prio;
        let cur_prio = self.thread(self.current).prio;

        if head_prio > cur_prio {
            // Preempted threads keep their place ahead of equal-priority
            // peers; their quantum was not exhausted.
            self.rotate_current(true)
        } else if head_prio == cur_prio && self.quantum_expired {
            self.rotate_current(false)
        } else {
            false
        }
    }

    /// Voluntarily yields to the ready-list head if it has equal or
    /// higher priority. S-class.
    pub fn yield_s(&mut self) -> bool {
        let head = match self.ready.front() {
            Some(head) => head,
            None => return false,
        };
        if self.thread(head).prio >= self.thread(self.current).prio {
            self.rotate_current(false)
        } else {
            false
        }
    }

    /// Requeues the current thread as ready and switches to the head.
    /// `ahead` places it before equal-priority peers.
    fn rotate_current(&mut self, ahead: bool) -> bool {
        let from = self.current;
        self.thread_mut(from).state = ThreadState::Ready;
        if ahead {
            self.ready.insert_priority_ahead(&mut self.threads, from);
        } else {
            self.ready.insert_priority(&mut self.threads, from);
        }
        let next = self.pop_ready();
        self.switch_to(from, next);
        true
    }

    fn pop_ready(&mut self) -> ThreadId {
        match self.ready.pop_front(&mut self.threads) {
            Some(next) => next,
            // The idle thread never blocks, so the ready list can only
            // be empty if that invariant was broken.
            None => halt("ready list empty"),
        }
    }

    /// Performs the logical context switch and records it for the port.
    pub(crate) fn switch_to(&mut self, from: ThreadId, to: ThreadId) {
        kernel_assert!(
            self.thread(to).state == ThreadState::Ready,
            "switching to a non-ready thread"
        );
        let quantum = self.config.quantum;
        {
            let record = self.thread_mut(to);
            record.state = ThreadState::Current;
            record.resumes += 1;
            record.quantum = quantum;
        }
        self.current = to;
        self.quantum_expired = false;
        self.switch_count += 1;
        self.pending_switch = Some(Switch { from, to });

        if to == self.idle {
            if let Some(callback) = self.config.idle_callback {
                callback();
            }
        }
    }

    /// Timeout delivery: called by the timer subsystem when a bounded
    /// wait expires.
    pub(crate) fn timeout_wakeup(&mut self, t: ThreadId) {
        if !self.threads.contains(t) {
            return;
        }
        if self.thread(t).state.is_waiting() {
            self.unlink_from_wait_queue(t);
            self.make_ready(t, WaitResult::Timeout.into_message());
        }
    }
}
