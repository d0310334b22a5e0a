//! Synchronous message rendezvous
//!
//! A sender parks on the receiver's sender queue carrying its payload
//! and stays blocked until the receiver explicitly releases it with a
//! reply, so the payload needs no copy and a sender can never outrun a
//! slow receiver. Senders queue FIFO by default, or in priority order
//! when [`KernelConfig::msg_priority_order`] is set.
//!
//! [`KernelConfig::msg_priority_order`]: crate::kernel::KernelConfig::msg_priority_order

use rtk_core::{Message, WaitResult, MSG_OK};

use crate::kernel::{Kernel, Outcome};
use crate::thread::{ThreadId, ThreadState};
use crate::kernel_assert;

impl Kernel {
    /// Sends `msg` to `receiver`: parks the caller on the receiver's
    /// sender queue until the receiver releases it. The reply passed to
    /// [`msg_release_s`](Self::msg_release_s) becomes the caller's
    /// wakeup message. S-class.
    pub fn msg_send_s(&mut self, receiver: ThreadId, msg: Message) -> Outcome {
        let sender = self.current();
        kernel_assert!(receiver != sender, "rendezvous with self");

        self.thread_mut(sender).msg = msg;
        let priority_order = self.config.msg_priority_order;
        let mut queue = self.thread(receiver).msg_waiters;
        self.enqueue_sender(&mut queue, sender, priority_order);
        self.thread_mut(receiver).msg_waiters = queue;

        if self.thread(receiver).state == ThreadState::WtMsg {
            self.make_ready(receiver, MSG_OK);
        }
        self.go_to_sleep_s(ThreadState::SndMsg(receiver));
        Outcome::Suspended
    }

    /// Blocks until at least one sender is queued on the caller. The
    /// caller then dequeues it with [`msg_poll_i`](Self::msg_poll_i).
    /// S-class.
    pub fn msg_wait_s(&mut self) -> Outcome {
        let receiver = self.current();
        if !self.thread(receiver).msg_waiters.is_empty() {
            return Outcome::Ready(WaitResult::Completed(MSG_OK));
        }
        self.go_to_sleep_s(ThreadState::WtMsg);
        Outcome::Suspended
    }

    /// Dequeues the caller's next pending sender with its payload, or
    /// `None` if nobody is queued. The sender stays blocked (its
    /// payload stays stable) until released. I-class.
    pub fn msg_poll_i(&mut self) -> Option<(ThreadId, Message)> {
        let receiver = self.current();
        let mut queue = self.thread(receiver).msg_waiters;
        let sender = queue.pop_front(&mut self.threads);
        self.thread_mut(receiver).msg_waiters = queue;
        sender.map(|s| (s, self.thread(s).msg))
    }

    /// Payload of a sender currently blocked in a rendezvous, read
    /// without copying it out of the rendezvous.
    pub fn msg_get(&self, sender: ThreadId) -> Message {
        kernel_assert!(
            matches!(self.thread(sender).state, ThreadState::SndMsg(_)),
            "reading a message from a thread not in a rendezvous"
        );
        self.thread(sender).msg
    }

    /// Ends the rendezvous: wakes a previously dequeued sender with the
    /// reply as its wakeup message. S-class.
    pub fn msg_release_s(&mut self, sender: ThreadId, reply: Message) {
        kernel_assert!(
            self.thread(sender).state == ThreadState::SndMsg(self.current()),
            "releasing a thread not in rendezvous with the caller"
        );
        self.make_ready(sender, reply);
        self.reschedule_s();
    }
}

/// Removes an aborted sender from its receiver's queue.
pub(crate) fn unlink_sender(k: &mut Kernel, receiver: ThreadId, sender: ThreadId) {
    let mut queue = k.thread(receiver).msg_waiters;
    queue.unlink(&mut k.threads, sender);
    k.thread_mut(receiver).msg_waiters = queue;
}
