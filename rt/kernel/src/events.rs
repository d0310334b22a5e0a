//! Event flags and broadcast sources
//!
//! Every thread carries a pending-flags mask; signaling ORs flags into
//! it and wakes the thread when its wait predicate (any, one, or all of
//! a mask) is satisfied. An [`EventSource`] fans a broadcast out to
//! registered listener threads, each with its own delivery mask, so one
//! hardware or software event can wake several unrelated threads.
//!
//! The flags consumed by a completed wait are recorded in the thread's
//! `served` mask rather than the wakeup message, keeping flag bit 31
//! from colliding with the negative status messages.

use rtk_core::{EventMask, KernelError, KernelResult, Timeout, WaitResult, MSG_OK};

use crate::arena::Arena;
use crate::kernel::{with_kernel, Kernel, Outcome};
use crate::thread::{EventSourceId, ThreadId, ThreadState};
use crate::{halt, kernel_assert, MAX_EVENT_SOURCES, MAX_LISTENERS};

/// A registered listener: the thread and the flags a broadcast delivers
/// to it.
#[derive(Debug, Clone, Copy)]
struct Listener {
    thread: ThreadId,
    mask: EventMask,
}

/// A broadcast fan-out point for event flags.
pub struct EventSource {
    listeners: heapless::Vec<Listener, MAX_LISTENERS>,
}

impl EventSource {
    pub(crate) fn new() -> Self {
        EventSource {
            listeners: heapless::Vec::new(),
        }
    }
}

fn source_ref(
    sources: &Arena<EventSource, MAX_EVENT_SOURCES>,
    source: EventSourceId,
) -> &EventSource {
    match sources.get(source) {
        Some(record) => record,
        None => halt("stale event source handle"),
    }
}

fn source_mut(
    sources: &mut Arena<EventSource, MAX_EVENT_SOURCES>,
    source: EventSourceId,
) -> &mut EventSource {
    match sources.get_mut(source) {
        Some(record) => record,
        None => halt("stale event source handle"),
    }
}

impl Kernel {
    /// Creates an event source with no listeners.
    pub fn evt_source_create(&mut self) -> KernelResult<EventSourceId> {
        self.sources.alloc(EventSource::new())
    }

    /// Frees an event source; listeners are simply forgotten.
    pub fn evt_source_free(&mut self, source: EventSourceId) {
        self.sources.free(source);
    }

    /// Registers `t` on the source: every broadcast will deliver `mask`
    /// to it. A thread registers on a given source at most once.
    pub fn evt_register(
        &mut self,
        source: EventSourceId,
        t: ThreadId,
        mask: EventMask,
    ) -> KernelResult<()> {
        let record = source_mut(&mut self.sources, source);
        kernel_assert!(
            record.listeners.iter().all(|l| l.thread != t),
            "thread registered twice on an event source"
        );
        record
            .listeners
            .push(Listener { thread: t, mask })
            .map_err(|_| KernelError::TooManyListeners)
    }

    /// Removes `t` from the source's listeners; no-op if absent.
    pub fn evt_unregister(&mut self, source: EventSourceId, t: ThreadId) {
        let record = source_mut(&mut self.sources, source);
        record.listeners.retain(|l| l.thread != t);
    }

    /// Number of registered listeners.
    pub fn evt_listener_count(&self, source: EventSourceId) -> usize {
        source_ref(&self.sources, source).listeners.len()
    }

    /// Delivers each listener's mask to its thread. I-class.
    pub fn evt_broadcast_i(&mut self, source: EventSourceId) {
        self.evt_broadcast_flags_i(source, EventMask::NONE);
    }

    /// As [`evt_broadcast_i`](Self::evt_broadcast_i), additionally
    /// ORing `extra` into every delivery. I-class.
    pub fn evt_broadcast_flags_i(&mut self, source: EventSourceId, extra: EventMask) {
        // Listeners are copied out so signaling can mutate thread state.
        let listeners = source_ref(&self.sources, source).listeners.clone();
        for listener in listeners {
            self.evt_signal_i(listener.thread, listener.mask | extra);
        }
    }

    /// [`evt_broadcast_i`](Self::evt_broadcast_i) plus a preemption
    /// check. S-class.
    pub fn evt_broadcast_s(&mut self, source: EventSourceId) {
        self.evt_broadcast_i(source);
        self.reschedule_s();
    }

    /// ORs `mask` into `t`'s pending flags, waking it if that satisfies
    /// an event wait. Flags delivered to a non-waiting thread stay
    /// pending until consumed. I-class.
    pub fn evt_signal_i(&mut self, t: ThreadId, mask: EventMask) {
        if mask.is_empty() {
            return;
        }
        {
            let record = self.thread_mut(t);
            record.pending = record.pending | mask;
        }
        match self.thread(t).state {
            ThreadState::WtOrEvt { mask: wanted, one } => {
                let matched = self.thread(t).pending & wanted;
                if !matched.is_empty() {
                    let served = if one { matched.lowest() } else { matched };
                    self.consume(t, served);
                    self.make_ready(t, MSG_OK);
                }
            }
            ThreadState::WtAndEvt(wanted) => {
                if self.thread(t).pending.contains(wanted) {
                    self.consume(t, wanted);
                    self.make_ready(t, MSG_OK);
                }
            }
            _ => {}
        }
    }

    /// [`evt_signal_i`](Self::evt_signal_i) plus a preemption check.
    /// S-class.
    pub fn evt_signal_s(&mut self, t: ThreadId, mask: EventMask) {
        self.evt_signal_i(t, mask);
        self.reschedule_s();
    }

    /// Waits until any flag in `mask` is pending; all matching flags
    /// are consumed. The consumed set is readable afterwards through
    /// [`Thread::served_events`](crate::thread::Thread::served_events).
    /// S-class.
    pub fn evt_wait_any_s(&mut self, mask: EventMask, timeout: Timeout) -> Outcome {
        self.evt_wait_or(mask, false, timeout)
    }

    /// Waits until any flag in `mask` is pending and consumes only the
    /// lowest matching flag, preserving the others. S-class.
    pub fn evt_wait_one_s(&mut self, mask: EventMask, timeout: Timeout) -> Outcome {
        self.evt_wait_or(mask, true, timeout)
    }

    /// Waits until every flag in `mask` is pending; exactly `mask` is
    /// consumed. S-class.
    pub fn evt_wait_all_s(&mut self, mask: EventMask, timeout: Timeout) -> Outcome {
        kernel_assert!(!mask.is_empty(), "event wait on an empty mask");
        let waiter = self.current();
        if self.thread(waiter).pending.contains(mask) {
            self.consume(waiter, mask);
            return Outcome::Ready(WaitResult::Completed(MSG_OK));
        }
        if timeout.is_immediate() {
            return Outcome::Ready(WaitResult::Timeout);
        }
        self.thread_mut(waiter).served = EventMask::NONE;
        self.go_to_sleep_timeout_s(ThreadState::WtAndEvt(mask), timeout)
    }

    fn evt_wait_or(&mut self, mask: EventMask, one: bool, timeout: Timeout) -> Outcome {
        kernel_assert!(!mask.is_empty(), "event wait on an empty mask");
        let waiter = self.current();
        let matched = self.thread(waiter).pending & mask;
        if !matched.is_empty() {
            let served = if one { matched.lowest() } else { matched };
            self.consume(waiter, served);
            return Outcome::Ready(WaitResult::Completed(MSG_OK));
        }
        if timeout.is_immediate() {
            return Outcome::Ready(WaitResult::Timeout);
        }
        self.thread_mut(waiter).served = EventMask::NONE;
        self.go_to_sleep_timeout_s(ThreadState::WtOrEvt { mask, one }, timeout)
    }

    /// Non-blocking probe: takes and clears the pending flags of `t`
    /// matching `mask`, without touching any wait state. I-class.
    pub fn evt_get_and_clear_i(&mut self, t: ThreadId, mask: EventMask) -> EventMask {
        let record = self.thread_mut(t);
        let taken = record.pending & mask;
        record.pending.clear(taken);
        taken
    }

    /// Clears `served` from the pending set and records it as the
    /// outcome of the wait.
    fn consume(&mut self, t: ThreadId, served: EventMask) {
        let record = self.thread_mut(t);
        record.pending.clear(served);
        record.served = served;
    }
}

/// X-class wrapper: broadcast a source from thread context.
pub fn broadcast(source: EventSourceId) {
    with_kernel(|k| k.evt_broadcast_s(source));
}

/// X-class wrapper: signal flags to a thread from thread context.
pub fn signal(t: ThreadId, mask: EventMask) {
    with_kernel(|k| k.evt_signal_s(t, mask));
}
