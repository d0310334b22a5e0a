//! Thread records, the thread state machine and the thread lifecycle

use core::fmt;

use rtk_core::{
    EventMask, KernelError, KernelResult, Message, Priority, SysTime, Ticks, Timeout, WaitResult,
    MSG_OK,
};

use crate::arena::{Arena, Handle};
use crate::cond::CondVar;
use crate::ioq::IoQueue;
use crate::kernel::{Kernel, Outcome};
use crate::mutex::Mutex;
use crate::port::{Allocator, Context};
use crate::sem::Semaphore;
use crate::tqueue::ThreadQueue;
use crate::vt::{VTimer, VtId};
use crate::{halt, kernel_assert, EventSource, MAX_THREADS};

/// Handle to a thread record.
pub type ThreadId = Handle<Thread>;

pub(crate) type Threads = Arena<Thread, MAX_THREADS>;

/// Handle aliases for the objects a thread can wait on.
pub type SemId = Handle<Semaphore>;
pub type MutexId = Handle<Mutex>;
pub type CondId = Handle<CondVar>;
pub type EventSourceId = Handle<EventSource>;
pub type IoqId = Handle<IoQueue>;

/// Thread entry function, receiving the opaque argument given at
/// creation. Consumed by the port when it builds the initial context.
pub type ThreadFn = fn(usize);

/// State of a thread, carrying the state-specific payload.
///
/// Exactly one payload is valid at a time; the variants make the tagged
/// union of the classic design exhaustive at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Created but not yet started.
    WtStart,
    /// Runnable, linked in the ready list.
    Ready,
    /// The one running thread; never linked in any queue.
    Current,
    /// In a timed sleep.
    Sleeping,
    /// Suspended until explicitly resumed.
    Suspended,
    /// Parked on a semaphore.
    WtSem(SemId),
    /// Parked on a mutex, waiting for ownership.
    WtMtx(MutexId),
    /// Parked on a condition variable; the mutex is re-acquired on wakeup.
    WtCond { cond: CondId, mutex: MutexId },
    /// Waiting until any flag of `mask` is pending. With `one` set, only
    /// the lowest satisfying flag is consumed.
    WtOrEvt { mask: EventMask, one: bool },
    /// Waiting until every flag of the mask is pending.
    WtAndEvt(EventMask),
    /// Sender blocked in a rendezvous with the given receiver.
    SndMsg(ThreadId),
    /// Receiver waiting for a sender.
    WtMsg,
    /// Parked on a byte I/O queue.
    Queued(IoqId),
    /// Waiting for another thread to terminate.
    WtExit(ThreadId),
    /// Terminated; payload is the exit code.
    Final(Message),
}

impl ThreadState {
    /// Whether a thread in this state is parked in some wait queue.
    pub const fn is_waiting(&self) -> bool {
        !matches!(
            self,
            ThreadState::WtStart
                | ThreadState::Ready
                | ThreadState::Current
                | ThreadState::Final(_)
        )
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ThreadState::WtStart => "WTSTART",
            ThreadState::Ready => "READY",
            ThreadState::Current => "CURRENT",
            ThreadState::Sleeping => "SLEEPING",
            ThreadState::Suspended => "SUSPENDED",
            ThreadState::WtSem(_) => "WTSEM",
            ThreadState::WtMtx(_) => "WTMTX",
            ThreadState::WtCond { .. } => "WTCOND",
            ThreadState::WtOrEvt { .. } => "WTOREVT",
            ThreadState::WtAndEvt(_) => "WTANDEVT",
            ThreadState::SndMsg(_) => "SNDMSG",
            ThreadState::WtMsg => "WTMSG",
            ThreadState::Queued(_) => "QUEUED",
            ThreadState::WtExit(_) => "WTEXIT",
            ThreadState::Final(_) => "FINAL",
        };
        f.write_str(tag)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ThreadState {
    fn format(&self, fmt: defmt::Formatter) {
        let tag = match self {
            ThreadState::WtStart => "WTSTART",
            ThreadState::Ready => "READY",
            ThreadState::Current => "CURRENT",
            ThreadState::Sleeping => "SLEEPING",
            ThreadState::Suspended => "SUSPENDED",
            ThreadState::WtSem(_) => "WTSEM",
            ThreadState::WtMtx(_) => "WTMTX",
            ThreadState::WtCond { .. } => "WTCOND",
            ThreadState::WtOrEvt { .. } => "WTOREVT",
            ThreadState::WtAndEvt(_) => "WTANDEVT",
            ThreadState::SndMsg(_) => "SNDMSG",
            ThreadState::WtMsg => "WTMSG",
            ThreadState::Queued(_) => "QUEUED",
            ThreadState::WtExit(_) => "WTEXIT",
            ThreadState::Final(_) => "FINAL",
        };
        defmt::write!(fmt, "{=str}", tag);
    }
}

/// A thread record in the arena.
///
/// The intrusive `next`/`prev` links place the thread in at most one
/// queue at any instant: the ready list, one primitive's wait queue, or
/// one thread's termination list.
pub struct Thread {
    pub(crate) name: &'static str,
    pub(crate) state: ThreadState,
    /// Non-inherited priority.
    pub(crate) base_prio: Priority,
    /// Effective priority; equals `base_prio` unless boosted by a mutex.
    pub(crate) prio: Priority,
    /// Record and stack come from an allocator and are reclaimed.
    pub(crate) dynamic: bool,
    /// Cooperative termination request, polled by the thread.
    pub(crate) term_requested: bool,
    /// References held on this thread (creator, joiners).
    pub(crate) refs: u8,

    // Intrusive queue links.
    pub(crate) next: Option<ThreadId>,
    pub(crate) prev: Option<ThreadId>,

    /// Message stored by the wakeup that ended the last wait.
    pub(crate) wakeup: Message,
    /// Value carried while blocked: a rendezvous payload, the byte of a
    /// blocked queue put, or the message a mutex handover will deliver.
    pub(crate) msg: Message,
    /// Senders parked in a rendezvous with this thread.
    pub(crate) msg_waiters: ThreadQueue,
    /// Threads joined on this one.
    pub(crate) joiners: ThreadQueue,
    /// Pending (not yet consumed) event flags.
    pub(crate) pending: EventMask,
    /// Flags consumed by the last completed event wait.
    pub(crate) served: EventMask,
    /// Head of the LIFO list of owned mutexes, linked through the mutex
    /// records.
    pub(crate) owned: Option<MutexId>,
    /// Dedicated timer backing this thread's bounded waits.
    pub(crate) wait_timer: Option<VtId>,
    /// Remaining round-robin quantum.
    pub(crate) quantum: Ticks,

    /// Opaque saved execution context, interpreted by the port.
    pub(crate) context: Context,
    pub(crate) entry: Option<ThreadFn>,
    pub(crate) arg: usize,
    /// Stack region of a dynamic thread, returned to the allocator on
    /// final release.
    pub(crate) stack: Option<usize>,

    /// Times this thread has been switched in.
    pub(crate) resumes: u32,
}

impl Thread {
    pub(crate) fn new(name: &'static str, prio: Priority) -> Self {
        Thread {
            name,
            state: ThreadState::WtStart,
            base_prio: prio,
            prio,
            dynamic: false,
            term_requested: false,
            refs: 1,
            next: None,
            prev: None,
            wakeup: MSG_OK,
            msg: MSG_OK,
            msg_waiters: ThreadQueue::new(),
            joiners: ThreadQueue::new(),
            pending: EventMask::NONE,
            served: EventMask::NONE,
            owned: None,
            wait_timer: None,
            quantum: 0,
            context: Context::default(),
            entry: None,
            arg: 0,
            stack: None,
            resumes: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Effective priority, possibly boosted by priority inheritance.
    pub fn priority(&self) -> Priority {
        self.prio
    }

    /// The thread's own, non-inherited priority.
    pub fn base_priority(&self) -> Priority {
        self.base_prio
    }

    pub fn pending_events(&self) -> EventMask {
        self.pending
    }

    /// Flags consumed by the last completed event wait.
    pub fn served_events(&self) -> EventMask {
        self.served
    }

    /// Message stored by the last wakeup.
    pub fn wakeup_message(&self) -> Message {
        self.wakeup
    }

    /// Whether cooperative termination has been requested.
    pub fn termination_requested(&self) -> bool {
        self.term_requested
    }

    pub fn references(&self) -> u8 {
        self.refs
    }

    /// Times this thread has been switched in.
    pub fn resume_count(&self) -> u32 {
        self.resumes
    }
}

/// Parameters for creating a thread.
#[derive(Debug, Clone, Copy)]
pub struct ThreadSpec {
    pub name: &'static str,
    pub priority: Priority,
    pub entry: Option<ThreadFn>,
    pub arg: usize,
}

impl ThreadSpec {
    pub fn new(name: &'static str, priority: Priority) -> Self {
        ThreadSpec {
            name,
            priority,
            entry: None,
            arg: 0,
        }
    }

    /// Entry function and argument, consumed by the port when building
    /// the initial context.
    pub fn entry(mut self, entry: ThreadFn, arg: usize) -> Self {
        self.entry = Some(entry);
        self.arg = arg;
        self
    }
}

impl Kernel {
    /// Creates a statically backed thread in the `WtStart` state. The
    /// record lives until the program ends; it is never reclaimed.
    pub fn thread_create(&mut self, spec: ThreadSpec) -> KernelResult<ThreadId> {
        self.spawn_record(spec, false, None)
    }

    /// Creates a thread whose stack comes from `allocator`. The stack
    /// and the record are reclaimed once the thread has terminated and
    /// the last reference is released.
    pub fn thread_create_dynamic(
        &mut self,
        spec: ThreadSpec,
        stack_size: usize,
        allocator: &mut dyn Allocator,
    ) -> KernelResult<ThreadId> {
        let stack = allocator.alloc(stack_size).ok_or(KernelError::NoFreeThread)?;
        match self.spawn_record(spec, true, Some(stack)) {
            Ok(t) => Ok(t),
            Err(e) => {
                allocator.free(stack);
                Err(e)
            }
        }
    }

    fn spawn_record(
        &mut self,
        spec: ThreadSpec,
        dynamic: bool,
        stack: Option<usize>,
    ) -> KernelResult<ThreadId> {
        let mut record = Thread::new(spec.name, spec.priority);
        record.dynamic = dynamic;
        record.stack = stack;
        record.entry = spec.entry;
        record.arg = spec.arg;
        record.quantum = self.config.quantum;

        let t = self
            .threads
            .alloc(record)
            .map_err(|_| KernelError::NoFreeThread)?;
        match self.vtimers.alloc(VTimer::new()) {
            Ok(timer) => {
                self.thread_mut(t).wait_timer = Some(timer);
                Ok(t)
            }
            Err(e) => {
                self.threads.free(t);
                Err(e)
            }
        }
    }

    /// Schedules a created thread for the first time. S-class.
    pub fn thread_start_s(&mut self, t: ThreadId) {
        kernel_assert!(
            self.thread(t).state == ThreadState::WtStart,
            "starting a thread that already ran"
        );
        self.make_ready(t, MSG_OK);
        self.reschedule_s();
    }

    /// Puts the current thread to sleep for `ticks`. The thread resumes
    /// no earlier than `ticks` ticks after the call. S-class.
    pub fn thread_sleep_s(&mut self, ticks: Ticks) -> Outcome {
        if ticks == 0 {
            self.yield_s();
            return Outcome::Ready(WaitResult::Completed(MSG_OK));
        }
        self.go_to_sleep_timeout_s(ThreadState::Sleeping, Timeout::Ticks(ticks))
    }

    /// Puts the current thread to sleep until the absolute system time
    /// `deadline`. A deadline at or before the current time does not
    /// block. S-class.
    pub fn thread_sleep_until_s(&mut self, deadline: SysTime) -> Outcome {
        let remaining = deadline.saturating_sub(self.ticks);
        self.thread_sleep_s(remaining.min(Ticks::MAX as SysTime) as Ticks)
    }

    /// Suspends the current thread until [`thread_resume_i`]
    /// (Self::thread_resume_i) is called for it. S-class.
    pub fn thread_suspend_s(&mut self) -> Outcome {
        self.go_to_sleep_s(ThreadState::Suspended);
        Outcome::Suspended
    }

    /// Resumes a suspended thread with the given wakeup message.
    /// I-class.
    pub fn thread_resume_i(&mut self, t: ThreadId, msg: Message) {
        kernel_assert!(
            self.thread(t).state == ThreadState::Suspended,
            "resuming a thread that is not suspended"
        );
        self.make_ready(t, msg);
    }

    /// Requests cooperative termination; the target must poll
    /// [`should_terminate`](Self::should_terminate). I-class.
    pub fn thread_terminate_i(&mut self, t: ThreadId) {
        self.thread_mut(t).term_requested = true;
    }

    /// Whether the current thread has been asked to terminate.
    pub fn should_terminate(&self) -> bool {
        self.thread(self.current()).term_requested
    }

    /// Terminates the current thread: stores the exit code, wakes every
    /// joiner with it and switches away. If the dead thread was dynamic
    /// and unreferenced, its stack is returned for the caller to hand
    /// back to the allocator. S-class.
    pub fn thread_exit_s(&mut self, code: Message) -> Option<usize> {
        let dying = self.current();
        kernel_assert!(
            self.thread(dying).owned.is_none(),
            "thread exited holding mutexes"
        );

        let mut joiners = self.thread(dying).joiners;
        while let Some(joiner) = joiners.pop_front(&mut self.threads) {
            self.make_ready(joiner, code);
        }
        self.thread_mut(dying).joiners = joiners;

        self.thread_mut(dying).state = ThreadState::Final(code);
        let next = match self.ready.pop_front(&mut self.threads) {
            Some(next) => next,
            None => halt("ready list empty at thread exit"),
        };
        self.switch_to(dying, next);

        if self.thread(dying).refs == 0 {
            self.reclaim(dying)
        } else {
            None
        }
    }

    /// Joins a thread: blocks until it terminates and delivers its exit
    /// code as the wakeup message. If the target has already terminated
    /// the exit code is returned at once and the caller's reference is
    /// released; otherwise the caller must call
    /// [`thread_release`](Self::thread_release) after it resumes.
    /// S-class.
    pub fn thread_wait_s(&mut self, t: ThreadId) -> Outcome {
        kernel_assert!(t != self.current(), "thread joining itself");
        if let ThreadState::Final(code) = self.thread(t).state {
            self.thread_release(t);
            return Outcome::Ready(WaitResult::Completed(code));
        }
        let joiner = self.current();
        let mut queue = self.thread(t).joiners;
        queue.insert_back(&mut self.threads, joiner);
        self.thread_mut(t).joiners = queue;
        self.go_to_sleep_s(ThreadState::WtExit(t));
        Outcome::Suspended
    }

    /// Takes an additional reference on a thread handle.
    pub fn thread_addref(&mut self, t: ThreadId) {
        let record = self.thread_mut(t);
        record.refs += 1;
    }

    /// Releases a reference. When the last reference to a terminated
    /// dynamic thread is dropped, its record is reclaimed and the stack
    /// address is returned for the allocator. X/S-class.
    pub fn thread_release(&mut self, t: ThreadId) -> Option<usize> {
        let record = self.thread_mut(t);
        kernel_assert!(record.refs > 0, "thread reference underflow");
        record.refs -= 1;
        if record.refs == 0 && matches!(record.state, ThreadState::Final(_)) {
            self.reclaim(t)
        } else {
            None
        }
    }

    /// Frees the record and wait timer of a dead, unreferenced dynamic
    /// thread. Static records stay allocated for the program lifetime.
    fn reclaim(&mut self, t: ThreadId) -> Option<usize> {
        if !self.thread(t).dynamic {
            return None;
        }
        let timer = self.thread(t).wait_timer;
        if let Some(timer) = timer {
            self.vt_reset_i(timer);
            self.vtimers.free(timer);
        }
        self.threads.free(t).and_then(|record| record.stack)
    }
}
