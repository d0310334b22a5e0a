//! Kernel state and the global instance
//!
//! [`Kernel`] is an explicit state value holding the thread arena, the
//! ready list, the timer delta list and the primitive arenas. It is
//! mutated only while the `critical-section` lock is held; the
//! `&mut Kernel` reachable inside [`with_kernel`] is the capability that
//! S-class (`*_s`, may block) and I-class (`*_i`, never blocks)
//! operations require. X-class convenience wrappers live with the
//! individual primitives and are built from these two layers.

use core::cell::RefCell;

use critical_section::Mutex as CsMutex;
use rtk_core::{Message, Priority, SysTime, Ticks, WaitResult};

use crate::arena::Arena;
use crate::cond::CondVar;
use crate::events::EventSource;
use crate::ioq::IoQueue;
use crate::msg;
use crate::mutex::Mutex;
use crate::port::Context;
use crate::sem::Semaphore;
use crate::thread::{Thread, ThreadId, ThreadState, Threads};
use crate::tqueue::ThreadQueue;
use crate::vt::{VTimer, VtId};
use crate::{
    halt, kernel_assert, MAX_CONDVARS, MAX_EVENT_SOURCES, MAX_IO_QUEUES, MAX_MUTEXES,
    MAX_SEMAPHORES, MAX_VTIMERS,
};

/// Outcome of an S-class operation that may block.
///
/// `Suspended` means the caller has been parked and the logical context
/// switch has already happened; the final [`WaitResult`] is stored in
/// the thread record and read with [`Kernel::resume_result`] once the
/// thread is switched back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a suspended thread's outcome must be collected on resume"]
pub enum Outcome {
    /// The operation completed without blocking.
    Ready(WaitResult),
    /// The calling thread was parked and another thread is now current.
    Suspended,
}

impl Outcome {
    /// The immediate result, if the operation did not block.
    pub fn result(self) -> Option<WaitResult> {
        match self {
            Outcome::Ready(result) => Some(result),
            Outcome::Suspended => None,
        }
    }

    pub fn is_suspended(self) -> bool {
        matches!(self, Outcome::Suspended)
    }
}

/// A context switch decided by the scheduler, to be performed by the
/// port collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    pub from: ThreadId,
    pub to: ThreadId,
}

/// Kernel runtime configuration.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub name: &'static str,
    /// Round-robin time quantum in ticks; `0` disables round-robin.
    pub quantum: Ticks,
    /// Rendezvous senders queue in priority order instead of FIFO.
    pub msg_priority_order: bool,
    /// Priority of the main thread created at init.
    pub main_priority: Priority,
    /// Invoked whenever the idle thread becomes current.
    pub idle_callback: Option<fn()>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            name: "rtk",
            quantum: 0,
            msg_priority_order: false,
            main_priority: Priority::NORMAL,
            idle_callback: None,
        }
    }
}

impl KernelConfig {
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::default()
    }
}

/// Builder for [`KernelConfig`].
#[derive(Debug, Clone, Default)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    pub fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    pub fn quantum(mut self, ticks: Ticks) -> Self {
        self.config.quantum = ticks;
        self
    }

    pub fn msg_priority_order(mut self, enabled: bool) -> Self {
        self.config.msg_priority_order = enabled;
        self
    }

    pub fn main_priority(mut self, priority: Priority) -> Self {
        self.config.main_priority = priority;
        self
    }

    pub fn idle_callback(mut self, callback: fn()) -> Self {
        self.config.idle_callback = Some(callback);
        self
    }

    pub fn build(self) -> KernelConfig {
        self.config
    }
}

/// The kernel state: thread arena, ready list, timer list and the
/// synchronization-primitive arenas.
pub struct Kernel {
    pub(crate) config: KernelConfig,
    pub(crate) threads: Threads,
    pub(crate) ready: ThreadQueue,
    pub(crate) current: ThreadId,
    pub(crate) idle: ThreadId,

    pub(crate) vtimers: Arena<VTimer, MAX_VTIMERS>,
    pub(crate) vt_head: Option<VtId>,

    pub(crate) sems: Arena<Semaphore, MAX_SEMAPHORES>,
    pub(crate) mutexes: Arena<Mutex, MAX_MUTEXES>,
    pub(crate) condvars: Arena<CondVar, MAX_CONDVARS>,
    pub(crate) sources: Arena<EventSource, MAX_EVENT_SOURCES>,
    pub(crate) ioqs: Arena<IoQueue, MAX_IO_QUEUES>,

    pub(crate) ticks: SysTime,
    pub(crate) switch_count: u32,
    pub(crate) pending_switch: Option<Switch>,
    /// The running thread exhausted its round-robin quantum.
    pub(crate) quantum_expired: bool,
}

impl Kernel {
    /// Creates the kernel, the main thread (immediately current) and the
    /// idle thread (always ready, never blocks).
    pub fn init(config: KernelConfig) -> Self {
        let mut threads = Threads::new();
        let mut vtimers = Arena::new();
        let mut ready = ThreadQueue::new();

        let mut main = Thread::new("main", config.main_priority);
        main.state = ThreadState::Current;
        main.quantum = config.quantum;
        let main = match threads.alloc(main) {
            Ok(id) => id,
            Err(_) => halt("thread arena too small for main"),
        };

        let mut idle_thread = Thread::new("idle", Priority::IDLE);
        idle_thread.state = ThreadState::Ready;
        let idle = match threads.alloc(idle_thread) {
            Ok(id) => id,
            Err(_) => halt("thread arena too small for idle"),
        };
        ready.insert_priority(&mut threads, idle);

        for id in [main, idle] {
            let timer = match vtimers.alloc(VTimer::new()) {
                Ok(t) => t,
                Err(_) => halt("timer arena too small"),
            };
            match threads.get_mut(id) {
                Some(record) => record.wait_timer = Some(timer),
                None => halt("fresh thread handle invalid"),
            }
        }

        Kernel {
            config,
            threads,
            ready,
            current: main,
            idle,
            vtimers,
            vt_head: None,
            sems: Arena::new(),
            mutexes: Arena::new(),
            condvars: Arena::new(),
            sources: Arena::new(),
            ioqs: Arena::new(),
            ticks: 0,
            switch_count: 0,
            pending_switch: None,
            quantum_expired: false,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// The one running thread.
    pub fn current(&self) -> ThreadId {
        self.current
    }

    /// The idle thread created at init.
    pub fn idle_thread(&self) -> ThreadId {
        self.idle
    }

    /// Ticks elapsed since init.
    pub fn system_time(&self) -> SysTime {
        self.ticks
    }

    /// Context switches performed since init.
    pub fn switch_count(&self) -> u32 {
        self.switch_count
    }

    /// Takes the context switch decided by the last scheduler operation,
    /// to be handed to the port.
    pub fn take_switch(&mut self) -> Option<Switch> {
        self.pending_switch.take()
    }

    /// Read access to a thread record; halts on a stale handle.
    pub fn thread(&self, t: ThreadId) -> &Thread {
        match self.threads.get(t) {
            Some(record) => record,
            None => halt("stale thread handle"),
        }
    }

    pub(crate) fn thread_mut(&mut self, t: ThreadId) -> &mut Thread {
        match self.threads.get_mut(t) {
            Some(record) => record,
            None => halt("stale thread handle"),
        }
    }

    /// Opaque context blob of a thread, for the port's save/restore.
    pub fn context_mut(&mut self, t: ThreadId) -> &mut Context {
        &mut self.thread_mut(t).context
    }

    /// Completed-wait outcome of a thread that has been woken, decoded
    /// from its stored wakeup message.
    pub fn resume_result(&self, t: ThreadId) -> WaitResult {
        WaitResult::from_message(self.thread(t).wakeup)
    }

    /// Threads currently alive, in arena order.
    pub fn threads(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.threads.handles()
    }

    /// Ready-list contents in scheduling order. Inspection helper.
    pub fn ready_order<const N: usize>(&self) -> heapless::Vec<ThreadId, N> {
        self.ready.collect(&self.threads)
    }

    /// Stores a wakeup message and makes the thread ready. The caller
    /// must already have unlinked the thread from any wait queue.
    pub(crate) fn make_ready(&mut self, t: ThreadId, msg: Message) {
        self.disarm_wait_timer(t);
        let record = self.thread_mut(t);
        kernel_assert!(
            !matches!(record.state, ThreadState::Ready | ThreadState::Current),
            "readying an already runnable thread"
        );
        record.wakeup = msg;
        record.state = ThreadState::Ready;
        self.ready.insert_priority(&mut self.threads, t);
    }

    pub(crate) fn enqueue_sender(
        &mut self,
        queue: &mut ThreadQueue,
        t: ThreadId,
        priority_order: bool,
    ) {
        if priority_order {
            queue.insert_priority(&mut self.threads, t);
        } else {
            queue.insert_back(&mut self.threads, t);
        }
    }

    pub(crate) fn disarm_wait_timer(&mut self, t: ThreadId) {
        if let Some(timer) = self.thread(t).wait_timer {
            self.vt_reset_i(timer);
        }
    }

    /// Removes a waiting thread from the queue its state says it is
    /// parked on. Used by the timeout path and by reset operations.
    pub(crate) fn unlink_from_wait_queue(&mut self, t: ThreadId) {
        match self.thread(t).state {
            ThreadState::WtSem(sem) => {
                let mut queue = match self.sems.get(sem) {
                    Some(s) => s.queue,
                    None => halt("waiter parked on freed semaphore"),
                };
                queue.unlink(&mut self.threads, t);
                if let Some(s) = self.sems.get_mut(sem) {
                    s.queue = queue;
                    s.counter += 1;
                }
            }
            ThreadState::WtMtx(mutex) => {
                let mut queue = match self.mutexes.get(mutex) {
                    Some(m) => m.queue,
                    None => halt("waiter parked on freed mutex"),
                };
                queue.unlink(&mut self.threads, t);
                if let Some(m) = self.mutexes.get_mut(mutex) {
                    m.queue = queue;
                }
            }
            ThreadState::WtCond { cond, .. } => {
                let mut queue = match self.condvars.get(cond) {
                    Some(c) => c.queue,
                    None => halt("waiter parked on freed condvar"),
                };
                queue.unlink(&mut self.threads, t);
                if let Some(c) = self.condvars.get_mut(cond) {
                    c.queue = queue;
                }
            }
            ThreadState::Queued(ioq) => {
                let mut queue = match self.ioqs.get(ioq) {
                    Some(q) => q.sem.queue,
                    None => halt("waiter parked on freed queue"),
                };
                queue.unlink(&mut self.threads, t);
                if let Some(q) = self.ioqs.get_mut(ioq) {
                    q.sem.queue = queue;
                    q.sem.counter += 1;
                }
            }
            ThreadState::SndMsg(receiver) => {
                msg::unlink_sender(self, receiver, t);
            }
            ThreadState::WtExit(target) => {
                let mut queue = self.thread(target).joiners;
                queue.unlink(&mut self.threads, t);
                self.thread_mut(target).joiners = queue;
            }
            // Sleeping, suspended and event waits park outside any queue.
            ThreadState::Sleeping
            | ThreadState::Suspended
            | ThreadState::WtMsg
            | ThreadState::WtOrEvt { .. }
            | ThreadState::WtAndEvt(_) => {}
            ThreadState::WtStart
            | ThreadState::Ready
            | ThreadState::Current
            | ThreadState::Final(_) => {
                halt("unlinking a thread that is not waiting");
            }
        }
    }
}

static KERNEL: CsMutex<RefCell<Option<Kernel>>> = CsMutex::new(RefCell::new(None));

/// Installs the global kernel instance.
pub fn init(config: KernelConfig) {
    critical_section::with(|cs| {
        let mut slot = KERNEL.borrow_ref_mut(cs);
        kernel_assert!(slot.is_none(), "kernel already initialized");
        *slot = Some(Kernel::init(config));
    });
}

/// Runs `f` with the global kernel inside the critical section.
///
/// The `&mut Kernel` passed to `f` is the S-class capability; `f` must
/// not block the host, only kernel threads.
pub fn with_kernel<F, R>(f: F) -> R
where
    F: FnOnce(&mut Kernel) -> R,
{
    critical_section::with(|cs| {
        let mut slot = KERNEL.borrow_ref_mut(cs);
        match slot.as_mut() {
            Some(kernel) => f(kernel),
            None => halt("kernel not initialized"),
        }
    })
}
