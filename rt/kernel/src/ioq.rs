//! Blocking byte I/O queues
//!
//! Ring buffers bridging thread context and interrupt context. An
//! input queue is filled from an ISR with [`Kernel::ioq_put_i`] and
//! drained by threads with [`Kernel::ioq_get_s`]; an output queue is
//! the mirror image. The blocking side parks on an embedded semaphore
//! whose counter tracks the resource being waited for (buffered bytes
//! for input, free slots for output); the interrupt side never blocks
//! and reports a full or empty buffer as [`nb::Error::WouldBlock`].
//!
//! When a byte arrives while a getter is parked it is handed straight
//! to the waiter as its wakeup message, skipping the buffer; a parked
//! putter's byte likewise rides in its thread record until a slot
//! frees up. A resumed getter therefore finds the byte in
//! [`WaitResult::Completed`].

use core::convert::Infallible;

use rtk_core::{KernelError, KernelResult, Message, Timeout, WaitResult, MSG_OK, MSG_RESET};

use crate::arena::Arena;
use crate::kernel::{Kernel, Outcome};
use crate::sem::Semaphore;
use crate::thread::{IoqId, ThreadState};
use crate::{halt, kernel_assert, IOQ_BUFFER_SIZE, MAX_IO_QUEUES};

/// Transfer direction of a queue, fixing which side may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoqKind {
    /// ISR fills, threads drain; getters may block.
    Input,
    /// Threads fill, ISR drains; putters may block.
    Output,
}

/// Callback kicking the hardware end of a queue after a thread-side
/// operation: an input notifier re-enables reception, an output
/// notifier starts transmission. Runs with the kernel lock held and
/// must not block.
pub type IoqNotify = fn(&mut Kernel, IoqId);

/// A byte ring buffer with a blocking and a non-blocking end.
pub struct IoQueue {
    buf: [u8; IOQ_BUFFER_SIZE],
    capacity: usize,
    read: usize,
    write: usize,
    count: usize,
    kind: IoqKind,
    notify: Option<IoqNotify>,
    pub(crate) sem: Semaphore,
}

impl IoQueue {
    fn new(kind: IoqKind, capacity: usize) -> Self {
        let initial = match kind {
            IoqKind::Input => 0,
            IoqKind::Output => capacity as i32,
        };
        IoQueue {
            buf: [0; IOQ_BUFFER_SIZE],
            capacity,
            read: 0,
            write: 0,
            count: 0,
            kind,
            notify: None,
            sem: Semaphore::new(initial),
        }
    }

    fn push(&mut self, byte: u8) {
        kernel_assert!(self.count < self.capacity, "ring buffer overflow");
        self.buf[self.write] = byte;
        self.write = (self.write + 1) % self.capacity;
        self.count += 1;
    }

    fn pop(&mut self) -> u8 {
        kernel_assert!(self.count > 0, "ring buffer underflow");
        let byte = self.buf[self.read];
        self.read = (self.read + 1) % self.capacity;
        self.count -= 1;
        byte
    }
}

fn ioq_ref(ioqs: &Arena<IoQueue, MAX_IO_QUEUES>, ioq: IoqId) -> &IoQueue {
    match ioqs.get(ioq) {
        Some(record) => record,
        None => halt("stale queue handle"),
    }
}

fn ioq_mut(ioqs: &mut Arena<IoQueue, MAX_IO_QUEUES>, ioq: IoqId) -> &mut IoQueue {
    match ioqs.get_mut(ioq) {
        Some(record) => record,
        None => halt("stale queue handle"),
    }
}

impl Kernel {
    /// Creates an input queue of the given capacity, at most
    /// [`IOQ_BUFFER_SIZE`].
    pub fn ioq_create_input(&mut self, capacity: usize) -> KernelResult<IoqId> {
        self.ioq_create(IoqKind::Input, capacity)
    }

    /// Creates an output queue of the given capacity.
    pub fn ioq_create_output(&mut self, capacity: usize) -> KernelResult<IoqId> {
        self.ioq_create(IoqKind::Output, capacity)
    }

    fn ioq_create(&mut self, kind: IoqKind, capacity: usize) -> KernelResult<IoqId> {
        if capacity == 0 || capacity > IOQ_BUFFER_SIZE {
            return Err(KernelError::InvalidCapacity);
        }
        self.ioqs.alloc(IoQueue::new(kind, capacity))
    }

    /// Frees a queue. Blocked parties are woken as by
    /// [`ioq_reset_i`](Self::ioq_reset_i).
    pub fn ioq_free(&mut self, ioq: IoqId) {
        self.ioq_reset_i(ioq);
        self.ioqs.free(ioq);
    }

    /// Bytes currently buffered.
    pub fn ioq_len(&self, ioq: IoqId) -> usize {
        ioq_ref(&self.ioqs, ioq).count
    }

    /// Capacity fixed at creation.
    pub fn ioq_capacity(&self, ioq: IoqId) -> usize {
        ioq_ref(&self.ioqs, ioq).capacity
    }

    /// Installs the hardware-kick notifier invoked on thread-side
    /// operations.
    pub fn ioq_set_notify(&mut self, ioq: IoqId, notify: IoqNotify) {
        ioq_mut(&mut self.ioqs, ioq).notify = Some(notify);
    }

    fn ioq_notify(&mut self, ioq: IoqId) {
        if let Some(notify) = ioq_ref(&self.ioqs, ioq).notify {
            notify(self, ioq);
        }
    }

    /// Takes a byte from an input queue, blocking up to `timeout` when
    /// empty. A completed wait carries the byte in
    /// [`WaitResult::Completed`]. S-class.
    pub fn ioq_get_s(&mut self, ioq: IoqId, timeout: Timeout) -> Outcome {
        self.ioq_notify(ioq);
        let record = ioq_mut(&mut self.ioqs, ioq);
        kernel_assert!(record.kind == IoqKind::Input, "blocking get on an output queue");
        if record.sem.counter > 0 {
            record.sem.counter -= 1;
            let byte = record.pop();
            return Outcome::Ready(WaitResult::Completed(byte as Message));
        }
        if timeout.is_immediate() {
            return Outcome::Ready(WaitResult::Timeout);
        }
        record.sem.counter -= 1;
        self.park_on(ioq, timeout)
    }

    /// Feeds a byte into an input queue from interrupt context; never
    /// blocks. A parked getter receives the byte directly. I-class.
    pub fn ioq_put_i(&mut self, ioq: IoqId, byte: u8) -> nb::Result<(), Infallible> {
        let record = ioq_mut(&mut self.ioqs, ioq);
        kernel_assert!(record.kind == IoqKind::Input, "interrupt put on an output queue");
        if record.sem.counter < 0 {
            record.sem.counter += 1;
            let mut queue = record.sem.queue;
            let waiter = queue.pop_front(&mut self.threads);
            ioq_mut(&mut self.ioqs, ioq).sem.queue = queue;
            match waiter {
                Some(t) => self.make_ready(t, byte as Message),
                None => halt("negative queue semaphore with no waiter"),
            }
            Ok(())
        } else if record.count < record.capacity {
            record.push(byte);
            record.sem.counter += 1;
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Puts a byte into an output queue, blocking up to `timeout` when
    /// full. S-class.
    pub fn ioq_put_s(&mut self, ioq: IoqId, byte: u8, timeout: Timeout) -> Outcome {
        let record = ioq_mut(&mut self.ioqs, ioq);
        kernel_assert!(record.kind == IoqKind::Output, "blocking put on an input queue");
        if record.sem.counter > 0 {
            record.sem.counter -= 1;
            record.push(byte);
            self.ioq_notify(ioq);
            return Outcome::Ready(WaitResult::Completed(MSG_OK));
        }
        if timeout.is_immediate() {
            return Outcome::Ready(WaitResult::Timeout);
        }
        record.sem.counter -= 1;
        let putter = self.current();
        self.thread_mut(putter).msg = byte as Message;
        self.park_on(ioq, timeout)
    }

    /// Drains a byte from an output queue in interrupt context; never
    /// blocks. Freeing a slot moves a parked putter's byte into the
    /// buffer and wakes it. I-class.
    pub fn ioq_get_i(&mut self, ioq: IoqId) -> nb::Result<u8, Infallible> {
        let record = ioq_mut(&mut self.ioqs, ioq);
        kernel_assert!(record.kind == IoqKind::Output, "interrupt get on an input queue");
        if record.count == 0 {
            return Err(nb::Error::WouldBlock);
        }
        let byte = record.pop();
        if record.sem.counter < 0 {
            record.sem.counter += 1;
            let mut queue = record.sem.queue;
            let waiter = queue.pop_front(&mut self.threads);
            ioq_mut(&mut self.ioqs, ioq).sem.queue = queue;
            match waiter {
                Some(t) => {
                    let pending = self.thread(t).msg;
                    ioq_mut(&mut self.ioqs, ioq).push(pending as u8);
                    self.make_ready(t, MSG_OK);
                }
                None => halt("negative queue semaphore with no waiter"),
            }
        } else {
            ioq_mut(&mut self.ioqs, ioq).sem.counter += 1;
        }
        Ok(byte)
    }

    /// Empties the buffer and wakes every blocked party with
    /// [`WaitResult::Reset`]. I-class.
    pub fn ioq_reset_i(&mut self, ioq: IoqId) {
        let mut queue = ioq_ref(&self.ioqs, ioq).sem.queue;
        while let Some(t) = queue.pop_front(&mut self.threads) {
            self.make_ready(t, MSG_RESET);
        }
        let record = ioq_mut(&mut self.ioqs, ioq);
        record.sem.queue = queue;
        record.read = 0;
        record.write = 0;
        record.count = 0;
        record.sem.counter = match record.kind {
            IoqKind::Input => 0,
            IoqKind::Output => record.capacity as i32,
        };
    }

    fn park_on(&mut self, ioq: IoqId, timeout: Timeout) -> Outcome {
        let waiter = self.current();
        let mut queue = ioq_ref(&self.ioqs, ioq).sem.queue;
        queue.insert_back(&mut self.threads, waiter);
        ioq_mut(&mut self.ioqs, ioq).sem.queue = queue;
        self.go_to_sleep_timeout_s(ThreadState::Queued(ioq), timeout)
    }
}
