//! Port seams
//!
//! Everything the kernel needs from the hardware layer: the CPU context
//! switch, the idle hook, and the optional allocator backing dynamic
//! thread stacks. The tick source is not a trait; a periodic interrupt
//! (or a one-shot deadline programmed from
//! [`Kernel::time_until_next_i`](crate::Kernel::time_until_next_i))
//! simply calls [`Kernel::tick_i`](crate::Kernel::tick_i).

use crate::thread::ThreadId;

/// Opaque saved execution context.
///
/// The kernel never interprets the value; a real port typically stores a
/// stack pointer here. Hosted tests leave it at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context(pub usize);

/// CPU-specific context switch collaborator, invoked only on behalf of
/// the scheduler.
pub trait Port {
    /// Saves `from`'s register state and restores `to`'s. The contexts
    /// are reachable through
    /// [`Kernel::context_mut`](crate::Kernel::context_mut).
    fn context_switch(&mut self, from: ThreadId, to: ThreadId);

    /// Called when the idle thread is switched in and nothing is ready.
    fn idle(&mut self) {}
}

/// Heap or pool allocator backing dynamically created threads.
///
/// `alloc` returns an opaque address of a region of at least `size`
/// bytes, or `None` when exhausted; `free` releases a region previously
/// returned by `alloc`.
pub trait Allocator {
    fn alloc(&mut self, size: usize) -> Option<usize>;
    fn free(&mut self, ptr: usize);
}

/// Port that records switches and performs no real context change.
/// Useful for hosted tests and as a template for real ports.
#[derive(Default)]
pub struct NullPort {
    /// Last switch performed, as `(from, to)`.
    pub last: Option<(ThreadId, ThreadId)>,
    /// Number of switches performed.
    pub switches: u32,
}

impl Port for NullPort {
    fn context_switch(&mut self, from: ThreadId, to: ThreadId) {
        self.last = Some((from, to));
        self.switches += 1;
    }
}
