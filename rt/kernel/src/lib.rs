#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

//! # RTK Kernel
//!
//! A preemptive, priority-based kernel core for single-core
//! microcontrollers: ready-list scheduler, thread lifecycle, virtual
//! timers, and the blocking synchronization primitives built on the
//! shared intrusive thread-queue abstraction.
//!
//! The kernel is an explicit state value ([`Kernel`]); all of its state
//! is mutated only inside the critical section provided by the
//! `critical-section` crate. A single global instance can be installed
//! with [`kernel::init`] and reached through [`kernel::with_kernel`];
//! the `&mut Kernel` handed out there is the capability required by the
//! S-class (`*_s`) and I-class (`*_i`) operations.
//!
//! Hardware concerns stay behind the seams in [`port`]: the context
//! switch, the tick source, and the optional stack allocator.

pub mod arena;
pub mod cond;
pub mod events;
pub mod ioq;
pub mod kernel;
pub mod msg;
pub mod mutex;
pub mod port;
pub mod sched;
pub mod sem;
pub mod thread;
pub mod tqueue;
pub mod vt;

pub use rtk_core::*;

pub use cond::CondVar;
pub use events::EventSource;
pub use ioq::{IoQueue, IoqKind, IoqNotify};
pub use kernel::{with_kernel, Kernel, KernelConfig, KernelConfigBuilder, Outcome};
pub use mutex::Mutex;
pub use port::{Allocator, Context, Port};
pub use sem::Semaphore;
pub use thread::{Thread, ThreadId, ThreadState};
pub use vt::{VtAction, VtId};

use core::cell::Cell;

/// Maximum number of thread records in the arena.
pub const MAX_THREADS: usize = 32;

/// Maximum number of virtual timers (one is reserved per thread for
/// bounded waits).
pub const MAX_VTIMERS: usize = 64;

/// Maximum number of counting semaphores.
pub const MAX_SEMAPHORES: usize = 32;

/// Maximum number of mutexes.
pub const MAX_MUTEXES: usize = 32;

/// Maximum number of condition variables.
pub const MAX_CONDVARS: usize = 16;

/// Maximum number of event sources.
pub const MAX_EVENT_SOURCES: usize = 16;

/// Maximum number of listeners per event source.
pub const MAX_LISTENERS: usize = 8;

/// Maximum number of byte I/O queues.
pub const MAX_IO_QUEUES: usize = 8;

/// Backing buffer size of every byte I/O queue; the usable capacity is
/// chosen at creation and may be smaller.
pub const IOQ_BUFFER_SIZE: usize = 64;

/// Diverging hook invoked on unrecoverable kernel failure.
pub type HaltHook = fn(&'static str) -> !;

static HALT_HOOK: critical_section::Mutex<Cell<Option<HaltHook>>> =
    critical_section::Mutex::new(Cell::new(None));

/// Installs the halt hook. Call once, before starting the kernel.
pub fn set_halt_hook(hook: HaltHook) {
    critical_section::with(|cs| HALT_HOOK.borrow(cs).set(Some(hook)));
}

/// Stops the kernel after an unrecoverable failure.
///
/// Invokes the installed [`HaltHook`], or panics when none is installed.
/// A corrupted kernel cannot be trusted to clean up, so this never
/// returns and performs no unwinding of kernel state.
pub fn halt(reason: &'static str) -> ! {
    let hook = critical_section::with(|cs| HALT_HOOK.borrow(cs).get());
    if let Some(hook) = hook {
        hook(reason)
    }
    panic!("kernel halt: {}", reason);
}

/// Checks a kernel invariant, routing violations through [`halt`].
#[macro_export]
macro_rules! kernel_assert {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            $crate::halt($msg);
        }
    };
}
