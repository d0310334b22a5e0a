//! Shared helpers for kernel integration tests.
//!
//! Tests drive the kernel in a hosted fashion: the test body plays the
//! role of whichever thread is current, and a suspended outcome means
//! the logical current thread changed. `run_ticks` stands in for the
//! tick interrupt.

#![allow(dead_code)]

use rtk_kernel::kernel::{Kernel, KernelConfig};
use rtk_kernel::thread::{ThreadId, ThreadSpec};
use rtk_kernel::Priority;

pub fn kernel() -> Kernel {
    Kernel::init(KernelConfig::default())
}

pub fn kernel_with_main(priority: Priority) -> Kernel {
    Kernel::init(KernelConfig::builder().main_priority(priority).build())
}

/// Creates and starts a statically backed thread.
pub fn start(k: &mut Kernel, name: &'static str, prio: u8) -> ThreadId {
    let t = k
        .thread_create(ThreadSpec::new(name, Priority::new_unchecked(prio)))
        .expect("thread arena full");
    k.thread_start_s(t);
    t
}

/// Advances `n` ticks, with the preemption check a tick ISR epilogue
/// performs after each one.
pub fn run_ticks(k: &mut Kernel, n: u32) {
    for _ in 0..n {
        k.tick_i();
        k.reschedule_s();
    }
}
