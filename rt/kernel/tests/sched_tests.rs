//! Scheduler and thread-lifecycle behavior.

mod common;

use rtk_kernel::kernel::{self, Kernel, KernelConfig};
use rtk_kernel::port::Allocator;
use rtk_kernel::thread::{ThreadSpec, ThreadState};
use rtk_kernel::{prio, vt, WaitResult};

#[test]
fn ready_list_sorted_by_priority_fifo_among_equals() {
    let mut k = common::kernel();
    let a = common::start(&mut k, "a", 30);
    let b = common::start(&mut k, "b", 50);
    let c = common::start(&mut k, "c", 50);
    let d = common::start(&mut k, "d", 20);
    let idle = k.idle_thread();

    let order: heapless::Vec<_, 8> = k.ready_order();
    assert_eq!(order.as_slice(), &[b, c, a, d, idle]);
}

#[test]
fn higher_priority_start_preempts() {
    let mut k = common::kernel();
    let main = k.current();
    let low = common::start(&mut k, "low", 10);
    assert_eq!(k.current(), main, "lower priority must not preempt");

    let high = common::start(&mut k, "high", 90);
    assert_eq!(k.current(), high);
    assert_eq!(k.thread(main).state(), ThreadState::Ready);
    assert_eq!(k.thread(low).state(), ThreadState::Ready);
}

#[test]
fn exactly_one_current_thread() {
    let mut k = common::kernel();
    common::start(&mut k, "a", 30);
    common::start(&mut k, "b", 90);
    let currents = k
        .threads()
        .filter(|&t| k.thread(t).state() == ThreadState::Current)
        .count();
    assert_eq!(currents, 1);
}

#[test]
fn yield_rotates_among_equals_only() {
    let mut k = common::kernel();
    let main = k.current();
    let peer = common::start(&mut k, "peer", 64);

    assert!(k.yield_s());
    assert_eq!(k.current(), peer);
    assert!(k.yield_s());
    assert_eq!(k.current(), main);

    let mut k2 = common::kernel();
    common::start(&mut k2, "low", 10);
    assert!(!k2.yield_s(), "yield to a lower-priority thread is a no-op");
}

#[test]
fn quantum_expiry_round_robins_equals() {
    let mut k = Kernel::init(KernelConfig::builder().quantum(3).build());
    let main = k.current();
    let peer = common::start(&mut k, "peer", 64);

    common::run_ticks(&mut k, 2);
    assert_eq!(k.current(), main, "quantum not yet exhausted");
    common::run_ticks(&mut k, 1);
    assert_eq!(k.current(), peer);
    common::run_ticks(&mut k, 3);
    assert_eq!(k.current(), main);
}

#[test]
fn suspend_until_resumed() {
    let mut k = common::kernel();
    let main = k.current();

    assert!(k.thread_suspend_s().is_suspended());
    assert_eq!(k.current(), k.idle_thread());

    k.thread_resume_i(main, 11);
    k.reschedule_s();
    assert_eq!(k.current(), main);
    assert_eq!(k.resume_result(main), WaitResult::Completed(11));
}

#[test]
fn exit_stores_code_and_join_after_exit_returns_it() {
    let mut k = common::kernel();
    let w = common::start(&mut k, "w", 90);
    assert_eq!(k.current(), w);

    let reclaimed = k.thread_exit_s(5);
    assert!(reclaimed.is_none());
    assert_eq!(k.thread(w).state(), ThreadState::Final(5));

    let out = k.thread_wait_s(w);
    assert_eq!(out.result(), Some(WaitResult::Completed(5)));
}

#[test]
fn join_before_exit_parks_and_delivers_code() {
    let mut k = common::kernel();
    let main = k.current();
    let w = common::start(&mut k, "w", 90);

    // As w: park so the joiner can run first.
    assert!(k.thread_suspend_s().is_suspended());
    assert_eq!(k.current(), main);

    // As main: join w before it has terminated.
    assert!(k.thread_wait_s(w).is_suspended());
    assert_eq!(k.current(), k.idle_thread());

    k.thread_resume_i(w, 0);
    k.reschedule_s();
    assert_eq!(k.current(), w);

    // As w: exit wakes the joiner with the exit code.
    let _ = k.thread_exit_s(3);
    assert_eq!(k.current(), main);
    assert_eq!(k.resume_result(main), WaitResult::Completed(3));
}

#[test]
fn termination_request_is_cooperative() {
    let mut k = common::kernel();
    let w = common::start(&mut k, "w", 90);
    assert!(!k.should_terminate());
    k.thread_terminate_i(w);
    assert!(k.should_terminate(), "current thread sees its own flag");
}

struct BumpAllocator {
    next: usize,
    freed: Vec<usize>,
}

impl Allocator for BumpAllocator {
    fn alloc(&mut self, size: usize) -> Option<usize> {
        let ptr = self.next;
        self.next += size;
        Some(ptr)
    }

    fn free(&mut self, ptr: usize) {
        self.freed.push(ptr);
    }
}

#[test]
fn dynamic_thread_reclaims_stack_after_last_release() {
    let mut k = common::kernel();
    let mut alloc = BumpAllocator {
        next: 0x1000,
        freed: Vec::new(),
    };

    let spec = ThreadSpec::new("dyn", prio!(90));
    let d = k.thread_create_dynamic(spec, 512, &mut alloc).unwrap();
    k.thread_start_s(d);
    assert_eq!(k.current(), d);

    // As d: exit. The creator still holds a reference, so nothing is
    // reclaimed yet.
    assert_eq!(k.thread_exit_s(0), None);
    assert_eq!(k.thread(d).state(), ThreadState::Final(0));

    let stack = k.thread_release(d);
    assert_eq!(stack, Some(0x1000));
    alloc.free(stack.unwrap());
    assert!(k.threads().all(|t| t != d), "record must be reclaimed");
}

#[test]
fn global_instance_and_tick_wrapper() {
    kernel::init(KernelConfig::builder().name("host").build());
    kernel::with_kernel(|k| {
        assert_eq!(k.config().name, "host");
        assert_eq!(k.system_time(), 0);
    });
    vt::tick();
    kernel::with_kernel(|k| assert_eq!(k.system_time(), 1));
}
