//! Rendezvous messaging and event flags.

mod common;

use rtk_kernel::kernel::{Kernel, KernelConfig};
use rtk_kernel::thread::ThreadState;
use rtk_kernel::{EventMask, Timeout, WaitResult};

#[test]
fn rendezvous_blocks_sender_until_release() {
    let mut k = common::kernel();
    let main = k.current();
    let recv = common::start(&mut k, "recv", 90);

    // As recv: wait for a sender.
    assert!(k.msg_wait_s().is_suspended());
    assert_eq!(k.current(), main);

    // As main: send; the waiting receiver wakes and preempts.
    assert!(k.msg_send_s(recv, 42).is_suspended());
    assert_eq!(k.current(), recv);

    // As recv: dequeue the sender; it stays blocked until released.
    let (sender, payload) = k.msg_poll_i().unwrap();
    assert_eq!(sender, main);
    assert_eq!(payload, 42);
    assert!(matches!(k.thread(main).state(), ThreadState::SndMsg(_)));

    // The sender observes exactly the reply code.
    k.msg_release_s(sender, 7);
    assert_eq!(k.current(), recv, "sender has lower priority");
    assert_eq!(k.resume_result(main), WaitResult::Completed(7));
}

#[test]
fn rendezvous_with_queued_sender_completes_wait_at_once() {
    let mut k = common::kernel();
    let main = k.current();
    let s = common::start(&mut k, "s", 90);

    // As s: send to main, which is not yet waiting.
    assert!(k.msg_send_s(main, 5).is_suspended());
    assert_eq!(k.current(), main);

    // As main: a sender is already queued, so the wait is immediate.
    assert!(k.msg_wait_s().result().unwrap().is_ok());
    let (sender, payload) = k.msg_poll_i().unwrap();
    assert_eq!((sender, payload), (s, 5));
    k.msg_release_s(sender, 0);
}

#[test]
fn priority_ordered_senders_overtake_fifo() {
    let mut k = Kernel::init(KernelConfig::builder().msg_priority_order(true).build());
    let main = k.current();

    let s1 = common::start(&mut k, "s1", 70);
    assert!(k.msg_send_s(main, 1).is_suspended());
    let s2 = common::start(&mut k, "s2", 80);
    assert!(k.msg_send_s(main, 2).is_suspended());
    assert_eq!(k.current(), main);

    // As main: the higher-priority sender is served first even though
    // it queued second. Both stay blocked until released.
    assert_eq!(k.msg_poll_i(), Some((s2, 2)));
    assert_eq!(k.msg_poll_i(), Some((s1, 1)));
    assert!(matches!(k.thread(s1).state(), ThreadState::SndMsg(_)));
    assert!(matches!(k.thread(s2).state(), ThreadState::SndMsg(_)));
}

#[test]
fn event_signal_wakes_matching_waiter() {
    let mut k = common::kernel();
    let waiter = common::start(&mut k, "w", 90);

    // As w: wait for either of two flags.
    let mask = EventMask::flag(0) | EventMask::flag(1);
    assert!(k.evt_wait_any_s(mask, Timeout::Infinite).is_suspended());

    // As main: one matching flag wakes and preempts.
    k.evt_signal_s(waiter, EventMask::flag(1));
    assert_eq!(k.current(), waiter);
    assert_eq!(k.resume_result(waiter), WaitResult::Completed(0));
    assert_eq!(k.thread(waiter).served_events(), EventMask::flag(1));
    assert!(k.thread(waiter).pending_events().is_empty());
}

#[test]
fn wait_one_consumes_only_the_lowest_flag() {
    let mut k = common::kernel();
    let main = k.current();

    // Flags delivered to a running thread stay pending.
    k.evt_signal_i(main, EventMask::flag(0) | EventMask::flag(2));
    let out = k.evt_wait_one_s(EventMask::flag(0) | EventMask::flag(2), Timeout::Immediate);
    assert!(out.result().unwrap().is_ok());
    assert_eq!(k.thread(main).served_events(), EventMask::flag(0));
    assert_eq!(k.thread(main).pending_events(), EventMask::flag(2));
}

#[test]
fn wait_all_requires_every_flag() {
    let mut k = common::kernel();
    let main = k.current();
    let mask = EventMask::flag(0) | EventMask::flag(1);

    k.evt_signal_i(main, EventMask::flag(0));
    assert_eq!(
        k.evt_wait_all_s(mask, Timeout::Immediate).result(),
        Some(WaitResult::Timeout),
        "half the mask must not satisfy an all-of wait"
    );

    k.evt_signal_i(main, EventMask::flag(1));
    assert!(k.evt_wait_all_s(mask, Timeout::Immediate).result().unwrap().is_ok());
    assert_eq!(k.thread(main).served_events(), mask);
    assert!(k.thread(main).pending_events().is_empty());
}

#[test]
fn get_and_clear_probe_takes_only_matching_flags() {
    let mut k = common::kernel();
    let main = k.current();
    k.evt_signal_i(main, EventMask::flag(0) | EventMask::flag(2));

    // Only the flags covered by the probe mask are taken; the rest stay
    // pending and no wait state is touched.
    let taken = k.evt_get_and_clear_i(main, EventMask::flag(0) | EventMask::flag(1));
    assert_eq!(taken, EventMask::flag(0));
    assert_eq!(k.thread(main).pending_events(), EventMask::flag(2));
    assert_eq!(k.thread(main).state(), ThreadState::Current);

    assert_eq!(k.evt_get_and_clear_i(main, EventMask::ALL), EventMask::flag(2));
    assert!(k.thread(main).pending_events().is_empty());
    assert_eq!(k.evt_get_and_clear_i(main, EventMask::ALL), EventMask::NONE);
}

#[test]
fn timed_event_wait_leaves_partial_flags_pending() {
    let mut k = common::kernel();
    let main = k.current();
    let mask = EventMask::flag(0) | EventMask::flag(1);

    k.evt_signal_i(main, EventMask::flag(0));
    assert!(k.evt_wait_all_s(mask, Timeout::Ticks(3)).is_suspended());
    assert_eq!(k.current(), k.idle_thread());

    common::run_ticks(&mut k, 3);
    assert_eq!(k.current(), main);
    assert_eq!(k.resume_result(main), WaitResult::Timeout);
    assert_eq!(k.thread(main).pending_events(), EventMask::flag(0));
    assert!(k.thread(main).served_events().is_empty());
}

#[test]
fn broadcast_fans_out_per_listener_masks() {
    let mut k = common::kernel();
    let main = k.current();
    let src = k.evt_source_create().unwrap();
    let w1 = common::start(&mut k, "w1", 90);

    // As w1: register and wait for its mask.
    k.evt_register(src, w1, EventMask::flag(3)).unwrap();
    assert!(k.evt_wait_any_s(EventMask::flag(3), Timeout::Infinite).is_suspended());

    // As main: also listen, with a different mask.
    k.evt_register(src, main, EventMask::flag(4)).unwrap();
    assert_eq!(k.evt_listener_count(src), 2);

    k.evt_broadcast_s(src);
    assert_eq!(k.current(), w1);
    assert_eq!(k.thread(w1).served_events(), EventMask::flag(3));
    assert_eq!(k.thread(main).pending_events(), EventMask::flag(4));

    k.evt_unregister(src, w1);
    assert_eq!(k.evt_listener_count(src), 1);
}
