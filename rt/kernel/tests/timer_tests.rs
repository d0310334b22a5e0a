//! Virtual-timer delta list and timed sleeps.

mod common;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use rtk_kernel::kernel::Kernel;
use rtk_kernel::{WaitResult, MSG_OK};

static ONE_SHOT_FIRES: AtomicU32 = AtomicU32::new(0);

fn count_one_shot(_k: &mut Kernel, _param: usize) {
    ONE_SHOT_FIRES.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn one_shot_fires_exactly_once_at_delay() {
    let mut k = common::kernel();
    let vt = k.vt_create().unwrap();
    k.vt_set_i(vt, 5, count_one_shot, 0);
    assert!(k.vt_is_armed(vt));

    common::run_ticks(&mut k, 4);
    assert_eq!(ONE_SHOT_FIRES.load(Ordering::SeqCst), 0);
    common::run_ticks(&mut k, 1);
    assert_eq!(ONE_SHOT_FIRES.load(Ordering::SeqCst), 1);
    assert!(!k.vt_is_armed(vt));

    common::run_ticks(&mut k, 10);
    assert_eq!(ONE_SHOT_FIRES.load(Ordering::SeqCst), 1);
}

static SUPPRESSED: AtomicBool = AtomicBool::new(false);

fn mark_suppressed(_k: &mut Kernel, _param: usize) {
    SUPPRESSED.store(true, Ordering::SeqCst);
}

#[test]
fn reset_before_expiry_suppresses_callback() {
    let mut k = common::kernel();
    let vt = k.vt_create().unwrap();
    k.vt_set_i(vt, 5, mark_suppressed, 0);

    common::run_ticks(&mut k, 3);
    k.vt_reset_i(vt);
    assert!(!k.vt_is_armed(vt));
    k.vt_reset_i(vt); // idempotent on a disarmed timer

    common::run_ticks(&mut k, 20);
    assert!(!SUPPRESSED.load(Ordering::SeqCst));
}

static PERIODIC_FIRES: AtomicU32 = AtomicU32::new(0);

fn count_periodic(_k: &mut Kernel, _param: usize) {
    PERIODIC_FIRES.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn continuous_timer_rearms_until_reset() {
    let mut k = common::kernel();
    let vt = k.vt_create().unwrap();
    k.vt_set_continuous_i(vt, 4, count_periodic, 0);

    common::run_ticks(&mut k, 12);
    assert_eq!(PERIODIC_FIRES.load(Ordering::SeqCst), 3);
    assert!(k.vt_is_armed(vt));

    k.vt_reset_i(vt);
    common::run_ticks(&mut k, 8);
    assert_eq!(PERIODIC_FIRES.load(Ordering::SeqCst), 3);
}

fn noop(_k: &mut Kernel, _param: usize) {}

#[test]
fn delta_list_tracks_earliest_deadline() {
    let mut k = common::kernel();
    let t1 = k.vt_create().unwrap();
    let t2 = k.vt_create().unwrap();

    assert_eq!(k.time_until_next_i(), None);
    k.vt_set_i(t2, 5, noop, 0);
    k.vt_set_i(t1, 3, noop, 0);
    assert_eq!(k.time_until_next_i(), Some(3));

    common::run_ticks(&mut k, 1);
    assert_eq!(k.time_until_next_i(), Some(2));

    common::run_ticks(&mut k, 2);
    assert!(!k.vt_is_armed(t1));
    assert!(k.vt_is_armed(t2));
    assert_eq!(k.time_until_next_i(), Some(2));
}

static COINCIDENT: AtomicU32 = AtomicU32::new(0);

fn add_param(_k: &mut Kernel, param: usize) {
    COINCIDENT.fetch_add(param as u32, Ordering::SeqCst);
}

#[test]
fn coincident_timers_fire_in_the_same_tick() {
    let mut k = common::kernel();
    let t1 = k.vt_create().unwrap();
    let t2 = k.vt_create().unwrap();
    k.vt_set_i(t1, 3, add_param, 1);
    k.vt_set_i(t2, 3, add_param, 10);

    common::run_ticks(&mut k, 2);
    assert_eq!(COINCIDENT.load(Ordering::SeqCst), 0);
    common::run_ticks(&mut k, 1);
    assert_eq!(COINCIDENT.load(Ordering::SeqCst), 11);
}

#[test]
fn sleep_resumes_no_earlier_than_requested() {
    let mut k = common::kernel();
    let main = k.current();

    assert!(k.thread_sleep_s(5).is_suspended());
    assert_eq!(k.current(), k.idle_thread());

    common::run_ticks(&mut k, 4);
    assert_eq!(k.current(), k.idle_thread());
    common::run_ticks(&mut k, 1);
    assert_eq!(k.current(), main);
    assert_eq!(k.system_time(), 5);
}

#[test]
fn sleep_until_waits_for_the_absolute_deadline() {
    let mut k = common::kernel();
    let main = k.current();

    common::run_ticks(&mut k, 2);
    assert!(k.thread_sleep_until_s(7).is_suspended());
    assert_eq!(k.current(), k.idle_thread());

    common::run_ticks(&mut k, 4);
    assert_eq!(k.current(), k.idle_thread());
    common::run_ticks(&mut k, 1);
    assert_eq!(k.current(), main);
    assert_eq!(k.system_time(), 7);
}

#[test]
fn sleep_until_a_past_deadline_does_not_block() {
    let mut k = common::kernel();
    let main = k.current();

    common::run_ticks(&mut k, 5);
    let out = k.thread_sleep_until_s(3);
    assert_eq!(out.result(), Some(WaitResult::Completed(MSG_OK)));
    assert_eq!(k.current(), main);
    assert_eq!(k.system_time(), 5);
}

#[test]
fn zero_tick_sleep_is_a_yield() {
    let mut k = common::kernel();
    let main = k.current();
    let peer = common::start(&mut k, "peer", 64);

    // No wait state is entered; the caller is rotated behind its peer.
    let out = k.thread_sleep_s(0);
    assert_eq!(out.result(), Some(WaitResult::Completed(MSG_OK)));
    assert_eq!(k.current(), peer);
    assert_eq!(k.thread(main).state(), rtk_kernel::ThreadState::Ready);
}
