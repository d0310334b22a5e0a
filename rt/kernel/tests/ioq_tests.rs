//! Byte I/O queue behavior across the thread/interrupt boundary.

mod common;

use rtk_kernel::{KernelError, Timeout, WaitResult, IOQ_BUFFER_SIZE, MSG_OK};

#[test]
fn capacity_is_validated_at_creation() {
    let mut k = common::kernel();
    assert_eq!(k.ioq_create_input(0), Err(KernelError::InvalidCapacity));
    assert_eq!(
        k.ioq_create_output(IOQ_BUFFER_SIZE + 1),
        Err(KernelError::InvalidCapacity)
    );
    let q = k.ioq_create_input(IOQ_BUFFER_SIZE).unwrap();
    assert_eq!(k.ioq_capacity(q), IOQ_BUFFER_SIZE);
}

#[test]
fn full_output_queue_immediate_put_does_not_block_or_modify() {
    let mut k = common::kernel();
    let main = k.current();
    let q = k.ioq_create_output(4).unwrap();

    for byte in 0..4u8 {
        assert!(k.ioq_put_s(q, byte, Timeout::Immediate).result().unwrap().is_ok());
    }
    assert_eq!(k.ioq_len(q), 4);

    // Full: an immediate put fails without touching the buffer.
    let out = k.ioq_put_s(q, 9, Timeout::Immediate);
    assert_eq!(out.result(), Some(WaitResult::Timeout));
    assert_eq!(k.ioq_len(q), 4);
    assert_eq!(k.current(), main);
}

#[test]
fn blocked_put_completes_when_a_slot_frees() {
    let mut k = common::kernel();
    let main = k.current();
    let q = k.ioq_create_output(4).unwrap();
    for byte in 0..4u8 {
        assert!(k.ioq_put_s(q, byte, Timeout::Immediate).result().unwrap().is_ok());
    }

    // Full: a finite-timeout put parks the caller.
    assert!(k.ioq_put_s(q, 9, Timeout::Ticks(10)).is_suspended());
    assert_eq!(k.current(), k.idle_thread());

    // ISR drains one byte; the parked putter's byte takes the slot.
    assert_eq!(k.ioq_get_i(q), Ok(0));
    k.reschedule_s();
    assert_eq!(k.current(), main);
    assert_eq!(k.resume_result(main), WaitResult::Completed(MSG_OK));
    assert_eq!(k.ioq_len(q), 4);

    let mut drained = Vec::new();
    while let Ok(byte) = k.ioq_get_i(q) {
        drained.push(byte);
    }
    assert_eq!(drained, vec![1, 2, 3, 9]);
}

#[test]
fn blocked_put_times_out_leaving_the_buffer_unchanged() {
    let mut k = common::kernel();
    let main = k.current();
    let q = k.ioq_create_output(2).unwrap();
    assert!(k.ioq_put_s(q, 1, Timeout::Immediate).result().unwrap().is_ok());
    assert!(k.ioq_put_s(q, 2, Timeout::Immediate).result().unwrap().is_ok());

    assert!(k.ioq_put_s(q, 3, Timeout::Ticks(4)).is_suspended());
    common::run_ticks(&mut k, 4);
    assert_eq!(k.current(), main);
    assert_eq!(k.resume_result(main), WaitResult::Timeout);
    assert_eq!(k.ioq_len(q), 2);
    assert_eq!(k.ioq_get_i(q), Ok(1));
}

#[test]
fn input_byte_is_handed_straight_to_a_parked_getter() {
    let mut k = common::kernel();
    let main = k.current();
    let q = k.ioq_create_input(4).unwrap();

    assert_eq!(
        k.ioq_get_s(q, Timeout::Immediate).result(),
        Some(WaitResult::Timeout),
        "empty queue, immediate get must not block"
    );

    assert!(k.ioq_get_s(q, Timeout::Infinite).is_suspended());
    assert_eq!(k.current(), k.idle_thread());

    k.ioq_put_i(q, 0x41).unwrap();
    k.reschedule_s();
    assert_eq!(k.current(), main);
    assert_eq!(k.resume_result(main), WaitResult::Completed(0x41));
    assert_eq!(k.ioq_len(q), 0, "the byte bypassed the buffer");
}

#[test]
fn input_queue_buffers_until_full() {
    let mut k = common::kernel();
    let q = k.ioq_create_input(4).unwrap();

    for byte in 10..14u8 {
        assert_eq!(k.ioq_put_i(q, byte), Ok(()));
    }
    assert!(k.ioq_put_i(q, 99).is_err(), "fifth byte must be refused");
    assert_eq!(k.ioq_len(q), 4);

    let out = k.ioq_get_s(q, Timeout::Immediate);
    assert_eq!(out.result().unwrap().message(), Some(10));
    assert_eq!(k.ioq_len(q), 3);
}

#[test]
fn reset_wakes_blocked_parties_and_drains() {
    let mut k = common::kernel();
    let main = k.current();
    let q = k.ioq_create_input(4).unwrap();

    assert!(k.ioq_get_s(q, Timeout::Infinite).is_suspended());
    k.ioq_reset_i(q);
    k.reschedule_s();
    assert_eq!(k.current(), main);
    assert_eq!(k.resume_result(main), WaitResult::Reset);
    assert_eq!(k.ioq_len(q), 0);

    // The queue is usable again after the reset.
    assert_eq!(k.ioq_put_i(q, 7), Ok(()));
    assert_eq!(k.ioq_get_s(q, Timeout::Immediate).result().unwrap().message(), Some(7));
}
