#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

//! # RTK Core
//!
//! Foundational types for the RTK real-time kernel: thread priorities,
//! tick counters and timeout values, the wait-status taxonomy shared by
//! every blocking primitive, and event masks.
//!
//! These types carry no kernel state of their own; the kernel proper
//! lives in the `rtk-kernel` crate.

use core::fmt;

pub mod events;
pub mod priority;
pub mod status;
pub mod time;

pub use events::*;
pub use priority::*;
pub use status::*;
pub use time::*;

/// RTK version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type for fallible (non-blocking) kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Error type for non-blocking kernel failures.
///
/// Blocking waits never produce a `KernelError`; their outcomes are
/// expressed by [`WaitResult`](crate::status::WaitResult).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Priority outside the valid range
    InvalidPriority,
    /// Thread arena has no free slot
    NoFreeThread,
    /// Object arena for the requested primitive is exhausted
    NoFreeObject,
    /// Listener table of an event source is full
    TooManyListeners,
    /// Requested queue capacity exceeds the backing buffer
    InvalidCapacity,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::InvalidPriority => write!(f, "priority outside the valid range"),
            KernelError::NoFreeThread => write!(f, "thread arena exhausted"),
            KernelError::NoFreeObject => write!(f, "object arena exhausted"),
            KernelError::TooManyListeners => write!(f, "listener table full"),
            KernelError::InvalidCapacity => write!(f, "invalid queue capacity"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for KernelError {}

#[cfg(feature = "defmt")]
impl defmt::Format for KernelError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            KernelError::InvalidPriority => defmt::write!(fmt, "InvalidPriority"),
            KernelError::NoFreeThread => defmt::write!(fmt, "NoFreeThread"),
            KernelError::NoFreeObject => defmt::write!(fmt, "NoFreeObject"),
            KernelError::TooManyListeners => defmt::write!(fmt, "TooManyListeners"),
            KernelError::InvalidCapacity => defmt::write!(fmt, "InvalidCapacity"),
        }
    }
}
