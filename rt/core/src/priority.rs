//! Thread priority levels

use crate::{KernelError, KernelResult};
use core::fmt;

/// Type-safe thread priority.
///
/// Higher numeric values denote higher priority. Priority `0` is reserved
/// and never valid for a thread; the idle thread runs at [`Priority::IDLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Priority of the idle thread (lowest schedulable level).
    pub const IDLE: Priority = Priority(1);

    /// Lowest priority available to user threads.
    pub const LOWEST: Priority = Priority(2);

    /// Default priority of the main thread.
    pub const NORMAL: Priority = Priority(64);

    /// Highest priority available to user threads.
    pub const HIGHEST: Priority = Priority(127);

    /// Absolute maximum priority level.
    pub const MAX: Priority = Priority(255);

    /// Creates a new priority level, rejecting the reserved value `0`.
    pub fn new(level: u8) -> KernelResult<Self> {
        if level == 0 {
            Err(KernelError::InvalidPriority)
        } else {
            Ok(Priority(level))
        }
    }

    /// Creates a priority without validation (const context).
    pub const fn new_unchecked(level: u8) -> Self {
        Priority(level)
    }

    /// Returns the raw priority level.
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Returns `true` for any non-reserved level.
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prio({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Priority {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "prio({})", self.0);
    }
}

/// Macro to create compile-time priority constants.
#[macro_export]
macro_rules! prio {
    ($value:literal) => {
        $crate::Priority::new_unchecked($value)
    };
}
