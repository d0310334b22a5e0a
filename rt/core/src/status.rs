//! Wait-status taxonomy
//!
//! Every completed blocking wait resolves to exactly one of three
//! mutually exclusive outcomes: a normal wakeup carrying a message, a
//! timeout, or a reset of the primitive the thread was parked on.

use core::fmt;

/// Wakeup message delivered to a woken thread.
///
/// Carries the semaphore/mutex status, a rendezvous reply code, a
/// dequeued byte, or a served event mask, depending on what the thread
/// was waiting for.
pub type Message = isize;

/// Normal wakeup.
pub const MSG_OK: Message = 0;
/// Reserved message value: the bounded wait expired.
pub const MSG_TIMEOUT: Message = -1;
/// Reserved message value: the primitive was reset while the thread waited.
pub const MSG_RESET: Message = -2;

/// Outcome of a completed blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a wait outcome distinguishes normal wakeup from timeout and reset"]
pub enum WaitResult {
    /// Normal wakeup; the payload is the wakeup message.
    Completed(Message),
    /// The bounded wait expired before the condition was met.
    Timeout,
    /// The primitive was reset while the thread waited.
    Reset,
}

impl WaitResult {
    /// Decodes a raw wakeup message, mapping the reserved values back to
    /// their variants.
    pub const fn from_message(msg: Message) -> Self {
        match msg {
            MSG_TIMEOUT => WaitResult::Timeout,
            MSG_RESET => WaitResult::Reset,
            other => WaitResult::Completed(other),
        }
    }

    /// Encodes the outcome as a raw wakeup message.
    pub const fn into_message(self) -> Message {
        match self {
            WaitResult::Completed(msg) => msg,
            WaitResult::Timeout => MSG_TIMEOUT,
            WaitResult::Reset => MSG_RESET,
        }
    }

    /// Returns `true` on a normal wakeup.
    pub const fn is_ok(self) -> bool {
        matches!(self, WaitResult::Completed(_))
    }

    /// Returns the wakeup message of a normal wakeup.
    pub const fn message(self) -> Option<Message> {
        match self {
            WaitResult::Completed(msg) => Some(msg),
            _ => None,
        }
    }
}

impl fmt::Display for WaitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitResult::Completed(msg) => write!(f, "completed({msg})"),
            WaitResult::Timeout => write!(f, "timeout"),
            WaitResult::Reset => write!(f, "reset"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for WaitResult {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            WaitResult::Completed(msg) => defmt::write!(fmt, "completed({})", msg),
            WaitResult::Timeout => defmt::write!(fmt, "timeout"),
            WaitResult::Reset => defmt::write!(fmt, "reset"),
        }
    }
}
