//! Tick counters and timeout values

use core::fmt;

/// Interval measured in system ticks.
pub type Ticks = u32;

/// Absolute system time in ticks since kernel initialization.
pub type SysTime = u64;

/// Timeout specifier accepted by every bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Do not block: a wait that cannot complete at once fails with
    /// [`WaitResult::Timeout`](crate::status::WaitResult::Timeout)
    /// without enqueueing the caller.
    Immediate,
    /// Block without bound.
    Infinite,
    /// Block for at most the given number of ticks.
    Ticks(Ticks),
}

impl Timeout {
    /// Normalizes `Ticks(0)` to `Immediate`.
    pub const fn normalized(self) -> Self {
        match self {
            Timeout::Ticks(0) => Timeout::Immediate,
            other => other,
        }
    }

    /// Returns `true` if the wait may not block at all.
    pub const fn is_immediate(self) -> bool {
        matches!(self.normalized(), Timeout::Immediate)
    }
}

impl From<Ticks> for Timeout {
    fn from(ticks: Ticks) -> Self {
        Timeout::Ticks(ticks).normalized()
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeout::Immediate => write!(f, "immediate"),
            Timeout::Infinite => write!(f, "infinite"),
            Timeout::Ticks(n) => write!(f, "{n}ticks"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Timeout {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Timeout::Immediate => defmt::write!(fmt, "immediate"),
            Timeout::Infinite => defmt::write!(fmt, "infinite"),
            Timeout::Ticks(n) => defmt::write!(fmt, "{}ticks", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ticks_is_immediate() {
        assert_eq!(Timeout::from(0), Timeout::Immediate);
        assert!(Timeout::Ticks(0).is_immediate());
        assert!(!Timeout::Ticks(5).is_immediate());
        assert!(!Timeout::Infinite.is_immediate());
    }
}
