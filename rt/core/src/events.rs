//! Event flag masks

use core::fmt;
use core::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Bitmask of event flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMask(u32);

impl EventMask {
    /// No flags set.
    pub const NONE: EventMask = EventMask(0);

    /// All flags set.
    pub const ALL: EventMask = EventMask(u32::MAX);

    /// Creates a mask from raw bits.
    pub const fn new(bits: u32) -> Self {
        EventMask(bits)
    }

    /// Creates a mask with the single flag at the given bit position.
    pub const fn flag(bit: u8) -> Self {
        EventMask(1u32 << (bit as u32 & 31))
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if any flag of `other` is set in `self`.
    pub const fn intersects(self, other: EventMask) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns `true` if every flag of `other` is set in `self`.
    pub const fn contains(self, other: EventMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the mask holding only the lowest set flag, or `NONE`.
    pub const fn lowest(self) -> EventMask {
        EventMask(self.0 & self.0.wrapping_neg())
    }

    /// Clears the flags of `other` in place.
    pub fn clear(&mut self, other: EventMask) {
        self.0 &= !other.0;
    }
}

impl BitOr for EventMask {
    type Output = EventMask;
    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: EventMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventMask {
    type Output = EventMask;
    fn bitand(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 & rhs.0)
    }
}

impl Not for EventMask {
    type Output = EventMask;
    fn not(self) -> EventMask {
        EventMask(!self.0)
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "events({:#010x})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for EventMask {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "events({=u32:x})", self.0);
    }
}
