//! Thread capability masks.
//!
//! Every pool thread advertises a mask; a registration names the capabilities
//! it needs and lands on the first thread whose mask is a superset.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Set of capability bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(u32);

impl Capabilities {
    /// No capabilities.
    pub const NONE: Self = Self(0);
    /// Statistics reporting.
    pub const STATS: Self = Self(0x100);
    /// Generic timers.
    pub const TIMER: Self = Self(0x200);
    /// Control channels driven from outside the cyclic loop.
    pub const CONTROLLED: Self = Self(0x400);
    /// Cyclic network task loops.
    pub const TSN_LOOP: Self = Self(0x2000);
    /// Pass-through I/O attached to a cyclic task.
    pub const TSN_PT: Self = Self(0x4000);

    /// Mask from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when every bit of `required` is present in `self`.
    #[must_use]
    pub const fn contains(self, required: Self) -> bool {
        self.0 & required.0 == required.0
    }

    /// True when no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}
