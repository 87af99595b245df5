//! Domain-qualified nanosecond clocks.

use serde::{Deserialize, Serialize};

use crate::error::ClockError;
use crate::platform;

/// Which OS clock a task schedules against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockDomain {
    /// Never steps; unaffected by time synchronisation.
    Monotonic,
    /// Wall clock; may step when it is disciplined (PTP, NTP, settimeofday).
    #[default]
    Realtime,
}

/// A source of absolute nanosecond timestamps.
///
/// Implementations must be cheap enough to call several times per tick.
pub trait Clock: Send + Sync {
    /// Domain this clock reads.
    fn domain(&self) -> ClockDomain;

    /// Current time in nanoseconds.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError`] when the clock cannot be read.
    fn now_ns(&self) -> Result<u64, ClockError>;
}

/// The OS clock for a [`ClockDomain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemClock {
    domain: ClockDomain,
}

impl SystemClock {
    /// Clock reading `domain`.
    #[must_use]
    pub const fn new(domain: ClockDomain) -> Self {
        Self { domain }
    }

    /// Monotonic clock.
    #[must_use]
    pub const fn monotonic() -> Self {
        Self::new(ClockDomain::Monotonic)
    }

    /// Realtime clock.
    #[must_use]
    pub const fn realtime() -> Self {
        Self::new(ClockDomain::Realtime)
    }
}

impl Clock for SystemClock {
    fn domain(&self) -> ClockDomain {
        self.domain
    }

    fn now_ns(&self) -> Result<u64, ClockError> {
        platform::clock_now(self.domain)
    }
}
