//! A clock moved by hand.

use std::sync::atomic::{AtomicU64, Ordering};

use rtcycle_scheduler::{Clock, ClockDomain, ClockError};

/// [`Clock`] whose time only changes when a test says so.
///
/// Reads can be made to fail a given number of times to exercise clock
/// fault handling.
#[derive(Debug)]
pub struct ManualClock {
    domain: ClockDomain,
    now: AtomicU64,
    failures: AtomicU64,
}

impl ManualClock {
    /// Monotonic clock reading `now_ns`.
    pub const fn new(now_ns: u64) -> Self {
        Self::with_domain(ClockDomain::Monotonic, now_ns)
    }

    /// Clock in `domain` reading `now_ns`.
    pub const fn with_domain(domain: ClockDomain, now_ns: u64) -> Self {
        Self {
            domain,
            now: AtomicU64::new(now_ns),
            failures: AtomicU64::new(0),
        }
    }

    /// Jump to `now_ns`, forwards or backwards.
    pub fn set(&self, now_ns: u64) {
        self.now.store(now_ns, Ordering::SeqCst);
    }

    /// Move forward by `delta_ns` and return the new time.
    pub fn advance(&self, delta_ns: u64) -> u64 {
        self.now.fetch_add(delta_ns, Ordering::SeqCst) + delta_ns
    }

    /// Current reading, ignoring injected failures.
    pub fn peek(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    /// Make the next `count` reads fail.
    pub fn fail_next(&self, count: u64) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn domain(&self) -> ClockDomain {
        self.domain
    }

    fn now_ns(&self) -> Result<u64, ClockError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ClockError::Read {
                domain: self.domain,
                errno: 22,
            });
        }
        Ok(self.now.load(Ordering::SeqCst))
    }
}
