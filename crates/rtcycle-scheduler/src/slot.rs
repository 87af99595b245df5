//! Slots: one registration inside a pool thread.
//!
//! A [`Registration`] names what should wake the slot (a file descriptor or a
//! [`DeadlineWake`]), the capabilities it needs and the [`SlotHandler`] that
//! runs on the owning thread. Registering moves the handler into the slot;
//! the caller keeps a [`SlotHandle`] to enable, disable or release it.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::capability::Capabilities;
use crate::clock::ClockDomain;
use crate::error::PoolError;
use crate::pool::PoolInner;

/// Readiness bits delivered to a handler, also used as the requested interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness(u8);

impl Readiness {
    /// Nothing.
    pub const EMPTY: Self = Self(0);
    /// Input available (or a deadline reached).
    pub const READABLE: Self = Self(0x1);
    /// Output possible.
    pub const WRITABLE: Self = Self(0x2);
    /// Error condition on the descriptor.
    pub const ERROR: Self = Self(0x4);
    /// Peer hung up.
    pub const HANGUP: Self = Self(0x8);

    /// Input is available.
    #[must_use]
    pub const fn is_readable(self) -> bool {
        self.0 & Self::READABLE.0 != 0
    }

    /// Output is possible.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        self.0 & Self::WRITABLE.0 != 0
    }

    /// Error or hang-up reported.
    #[must_use]
    pub const fn is_error_or_hangup(self) -> bool {
        self.0 & (Self::ERROR.0 | Self::HANGUP.0) != 0
    }

    /// Input or output readiness, the kind that counts as activity.
    #[must_use]
    pub const fn is_io(self) -> bool {
        self.0 & (Self::READABLE.0 | Self::WRITABLE.0) != 0
    }
}

impl BitOr for Readiness {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Readiness {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Outcome of one handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    /// Handled.
    Continue,
    /// The handler failed; counted in thread statistics, the slot stays live.
    Error,
}

/// Callback run by the owning thread.
pub trait SlotHandler: Send + 'static {
    /// The slot's source became ready.
    fn on_ready(&mut self, readiness: Readiness) -> HandlerStatus;

    /// No input/output activity for longer than the slot's timeout budget.
    fn on_timeout(&mut self) {}
}

impl<F> SlotHandler for F
where
    F: FnMut(Readiness) -> HandlerStatus + Send + 'static,
{
    fn on_ready(&mut self, readiness: Readiness) -> HandlerStatus {
        self(readiness)
    }
}

/// Absolute wakeup time shared between a timer and its thread.
///
/// The timer arms it; the thread fires it once when due and disarms it. A
/// thread sleeping on deadlines wakes for the earliest armed one.
#[derive(Debug)]
pub struct DeadlineWake {
    domain: ClockDomain,
    next: AtomicU64,
    armed: AtomicBool,
}

impl DeadlineWake {
    /// Disarmed wake in `domain`.
    #[must_use]
    pub const fn new(domain: ClockDomain) -> Self {
        Self {
            domain,
            next: AtomicU64::new(0),
            armed: AtomicBool::new(false),
        }
    }

    /// Clock the deadline is expressed in.
    #[must_use]
    pub const fn domain(&self) -> ClockDomain {
        self.domain
    }

    /// Fire at `deadline_ns`.
    pub fn arm(&self, deadline_ns: u64) {
        self.next.store(deadline_ns, Ordering::Relaxed);
        self.armed.store(true, Ordering::Release);
    }

    /// Cancel the pending deadline.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    /// Pending deadline, if armed.
    #[must_use]
    pub fn deadline(&self) -> Option<u64> {
        if self.armed.load(Ordering::Acquire) {
            Some(self.next.load(Ordering::Relaxed))
        } else {
            None
        }
    }

    /// Disarm and report true if the deadline is at or before `now_ns`.
    pub(crate) fn fire_if_due(&self, now_ns: u64) -> bool {
        match self.deadline() {
            Some(next) if next <= now_ns => {
                self.disarm();
                true
            }
            _ => false,
        }
    }

    /// Disarm unconditionally if armed; used when the clock cannot be read.
    pub(crate) fn fire_if_armed(&self) -> bool {
        self.armed.swap(false, Ordering::AcqRel)
    }
}

/// What wakes a slot.
#[derive(Debug, Clone)]
pub enum Source {
    /// A descriptor watched by the thread's readiness multiplexer.
    Fd {
        /// Descriptor; must stay open while the slot is registered.
        fd: RawFd,
        /// Requested readiness.
        interest: Readiness,
    },
    /// An absolute deadline the thread sleeps towards.
    Deadline(Arc<DeadlineWake>),
}

/// Everything needed to claim a slot.
pub struct Registration {
    pub(crate) capabilities: Capabilities,
    pub(crate) source: Source,
    pub(crate) handler: Box<dyn SlotHandler>,
    pub(crate) timeout: Option<Duration>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("capabilities", &self.capabilities)
            .field("source", &self.source)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Registration {
    /// Watch `fd` for `interest`.
    pub fn fd(
        capabilities: Capabilities,
        fd: RawFd,
        interest: Readiness,
        handler: impl SlotHandler,
    ) -> Self {
        Self {
            capabilities,
            source: Source::Fd { fd, interest },
            handler: Box::new(handler),
            timeout: None,
        }
    }

    /// Wake when `wake` falls due.
    pub fn deadline(
        capabilities: Capabilities,
        wake: Arc<DeadlineWake>,
        handler: impl SlotHandler,
    ) -> Self {
        Self {
            capabilities,
            source: Source::Deadline(wake),
            handler: Box::new(handler),
            timeout: None,
        }
    }

    /// Call [`SlotHandler::on_timeout`] after `budget` without activity.
    #[must_use]
    pub fn with_timeout(mut self, budget: Duration) -> Self {
        self.timeout = Some(budget);
        self
    }
}

/// Per-slot state, guarded by the slot lock.
#[derive(Default)]
pub(crate) struct SlotEntry {
    pub(crate) used: bool,
    pub(crate) enabled: bool,
    pub(crate) generation: u64,
    pub(crate) source: Option<Source>,
    pub(crate) handler: Option<Box<dyn SlotHandler>>,
    pub(crate) timeout_budget_ns: Option<u64>,
    pub(crate) idle_ns: u64,
    pub(crate) timeouts: u64,
}

impl SlotEntry {
    pub(crate) fn fd(&self) -> Option<RawFd> {
        match &self.source {
            Some(Source::Fd { fd, .. }) => Some(*fd),
            _ => None,
        }
    }

    pub(crate) fn wake(&self) -> Option<&Arc<DeadlineWake>> {
        match &self.source {
            Some(Source::Deadline(wake)) => Some(wake),
            _ => None,
        }
    }

    /// Return to the free state, handing back the handler so the caller can
    /// drop it outside the lock.
    pub(crate) fn vacate(&mut self) -> Option<Box<dyn SlotHandler>> {
        let handler = self.handler.take();
        *self = Self {
            generation: self.generation.wrapping_add(1),
            ..Self::default()
        };
        handler
    }
}

/// Caller's handle on a registered slot.
///
/// Dropping the handle releases the slot.
pub struct SlotHandle {
    pub(crate) pool: Arc<PoolInner>,
    pub(crate) thread: usize,
    pub(crate) slot: usize,
    pub(crate) generation: u64,
    pub(crate) released: bool,
}

impl fmt::Debug for SlotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotHandle")
            .field("thread", &self.thread)
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl SlotHandle {
    /// Index of the owning thread.
    #[must_use]
    pub const fn thread_index(&self) -> usize {
        self.thread
    }

    /// Index of the slot within its thread.
    #[must_use]
    pub const fn slot_index(&self) -> usize {
        self.slot
    }

    /// Start watching the source again. A no-op when already enabled.
    ///
    /// # Errors
    ///
    /// [`PoolError::StaleSlot`] if the slot was released,
    /// [`PoolError::Multiplexer`] if the descriptor cannot be watched.
    pub fn enable(&self) -> Result<(), PoolError> {
        self.pool.set_enabled(self, true)
    }

    /// Stop watching the source. A no-op when already disabled.
    ///
    /// # Errors
    ///
    /// [`PoolError::StaleSlot`] if the slot was released,
    /// [`PoolError::Multiplexer`] if the descriptor cannot be unwatched.
    pub fn disable(&self) -> Result<(), PoolError> {
        self.pool.set_enabled(self, false)
    }

    /// True while the source is watched.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.pool.is_enabled(self)
    }

    /// Timeouts fired for this slot so far.
    #[must_use]
    pub fn timeouts(&self) -> u64 {
        self.pool.timeouts(self)
    }

    /// Release the slot.
    ///
    /// # Errors
    ///
    /// [`PoolError::StaleSlot`] if the slot was already released elsewhere.
    /// The slot is freed even when unwatching the descriptor fails.
    pub fn release(mut self) -> Result<(), PoolError> {
        self.released = true;
        self.pool.release(&self)
    }
}

impl Drop for SlotHandle {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            if let Err(err) = self.pool.release(self) {
                tracing::debug!(thread = self.thread, slot = self.slot, %err, "slot release on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_wake_fires_once() {
        let wake = DeadlineWake::new(ClockDomain::Monotonic);
        assert_eq!(wake.deadline(), None);
        assert!(!wake.fire_if_due(u64::MAX));

        wake.arm(1_000);
        assert!(!wake.fire_if_due(999));
        assert!(wake.fire_if_due(1_000));
        assert!(!wake.fire_if_due(2_000));
        assert_eq!(wake.deadline(), None);
    }

    #[test]
    fn test_readiness_bits() {
        let r = Readiness::READABLE | Readiness::HANGUP;
        assert!(r.is_readable());
        assert!(!r.is_writable());
        assert!(r.is_error_or_hangup());
        assert!(r.is_io());
        assert!(!Readiness::ERROR.is_io());
    }

    #[test]
    fn test_vacate_bumps_generation() {
        let mut entry = SlotEntry {
            used: true,
            enabled: true,
            generation: 4,
            handler: Some(Box::new(|_: Readiness| HandlerStatus::Continue)),
            ..SlotEntry::default()
        };
        let handler = entry.vacate();
        assert!(handler.is_some());
        assert!(!entry.used);
        assert_eq!(entry.generation, 5);
    }
}
