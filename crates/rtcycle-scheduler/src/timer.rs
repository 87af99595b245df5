//! Periodic timers with two interchangeable backends.
//!
//! - [`TimerKind::Hardware`]: a `timerfd` armed at an absolute start time; the
//!   kernel counts expirations and the descriptor is a readiness slot.
//! - [`TimerKind::Adaptive`]: no descriptor. The owning thread sleeps towards
//!   the next wakeup and [`Timer::check`] works out how many whole periods
//!   passed, catching up after overruns up to a configurable bound.
//!
//! Both share one contract: `start(abs, period)`, then on every wake
//! `check(now)` yields the number of elapsed periods (zero for a spurious
//! wake) or a discontinuity when the clock can no longer be trusted.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rtcycle_scheduler::{
//!     Capabilities, ClockDomain, HandlerStatus, Readiness, RtPolicy, ThreadPool, Timer,
//!     TimerKind, TimerOptions,
//! };
//!
//! let pool = ThreadPool::with_default_threads(RtPolicy::BestEffort)?;
//! let timer = Arc::new(Timer::new(TimerKind::Adaptive, ClockDomain::Monotonic, TimerOptions::default())?);
//! let tick = Arc::clone(&timer);
//! timer.attach(&pool, Capabilities::TSN_LOOP, move |_: Readiness| {
//!     let _ = tick.check(0);
//!     HandlerStatus::Continue
//! })?;
//! timer.start(1_000_000_000, 2_000_000)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::capability::Capabilities;
use crate::clock::ClockDomain;
use crate::error::TimerError;
use crate::platform::{self, TimerFd};
use crate::pool::ThreadPool;
use crate::slot::{DeadlineWake, Readiness, Registration, SlotHandle, SlotHandler};

/// Default bound on how far behind an adaptive timer may fall before the
/// gap is treated as a clock discontinuity.
pub const DEFAULT_MAX_CATCHUP: Duration = Duration::from_secs(10);

/// Backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Kernel timer descriptor.
    Hardware,
    /// Cooperative sleep driven by the owning thread.
    #[default]
    Adaptive,
}

/// Tunables of the adaptive backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerOptions {
    /// Maximum lateness that is still caught up period by period.
    pub max_catchup: Duration,
    /// How early a wake may be and still count as spurious instead of a
    /// clock going backwards. `None` means one period.
    pub early_tolerance: Option<Duration>,
}

impl Default for TimerOptions {
    fn default() -> Self {
        Self {
            max_catchup: DEFAULT_MAX_CATCHUP,
            early_tolerance: None,
        }
    }
}

/// Periodic timer.
///
/// All methods take `&self` so the timer can be shared between the handler
/// that checks it and the owner that starts and stops it.
#[derive(Debug)]
pub enum Timer {
    /// `timerfd` backend.
    Hardware(HardwareTimer),
    /// Sleep-until backend.
    Adaptive(AdaptiveTimer),
}

impl Timer {
    /// Allocate backend state. No slot is claimed until [`Timer::attach`].
    ///
    /// # Errors
    ///
    /// [`TimerError::Io`] when the hardware backend cannot create its descriptor.
    pub fn new(kind: TimerKind, domain: ClockDomain, options: TimerOptions) -> Result<Self, TimerError> {
        Ok(match kind {
            TimerKind::Hardware => Self::Hardware(HardwareTimer::new(domain)?),
            TimerKind::Adaptive => Self::Adaptive(AdaptiveTimer::new(domain, options)),
        })
    }

    /// Allocate and attach in one go.
    ///
    /// # Errors
    ///
    /// See [`Timer::new`] and [`Timer::attach`].
    pub fn create(
        kind: TimerKind,
        domain: ClockDomain,
        options: TimerOptions,
        pool: &ThreadPool,
        capabilities: Capabilities,
        handler: impl SlotHandler,
    ) -> Result<Arc<Self>, TimerError> {
        let timer = Arc::new(Self::new(kind, domain, options)?);
        timer.attach(pool, capabilities, handler)?;
        Ok(timer)
    }

    /// Register the timer's slot; `handler` runs on every wake.
    ///
    /// # Errors
    ///
    /// [`TimerError::AlreadyAttached`], or [`TimerError::Pool`] when no thread
    /// can take the slot.
    pub fn attach(
        &self,
        pool: &ThreadPool,
        capabilities: Capabilities,
        handler: impl SlotHandler,
    ) -> Result<(), TimerError> {
        self.attach_with_timeout(pool, capabilities, None, handler)
    }

    /// Like [`Timer::attach`], with [`SlotHandler::on_timeout`] called after
    /// `timeout` without a wake.
    ///
    /// # Errors
    ///
    /// See [`Timer::attach`].
    pub fn attach_with_timeout(
        &self,
        pool: &ThreadPool,
        capabilities: Capabilities,
        timeout: Option<Duration>,
        handler: impl SlotHandler,
    ) -> Result<(), TimerError> {
        let slot = self.slot();
        let mut slot = slot.lock();
        if slot.is_some() {
            return Err(TimerError::AlreadyAttached);
        }
        let registration = match self {
            Self::Hardware(t) => {
                Registration::fd(capabilities, t.fd.as_raw_fd(), Readiness::READABLE, handler)
            }
            Self::Adaptive(t) => Registration::deadline(capabilities, Arc::clone(&t.wake), handler),
        };
        let registration = match timeout {
            Some(budget) => registration.with_timeout(budget),
            None => registration,
        };
        let handle = pool.register(registration)?;
        debug!(
            kind = ?self.kind(),
            thread = handle.thread_index(),
            slot = handle.slot_index(),
            "timer attached"
        );
        *slot = Some(handle);
        Ok(())
    }

    /// Backend in use.
    #[must_use]
    pub const fn kind(&self) -> TimerKind {
        match self {
            Self::Hardware(_) => TimerKind::Hardware,
            Self::Adaptive(_) => TimerKind::Adaptive,
        }
    }

    /// Clock the timer runs on.
    #[must_use]
    pub fn domain(&self) -> ClockDomain {
        match self {
            Self::Hardware(t) => t.domain,
            Self::Adaptive(t) => t.wake.domain(),
        }
    }

    /// Fire first at `start_ns`, then every `period_ns`.
    ///
    /// # Errors
    ///
    /// [`TimerError::ZeroPeriod`], or [`TimerError::Io`] if the kernel timer
    /// cannot be armed.
    pub fn start(&self, start_ns: u64, period_ns: u64) -> Result<(), TimerError> {
        if period_ns == 0 {
            return Err(TimerError::ZeroPeriod);
        }
        trace!(start_ns, period_ns, kind = ?self.kind(), "timer start");
        match self {
            Self::Hardware(t) => t.start(start_ns, period_ns),
            Self::Adaptive(t) => {
                t.start(start_ns, period_ns);
                Ok(())
            }
        }
    }

    /// Whole periods elapsed since the previous check.
    ///
    /// `now_ns` is only used by the adaptive backend.
    ///
    /// # Errors
    ///
    /// [`TimerError::Discontinuity`] when the clock stepped, or
    /// [`TimerError::Io`] on a hardware read failure.
    pub fn check(&self, now_ns: u64) -> Result<u64, TimerError> {
        match self {
            Self::Hardware(t) => t.check(),
            Self::Adaptive(t) => t.check(now_ns),
        }
    }

    /// Disarm. Idempotent.
    ///
    /// # Errors
    ///
    /// [`TimerError::Io`] if the kernel timer cannot be disarmed.
    pub fn stop(&self) -> Result<(), TimerError> {
        match self {
            Self::Hardware(t) => t.fd.disarm().map_err(TimerError::Io),
            Self::Adaptive(t) => {
                t.wake.disarm();
                Ok(())
            }
        }
    }

    /// Disarm and release the slot. Idempotent.
    ///
    /// # Errors
    ///
    /// See [`Timer::stop`]; the slot is released regardless.
    pub fn exit(&self) -> Result<(), TimerError> {
        let stopped = self.stop();
        let handle = self.slot().lock().take();
        if let Some(handle) = handle {
            handle.release()?;
        }
        stopped
    }

    /// True while the timer owns a slot.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.slot().lock().is_some()
    }

    /// Index of the thread running the timer's slot.
    #[must_use]
    pub fn thread_index(&self) -> Option<usize> {
        self.slot().lock().as_ref().map(SlotHandle::thread_index)
    }

    const fn slot(&self) -> &Mutex<Option<SlotHandle>> {
        match self {
            Self::Hardware(t) => &t.slot,
            Self::Adaptive(t) => &t.slot,
        }
    }
}

/// `timerfd` backend.
#[derive(Debug)]
pub struct HardwareTimer {
    // Declared first so the slot is released before the descriptor closes.
    slot: Mutex<Option<SlotHandle>>,
    fd: TimerFd,
    domain: ClockDomain,
}

impl HardwareTimer {
    fn new(domain: ClockDomain) -> Result<Self, TimerError> {
        Ok(Self {
            slot: Mutex::new(None),
            fd: TimerFd::new(domain).map_err(TimerError::Io)?,
            domain,
        })
    }

    fn start(&self, start_ns: u64, period_ns: u64) -> Result<(), TimerError> {
        self.fd.arm_absolute(start_ns, period_ns).map_err(TimerError::Io)
    }

    fn check(&self) -> Result<u64, TimerError> {
        self.fd.read_expirations().map_err(|err| {
            if platform::is_clock_step(&err) {
                TimerError::Discontinuity
            } else {
                TimerError::Io(err)
            }
        })
    }
}

/// Sleep-until backend.
#[derive(Debug)]
pub struct AdaptiveTimer {
    slot: Mutex<Option<SlotHandle>>,
    wake: Arc<DeadlineWake>,
    next: AtomicU64,
    period: AtomicU64,
    options: TimerOptions,
}

impl AdaptiveTimer {
    fn new(domain: ClockDomain, options: TimerOptions) -> Self {
        Self {
            slot: Mutex::new(None),
            wake: Arc::new(DeadlineWake::new(domain)),
            next: AtomicU64::new(0),
            period: AtomicU64::new(0),
            options,
        }
    }

    fn start(&self, start_ns: u64, period_ns: u64) {
        self.period.store(period_ns, Ordering::Relaxed);
        self.next.store(start_ns, Ordering::Relaxed);
        self.wake.arm(start_ns);
    }

    fn check(&self, now_ns: u64) -> Result<u64, TimerError> {
        let next = self.next.load(Ordering::Relaxed);
        let period = self.period.load(Ordering::Relaxed);
        if period == 0 {
            return Ok(0);
        }

        if now_ns < next {
            let tolerance = self
                .options
                .early_tolerance
                .map_or(period, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
            if next - now_ns <= tolerance {
                // Woken early: keep waiting for the same deadline.
                self.wake.arm(next);
                return Ok(0);
            }
            return Err(TimerError::Discontinuity);
        }

        let late = now_ns - next;
        if u128::from(late) > self.options.max_catchup.as_nanos() {
            return Err(TimerError::Discontinuity);
        }

        let elapsed = late / period + 1;
        let advanced = next.saturating_add(elapsed.saturating_mul(period));
        self.next.store(advanced, Ordering::Relaxed);
        self.wake.arm(advanced);
        Ok(elapsed)
    }
}
