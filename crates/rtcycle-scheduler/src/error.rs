//! Error types for the thread pool, timers and clocks.

use std::io;

use crate::capability::Capabilities;
use crate::clock::ClockDomain;

/// Reading a clock failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// The OS refused the read (raw errno).
    #[error("{domain:?} clock read failed (errno {errno})")]
    Read {
        /// Clock that was read.
        domain: ClockDomain,
        /// Raw OS error code.
        errno: i32,
    },
    /// The clock is not available on this platform.
    #[error("{0:?} clock unsupported on this platform")]
    Unsupported(ClockDomain),
    /// The clock reported a time before the epoch.
    #[error("{0:?} clock returned a negative time")]
    Negative(ClockDomain),
}

/// Registration and slot management failures.
///
/// All of these are synchronous and leave the pool exactly as it was before
/// the failing call.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// No thread advertises the capabilities, or every capable thread is full
    /// or sleeping in an incompatible wake mode.
    #[error("no thread with capabilities {0} has a free slot")]
    NoCapableThread(Capabilities),
    /// The descriptor is already registered in a live slot.
    #[error("fd {0} is already registered")]
    DuplicateFd(i32),
    /// The readiness multiplexer rejected the change.
    #[error("multiplexer {op} failed for thread {thread}: {source}")]
    Multiplexer {
        /// Operation that failed (`add`, `delete`).
        op: &'static str,
        /// Owning thread index.
        thread: usize,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The handle refers to a slot that has since been released.
    #[error("slot {slot} of thread {thread} was released")]
    StaleSlot {
        /// Owning thread index.
        thread: usize,
        /// Slot index.
        slot: usize,
    },
    /// Creating the pool failed.
    #[error("failed to start thread {thread}: {source}")]
    Spawn {
        /// Thread index.
        thread: usize,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// More thread configurations than the pool supports.
    #[error("{0} threads configured, at most {max} supported", max = crate::MAX_THREADS)]
    TooManyThreads(usize),
}

/// Fatal errors that end one thread's loop.
#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    /// Switching to the configured real-time priority failed.
    #[error("thread {thread}: cannot set SCHED_FIFO priority {priority}: {source}")]
    Priority {
        /// Thread index.
        thread: usize,
        /// Requested priority.
        priority: i32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Waiting for readiness failed with something other than an interrupt.
    #[error("thread {thread}: readiness wait failed: {source}")]
    Wait {
        /// Thread index.
        thread: usize,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The thread body panicked.
    #[error("thread {0} panicked")]
    Panicked(usize),
}

/// Timer failures.
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    /// The clock jumped: the timer can no longer tell how many periods passed.
    #[error("clock discontinuity detected")]
    Discontinuity,
    /// The clock could not be read.
    #[error(transparent)]
    Clock(#[from] ClockError),
    /// The OS timer source failed.
    #[error("timer source failed: {0}")]
    Io(#[source] io::Error),
    /// `period` is zero.
    #[error("timer period must be non-zero")]
    ZeroPeriod,
    /// The timer has no slot yet.
    #[error("timer is not attached to a thread")]
    NotAttached,
    /// The timer already owns a slot.
    #[error("timer is already attached to a thread")]
    AlreadyAttached,
    /// Registering the timer's slot failed.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl TimerError {
    /// True when the error means "the clock moved", as opposed to a fault.
    #[must_use]
    pub const fn is_discontinuity(&self) -> bool {
        matches!(self, Self::Discontinuity)
    }
}
