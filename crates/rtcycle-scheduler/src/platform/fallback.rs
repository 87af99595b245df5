//! Fallback for targets without epoll/timerfd.
//!
//! Clocks and sleeps work through `std`; the readiness multiplexer and timer
//! descriptors report `Unsupported`, so only deadline-driven slots can run.

use std::io;
use std::os::fd::RawFd;
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::clock::ClockDomain;
use crate::error::ClockError;
use crate::slot::Readiness;

fn unsupported(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, format!("{what} is not available on this platform"))
}

pub(crate) fn clock_now(domain: ClockDomain) -> Result<u64, ClockError> {
    match domain {
        ClockDomain::Monotonic => {
            static BASE: OnceLock<Instant> = OnceLock::new();
            let base = BASE.get_or_init(Instant::now);
            u64::try_from(base.elapsed().as_nanos())
                .ok()
                .ok_or(ClockError::Unsupported(domain))
        }
        ClockDomain::Realtime => {
            let since = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .ok()
                .ok_or(ClockError::Negative(domain))?;
            u64::try_from(since.as_nanos())
                .ok()
                .ok_or(ClockError::Unsupported(domain))
        }
    }
}

pub(crate) fn sleep_until(domain: ClockDomain, deadline_ns: u64) -> io::Result<()> {
    let now = clock_now(domain).map_err(io::Error::other)?;
    if deadline_ns > now {
        std::thread::sleep(Duration::from_nanos(deadline_ns - now));
    }
    Ok(())
}

pub(crate) fn set_fifo_priority(_priority: i32) -> io::Result<()> {
    Err(unsupported("SCHED_FIFO"))
}

pub(crate) fn pin_to_cpu(_cpu: usize) -> io::Result<()> {
    Err(unsupported("CPU affinity"))
}

pub(crate) fn lock_memory() -> io::Result<()> {
    Err(unsupported("mlockall"))
}

pub(crate) struct EventBuffer;

impl EventBuffer {
    pub(crate) fn with_capacity(_capacity: usize) -> Self {
        Self
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (u64, Readiness)> + '_ {
        std::iter::empty()
    }
}

#[derive(Debug)]
pub(crate) struct Epoll;

impl Epoll {
    pub(crate) fn new() -> io::Result<Self> {
        Ok(Self)
    }

    pub(crate) fn add(&self, _fd: RawFd, _interest: Readiness, _token: u64) -> io::Result<()> {
        Err(unsupported("epoll"))
    }

    pub(crate) fn delete(&self, _fd: RawFd) -> io::Result<()> {
        Err(unsupported("epoll"))
    }

    pub(crate) fn wait(&self, _events: &mut EventBuffer, timeout_ms: i32) -> io::Result<usize> {
        let ms = u64::try_from(timeout_ms).unwrap_or(0);
        std::thread::sleep(Duration::from_millis(ms));
        Ok(0)
    }
}

#[derive(Debug)]
pub(crate) struct TimerFd;

impl TimerFd {
    pub(crate) fn new(_domain: ClockDomain) -> io::Result<Self> {
        Err(unsupported("timerfd"))
    }

    pub(crate) fn as_raw_fd(&self) -> RawFd {
        -1
    }

    pub(crate) fn arm_absolute(&self, _start_ns: u64, _period_ns: u64) -> io::Result<()> {
        Err(unsupported("timerfd"))
    }

    pub(crate) fn disarm(&self) -> io::Result<()> {
        Err(unsupported("timerfd"))
    }

    pub(crate) fn read_expirations(&self) -> io::Result<u64> {
        Err(unsupported("timerfd"))
    }
}

pub(crate) fn is_clock_step(_err: &io::Error) -> bool {
    false
}
