//! Linux implementation on top of epoll, timerfd and POSIX clocks.

#![expect(unsafe_code, reason = "thin wrappers over libc system calls")]

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;

use libc::{c_int, clockid_t, epoll_event, itimerspec, timespec};

use crate::clock::ClockDomain;
use crate::error::ClockError;
use crate::slot::Readiness;
use rtcycle_stats::NSEC_PER_SEC;

/// `TFD_TIMER_CANCEL_ON_SET` from `<sys/timerfd.h>`.
const TFD_TIMER_CANCEL_ON_SET: c_int = 1 << 1;

fn cvt(ret: c_int) -> io::Result<c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

const fn clock_id(domain: ClockDomain) -> clockid_t {
    match domain {
        ClockDomain::Monotonic => libc::CLOCK_MONOTONIC,
        ClockDomain::Realtime => libc::CLOCK_REALTIME,
    }
}

fn timespec_to_ns(ts: &timespec) -> Option<u64> {
    let secs = u64::try_from(ts.tv_sec).ok()?;
    let nanos = u64::try_from(ts.tv_nsec).ok()?;
    secs.checked_mul(NSEC_PER_SEC)?.checked_add(nanos)
}

fn ns_to_timespec(ns: u64) -> timespec {
    timespec {
        tv_sec: libc::time_t::try_from(ns / NSEC_PER_SEC).unwrap_or(libc::time_t::MAX),
        tv_nsec: libc::c_long::try_from(ns % NSEC_PER_SEC).unwrap_or(0),
    }
}

/// Read `domain` in nanoseconds.
pub(crate) fn clock_now(domain: ClockDomain) -> Result<u64, ClockError> {
    let mut ts = timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
    let rc = unsafe { libc::clock_gettime(clock_id(domain), &raw mut ts) };
    if rc != 0 {
        let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
        return Err(ClockError::Read { domain, errno });
    }
    timespec_to_ns(&ts).ok_or(ClockError::Negative(domain))
}

/// Sleep until the absolute time `deadline_ns` in `domain`.
///
/// An interrupted sleep returns early without error; callers re-check their
/// deadlines on every wakeup anyway.
pub(crate) fn sleep_until(domain: ClockDomain, deadline_ns: u64) -> io::Result<()> {
    let ts = ns_to_timespec(deadline_ns);
    // SAFETY: `ts` outlives the call and the remainder pointer may be null
    // with TIMER_ABSTIME.
    let rc = unsafe {
        libc::clock_nanosleep(clock_id(domain), libc::TIMER_ABSTIME, &raw const ts, ptr::null_mut())
    };
    match rc {
        0 | libc::EINTR => Ok(()),
        errno => Err(io::Error::from_raw_os_error(errno)),
    }
}

/// Switch the calling thread to `SCHED_FIFO` at `priority`.
pub(crate) fn set_fifo_priority(priority: i32) -> io::Result<()> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: pid 0 targets the calling thread and `param` is valid for the call.
    cvt(unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &raw const param) }).map(drop)
}

/// Pin the calling thread to `cpu`.
pub(crate) fn pin_to_cpu(cpu: usize) -> io::Result<()> {
    let setsize = usize::try_from(libc::CPU_SETSIZE).unwrap_or(0);
    if cpu >= setsize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cpu {cpu} out of range"),
        ));
    }
    // SAFETY: cpu_set_t is plain data and all-zero is the empty set.
    let mut set: libc::cpu_set_t = unsafe { mem::zeroed() };
    // SAFETY: `cpu` was checked against CPU_SETSIZE above.
    unsafe { libc::CPU_SET(cpu, &mut set) };
    // SAFETY: `set` is initialised and its size is passed alongside it.
    cvt(unsafe { libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &raw const set) })
        .map(drop)
}

/// Lock current and future pages in memory.
pub(crate) fn lock_memory() -> io::Result<()> {
    // SAFETY: mlockall takes no pointers.
    cvt(unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) }).map(drop)
}

fn to_epoll(readiness: Readiness) -> u32 {
    let mut flags = 0;
    if readiness.is_readable() {
        flags |= libc::EPOLLIN.unsigned_abs();
    }
    if readiness.is_writable() {
        flags |= libc::EPOLLOUT.unsigned_abs();
    }
    flags
}

fn from_epoll(flags: u32) -> Readiness {
    let mut readiness = Readiness::EMPTY;
    if flags & libc::EPOLLIN.unsigned_abs() != 0 {
        readiness |= Readiness::READABLE;
    }
    if flags & libc::EPOLLOUT.unsigned_abs() != 0 {
        readiness |= Readiness::WRITABLE;
    }
    if flags & libc::EPOLLERR.unsigned_abs() != 0 {
        readiness |= Readiness::ERROR;
    }
    if flags & libc::EPOLLHUP.unsigned_abs() != 0 {
        readiness |= Readiness::HANGUP;
    }
    readiness
}

/// Fixed-size buffer receiving one `epoll_wait` worth of events.
pub(crate) struct EventBuffer {
    raw: Vec<epoll_event>,
    len: usize,
}

impl EventBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: vec![epoll_event { events: 0, u64: 0 }; capacity.max(1)],
            len: 0,
        }
    }

    /// Ready `(token, readiness)` pairs from the last wait.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (u64, Readiness)> + '_ {
        self.raw.iter().take(self.len).map(|ev| {
            let token = ev.u64;
            let flags = ev.events;
            (token, from_epoll(flags))
        })
    }
}

/// Owned epoll instance.
#[derive(Debug)]
pub(crate) struct Epoll {
    fd: OwnedFd,
}

impl Epoll {
    pub(crate) fn new() -> io::Result<Self> {
        // SAFETY: epoll_create1 takes no pointers.
        let fd = cvt(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;
        // SAFETY: `fd` was just returned by epoll_create1 and nothing else owns it.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd })
    }

    /// Watch `fd` for `interest` plus error and hang-up, tagged with `token`.
    pub(crate) fn add(&self, fd: RawFd, interest: Readiness, token: u64) -> io::Result<()> {
        let mut ev = epoll_event {
            events: to_epoll(interest) | libc::EPOLLERR.unsigned_abs() | libc::EPOLLHUP.unsigned_abs(),
            u64: token,
        };
        // SAFETY: `ev` is valid for the call; the kernel copies it.
        cvt(unsafe { libc::epoll_ctl(self.fd.as_raw_fd(), libc::EPOLL_CTL_ADD, fd, &raw mut ev) })
            .map(drop)
    }

    pub(crate) fn delete(&self, fd: RawFd) -> io::Result<()> {
        let mut ev = epoll_event { events: 0, u64: 0 };
        // SAFETY: `ev` is valid for the call; pre-2.6.9 kernels require non-null.
        cvt(unsafe { libc::epoll_ctl(self.fd.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, &raw mut ev) })
            .map(drop)
    }

    /// Wait up to `timeout_ms`. An interrupted wait reports zero events.
    pub(crate) fn wait(&self, events: &mut EventBuffer, timeout_ms: i32) -> io::Result<usize> {
        let capacity = c_int::try_from(events.raw.len()).unwrap_or(c_int::MAX);
        // SAFETY: `raw` holds `capacity` writable entries.
        let n = unsafe {
            libc::epoll_wait(self.fd.as_raw_fd(), events.raw.as_mut_ptr(), capacity, timeout_ms)
        };
        if n < 0 {
            events.len = 0;
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }
        events.len = usize::try_from(n).unwrap_or(0);
        Ok(events.len)
    }
}

/// Non-blocking timer descriptor firing at absolute times.
#[derive(Debug)]
pub(crate) struct TimerFd {
    fd: OwnedFd,
    domain: ClockDomain,
}

impl TimerFd {
    pub(crate) fn new(domain: ClockDomain) -> io::Result<Self> {
        // SAFETY: timerfd_create takes no pointers.
        let fd = cvt(unsafe {
            libc::timerfd_create(clock_id(domain), libc::TFD_NONBLOCK | libc::TFD_CLOEXEC)
        })?;
        // SAFETY: `fd` was just returned by timerfd_create and nothing else owns it.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd, domain })
    }

    pub(crate) fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// First expiry at `start_ns`, then every `period_ns`.
    ///
    /// On the realtime clock the timer is cancelled when the clock is set, so
    /// the next read reports the step.
    pub(crate) fn arm_absolute(&self, start_ns: u64, period_ns: u64) -> io::Result<()> {
        let mut flags = libc::TFD_TIMER_ABSTIME;
        if self.domain == ClockDomain::Realtime {
            flags |= TFD_TIMER_CANCEL_ON_SET;
        }
        self.settime(flags, start_ns, period_ns)
    }

    pub(crate) fn disarm(&self) -> io::Result<()> {
        self.settime(0, 0, 0)
    }

    fn settime(&self, flags: c_int, value_ns: u64, interval_ns: u64) -> io::Result<()> {
        let spec = itimerspec {
            it_interval: ns_to_timespec(interval_ns),
            it_value: ns_to_timespec(value_ns),
        };
        // SAFETY: `spec` is valid for the call and the old-value pointer may be null.
        cvt(unsafe {
            libc::timerfd_settime(self.fd.as_raw_fd(), flags, &raw const spec, ptr::null_mut())
        })
        .map(drop)
    }

    /// Expirations since the last read; zero when none are pending.
    pub(crate) fn read_expirations(&self) -> io::Result<u64> {
        let mut buf = [0_u8; 8];
        // SAFETY: `buf` is 8 writable bytes, the size timerfd reads require.
        let n = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(u64::from_ne_bytes(buf))
    }
}

/// True when a timer read failed because the clock was set.
pub(crate) fn is_clock_step(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ECANCELED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timespec_conversion() {
        let ts = ns_to_timespec(3 * NSEC_PER_SEC + 250);
        assert_eq!(ts.tv_sec, 3);
        assert_eq!(ts.tv_nsec, 250);
        assert_eq!(timespec_to_ns(&ts), Some(3 * NSEC_PER_SEC + 250));
    }

    #[test]
    fn test_epoll_flag_mapping() {
        let flags = to_epoll(Readiness::READABLE | Readiness::WRITABLE);
        let back = from_epoll(flags);
        assert!(back.is_readable());
        assert!(back.is_writable());
        assert!(!back.is_error_or_hangup());
    }

    #[test]
    fn test_timerfd_reports_zero_when_idle() -> io::Result<()> {
        let timer = TimerFd::new(ClockDomain::Monotonic)?;
        assert_eq!(timer.read_expirations()?, 0);
        Ok(())
    }
}
