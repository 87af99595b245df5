//! Fixed pool of CPU-pinned real-time threads multiplexing timer and I/O slots.
//!
//! The pool is sized once at startup from a table of [`ThreadConfig`]s. Each
//! thread advertises a [`Capabilities`] mask, owns up to
//! [`MAX_THREAD_SLOTS`] slots and sleeps either on its epoll instance or
//! towards the earliest armed deadline of its slots. Work is added by
//! [`ThreadPool::register`], which picks the first capable thread with a free
//! slot and moves the [`SlotHandler`] onto it.
//!
//! On top of the pool, [`Timer`] provides a periodic wakeup with two
//! backends: a kernel `timerfd` or an adaptive sleep that catches up on
//! missed periods.
//!
//! # RT-Safety Guarantees
//!
//! - **No allocation** on the dispatch path once a slot is registered
//! - **Bounded waits**: every sleep ends within [`WAIT_TIMEOUT`]
//! - **No cross-thread state** touched by dispatch beyond the slot's own lock
//!
//! # Example
//!
//! ```no_run
//! use rtcycle_scheduler::{Capabilities, HandlerStatus, Registration, RtPolicy, ThreadPool};
//! use std::os::fd::AsRawFd;
//! use std::net::UdpSocket;
//!
//! let pool = ThreadPool::with_default_threads(RtPolicy::Required)?;
//! let socket = UdpSocket::bind("127.0.0.1:0")?;
//! socket.set_nonblocking(true)?;
//!
//! let fd = socket.as_raw_fd();
//! let handle = pool.register(Registration::fd(
//!     Capabilities::TSN_PT,
//!     fd,
//!     rtcycle_scheduler::Readiness::READABLE,
//!     move |_ready: rtcycle_scheduler::Readiness| {
//!         let mut buf = [0_u8; 64];
//!         while socket.recv(&mut buf).is_ok() {}
//!         HandlerStatus::Continue
//!     },
//! ))?;
//! handle.disable()?;
//! handle.release()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(unused_must_use)]

pub mod capability;
pub mod clock;
pub mod error;
pub mod pool;
pub mod rt_setup;
pub mod slot;
pub mod thread;
pub mod timer;

mod platform;

pub mod prelude;

pub use capability::Capabilities;
pub use clock::{Clock, ClockDomain, SystemClock};
pub use error::{ClockError, PoolError, ThreadError, TimerError};
pub use pool::ThreadPool;
pub use rt_setup::{RtPolicy, RtSetup};
pub use slot::{DeadlineWake, HandlerStatus, Readiness, Registration, SlotHandle, SlotHandler, Source};
pub use thread::{
    THREAD_STATS_PERIOD, ThreadConfig, ThreadStatsSnapshot, WAIT_TIMEOUT, WakeMode, default_threads,
};
pub use timer::{DEFAULT_MAX_CATCHUP, Timer, TimerKind, TimerOptions};

/// Maximum number of pool threads.
pub const MAX_THREADS: usize = 8;

/// Maximum number of slots per thread.
pub const MAX_THREAD_SLOTS: usize = 10;
