//! Fixed-period cyclic tasks on top of the real-time thread pool.
//!
//! A [`CyclicTask`] binds one periodic [`rtcycle_scheduler::Timer`] to a set of
//! receive sockets, an optional transmit socket and a [`CyclicHandler`]. On
//! every tick it:
//!
//! 1. asks the timer how many periods elapsed and scores the wakeup against
//!    the scheduled time (early, late, missed);
//! 2. drains each receive socket, accepting only frames stamped with the
//!    expected period and peer id;
//! 3. runs [`CyclicHandler::on_cycle`], which may [`Cycle::transmit`];
//! 4. records processing time and periodically publishes a [`CyclicReport`].
//!
//! Clock faults never stop the task for good: the handler is told, the task
//! is re-armed at a fresh aligned start and the fault is counted.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rtcycle_cyclic::{Cycle, CyclicHandler, CyclicTask, UdpTransport, default_table, loopback_streams};
//! use rtcycle_scheduler::{RtPolicy, SystemClock, ThreadPool};
//!
//! struct Setpoint;
//!
//! impl CyclicHandler for Setpoint {
//!     fn on_cycle(&mut self, cycle: &mut Cycle<'_>) {
//!         let _ = cycle.transmit(1, b"setpoint");
//!     }
//! }
//!
//! let pool = ThreadPool::with_default_threads(RtPolicy::BestEffort)?;
//! let clock = Arc::new(SystemClock::monotonic());
//! let mut transport = UdpTransport::new(loopback_streams(47_800), clock.clone());
//!
//! let controller = default_table().remove(0);
//! let task = CyclicTask::register(&pool, &controller, &mut transport, clock, Setpoint)?;
//! task.start()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod handler;
pub mod net;
pub mod stats;
pub mod task;
pub mod udp;

pub mod prelude;

pub use config::{
    DEFAULT_BASE_PORT, DEFAULT_PERIOD_NS, MAX_PEERS, PeerBinding, SCHEDULE_LATENCY_THRESHOLD_NS, StreamTable, TaskDescriptor,
    TaskParams, TaskRole, default_table, is_valid_period, loopback_streams,
};
pub use engine::sched_error;
pub use error::{FrameError, NetError, TaskError, TransmitError};
pub use frame::{FrameHeader, HEADER_LEN};
pub use handler::{Cycle, CyclicHandler, RxMessage, TimerHealth};
pub use net::{FrameReceiver, FrameTransmitter, NetStats, RxMeta, Transport};
pub use stats::{CyclicReport, LatencyPeak, MonitoringSnapshot, PeerReport, TaskCounters, TaskReport, TimingReport};
pub use task::{CyclicTask, TaskState, aligned_start};
pub use udp::UdpTransport;
