//! Prelude module for convenient imports.
//!
//! ```rust
//! use rtcycle_scheduler::prelude::*;
//! ```

pub use crate::capability::Capabilities;
pub use crate::clock::{Clock, ClockDomain, SystemClock};
pub use crate::error::{ClockError, PoolError, TimerError};
pub use crate::pool::ThreadPool;
pub use crate::rt_setup::RtPolicy;
pub use crate::slot::{HandlerStatus, Readiness, Registration, SlotHandle, SlotHandler};
pub use crate::thread::ThreadConfig;
pub use crate::timer::{Timer, TimerKind, TimerOptions};
