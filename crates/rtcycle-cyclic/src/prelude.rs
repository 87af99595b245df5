//! Prelude module for convenient imports.
//!
//! ```rust
//! use rtcycle_cyclic::prelude::*;
//! ```

pub use crate::config::{TaskDescriptor, TaskRole, default_table};
pub use crate::error::{TaskError, TransmitError};
pub use crate::handler::{Cycle, CyclicHandler, RxMessage, TimerHealth};
pub use crate::net::Transport;
pub use crate::stats::CyclicReport;
pub use crate::task::{CyclicTask, TaskState};
pub use crate::udp::UdpTransport;
