//! Error types for cyclic tasks, their sockets and the frame codec.

use std::io;

use rtcycle_scheduler::{ClockError, TimerError};
use rtcycle_stats::HistogramError;

use crate::task::TaskState;

/// Socket-level failures reported by a transport.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// The OS socket call failed.
    #[error("socket I/O failed: {0}")]
    Io(#[from] io::Error),
    /// No address is configured for the stream.
    #[error("no address configured for stream {0}")]
    UnknownStream(u16),
    /// Only part of the frame was sent.
    #[error("short send: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes accepted by the socket.
        written: usize,
        /// Bytes in the frame.
        expected: usize,
    },
    /// The receive timestamp could not be taken.
    #[error("receive timestamp: {0}")]
    Clock(#[from] ClockError),
}

/// A frame that cannot be encoded or decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than a header.
    #[error("frame of {0} bytes is shorter than its header")]
    TooShort(usize),
    /// The header announces more payload than the frame carries.
    #[error("header announces {announced} payload bytes, {available} present")]
    Truncated {
        /// Payload length from the header.
        announced: usize,
        /// Bytes after the header.
        available: usize,
    },
    /// Payload does not fit the 16-bit length field.
    #[error("payload of {0} bytes does not fit the length field")]
    PayloadTooLarge(usize),
}

/// Failures of task setup and control.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The period is zero or does not divide one second.
    #[error("period {0} ns does not evenly divide one second")]
    InvalidPeriod(u64),
    /// More peers requested than supported or configured.
    #[error("{requested} peers requested, at most {max} available")]
    TooManyPeers {
        /// Requested peer count.
        requested: usize,
        /// Upper bound for this descriptor.
        max: usize,
    },
    /// A stream id has no address in the stream table.
    #[error("unknown stream {0}")]
    UnknownStream(u16),
    /// The operation is not valid in the task's current state.
    #[error("{op} not allowed in state {state:?}")]
    InvalidState {
        /// Attempted operation.
        op: &'static str,
        /// State at the time of the call.
        state: TaskState,
    },
    /// Opening a socket failed.
    #[error("socket setup failed: {0}")]
    Net(#[from] NetError),
    /// Timer creation, arming or slot registration failed.
    #[error("timer: {0}")]
    Timer(#[from] TimerError),
    /// The task clock could not be read.
    #[error("clock: {0}")]
    Clock(#[from] ClockError),
    /// A statistics histogram has an invalid geometry.
    #[error("statistics: {0}")]
    Stats(#[from] HistogramError),
}

/// A transmit attempt that did not reach the socket.
#[derive(Debug, thiserror::Error)]
pub enum TransmitError {
    /// Header plus payload would not fit the send buffer.
    #[error("frame of {len} bytes does not fit the {capacity} byte send buffer")]
    Oversized {
        /// Header plus payload length.
        len: usize,
        /// Send buffer size.
        capacity: usize,
    },
    /// The task has no transmit socket.
    #[error("task has no transmit stream")]
    NoTransmitter,
    /// Encoding the header failed.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// The socket refused the frame.
    #[error(transparent)]
    Net(#[from] NetError),
}
