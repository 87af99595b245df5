//! Socket contract between a cyclic task and its transport.
//!
//! A transport opens one receiver per peer stream and at most one
//! transmitter per task. Both sides are non-blocking: a receive with nothing
//! queued returns `Ok(None)` and must never wait.
//!
//! [`RxSocket`] and [`TxSocket`] wrap the transport halves and keep the raw
//! frame and error counters reported with the task statistics.

use core::fmt;

use tracing::trace;

use crate::error::NetError;

/// Metadata of one received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxMeta {
    /// Bytes written into the receive buffer.
    pub len: usize,
    /// Receive time in the task's clock domain.
    pub timestamp_ns: u64,
}

/// Non-blocking frame source.
pub trait FrameReceiver: Send {
    /// Copy the next queued frame into `buf`; `Ok(None)` when nothing is queued.
    ///
    /// # Errors
    ///
    /// Any [`NetError`] from the underlying socket.
    fn receive(&mut self, buf: &mut [u8]) -> Result<Option<RxMeta>, NetError>;
}

/// Non-blocking frame sink.
pub trait FrameTransmitter: Send {
    /// Queue `frame` for sending.
    ///
    /// # Errors
    ///
    /// Any [`NetError`] from the underlying socket.
    fn transmit(&mut self, frame: &[u8]) -> Result<(), NetError>;
}

/// Opens the sockets of a task by stream id.
pub trait Transport {
    /// Receiver for `stream`.
    ///
    /// # Errors
    ///
    /// [`NetError::UnknownStream`] or a socket setup failure.
    fn open_rx(&mut self, stream: u16) -> Result<Box<dyn FrameReceiver>, NetError>;

    /// Transmitter for `stream`.
    ///
    /// # Errors
    ///
    /// [`NetError::UnknownStream`] or a socket setup failure.
    fn open_tx(&mut self, stream: u16) -> Result<Box<dyn FrameTransmitter>, NetError>;
}

/// Raw per-socket counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetStats {
    /// Frames received or sent.
    pub frames: u64,
    /// Socket errors.
    pub err: u64,
}

/// Outcome of one receive attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxStatus {
    /// A frame was copied into the buffer.
    Frame(RxMeta),
    /// Nothing queued.
    NoFrame,
    /// The socket reported an error.
    Error,
}

/// Receiving side of a peer stream.
pub struct RxSocket {
    inner: Box<dyn FrameReceiver>,
    stream: u16,
    stats: NetStats,
}

impl fmt::Debug for RxSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxSocket")
            .field("stream", &self.stream)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl RxSocket {
    /// Wrap a transport receiver.
    #[must_use]
    pub fn new(stream: u16, inner: Box<dyn FrameReceiver>) -> Self {
        Self {
            inner,
            stream,
            stats: NetStats::default(),
        }
    }

    /// Stream id.
    #[must_use]
    pub const fn stream(&self) -> u16 {
        self.stream
    }

    /// Raw counters.
    #[must_use]
    pub const fn stats(&self) -> NetStats {
        self.stats
    }

    /// Zero the counters.
    pub fn reset_stats(&mut self) {
        self.stats = NetStats::default();
    }

    /// One non-blocking receive into `buf`.
    pub fn receive(&mut self, buf: &mut [u8]) -> RxStatus {
        match self.inner.receive(buf) {
            Ok(Some(meta)) => {
                self.stats.frames += 1;
                RxStatus::Frame(meta)
            }
            Ok(None) => RxStatus::NoFrame,
            Err(err) => {
                self.stats.err += 1;
                trace!(stream = self.stream, %err, "receive failed");
                RxStatus::Error
            }
        }
    }
}

/// Transmitting side of a task.
pub struct TxSocket {
    inner: Box<dyn FrameTransmitter>,
    stream: u16,
    stats: NetStats,
}

impl fmt::Debug for TxSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxSocket")
            .field("stream", &self.stream)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl TxSocket {
    /// Wrap a transport transmitter.
    #[must_use]
    pub fn new(stream: u16, inner: Box<dyn FrameTransmitter>) -> Self {
        Self {
            inner,
            stream,
            stats: NetStats::default(),
        }
    }

    /// Stream id.
    #[must_use]
    pub const fn stream(&self) -> u16 {
        self.stream
    }

    /// Raw counters.
    #[must_use]
    pub const fn stats(&self) -> NetStats {
        self.stats
    }

    /// Zero the counters.
    pub fn reset_stats(&mut self) {
        self.stats = NetStats::default();
    }

    /// Send one complete frame.
    ///
    /// # Errors
    ///
    /// The transport's error; it is also counted.
    pub fn transmit(&mut self, frame: &[u8]) -> Result<(), NetError> {
        match self.inner.transmit(frame) {
            Ok(()) => {
                self.stats.frames += 1;
                Ok(())
            }
            Err(err) => {
                self.stats.err += 1;
                Err(err)
            }
        }
    }
}
