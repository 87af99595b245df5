//! In-memory transport for cyclic tasks.
//!
//! [`MockTransport`] hands out receivers fed from per-stream queues and
//! transmitters that capture every frame, so task tests run on a real pool
//! without touching the network.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use rtcycle_cyclic::{FrameHeader, FrameReceiver, FrameTransmitter, NetError, RxMeta, Transport};

#[derive(Debug, Default)]
struct Wire {
    rx: HashMap<u16, VecDeque<(Vec<u8>, u64)>>,
    tx: HashMap<u16, Vec<Vec<u8>>>,
    opened_rx: Vec<u16>,
    opened_tx: Vec<u16>,
    unknown: Vec<u16>,
    fail_rx: Vec<u16>,
}

/// Shared-state transport. Clones observe the same queues.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    wire: Arc<Mutex<Wire>>,
}

impl MockTransport {
    /// Transport where every stream exists.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `stream` unknown to the transport.
    #[must_use]
    pub fn without_stream(self, stream: u16) -> Self {
        self.wire.lock().unknown.push(stream);
        self
    }

    /// Make receives on `stream` report a socket error.
    pub fn fail_receives(&self, stream: u16) {
        self.wire.lock().fail_rx.push(stream);
    }

    /// Queue `frame` on `stream`, received at `timestamp_ns`.
    pub fn push_rx(&self, stream: u16, frame: Vec<u8>, timestamp_ns: u64) {
        self.wire
            .lock()
            .rx
            .entry(stream)
            .or_default()
            .push_back((frame, timestamp_ns));
    }

    /// Frames not yet read on `stream`.
    #[must_use]
    pub fn pending_rx(&self, stream: u16) -> usize {
        self.wire.lock().rx.get(&stream).map_or(0, VecDeque::len)
    }

    /// Frames sent on `stream` so far.
    #[must_use]
    pub fn sent(&self, stream: u16) -> Vec<Vec<u8>> {
        self.wire.lock().tx.get(&stream).cloned().unwrap_or_default()
    }

    /// Receive streams opened, in order.
    #[must_use]
    pub fn opened_rx(&self) -> Vec<u16> {
        self.wire.lock().opened_rx.clone()
    }

    /// Transmit streams opened, in order.
    #[must_use]
    pub fn opened_tx(&self) -> Vec<u16> {
        self.wire.lock().opened_tx.clone()
    }

    fn check_known(&self, stream: u16) -> Result<(), NetError> {
        if self.wire.lock().unknown.contains(&stream) {
            return Err(NetError::UnknownStream(stream));
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    fn open_rx(&mut self, stream: u16) -> Result<Box<dyn FrameReceiver>, NetError> {
        self.check_known(stream)?;
        self.wire.lock().opened_rx.push(stream);
        Ok(Box::new(MockReceiver {
            stream,
            wire: Arc::clone(&self.wire),
        }))
    }

    fn open_tx(&mut self, stream: u16) -> Result<Box<dyn FrameTransmitter>, NetError> {
        self.check_known(stream)?;
        self.wire.lock().opened_tx.push(stream);
        Ok(Box::new(MockTransmitter {
            stream,
            wire: Arc::clone(&self.wire),
        }))
    }
}

#[derive(Debug)]
struct MockReceiver {
    stream: u16,
    wire: Arc<Mutex<Wire>>,
}

impl FrameReceiver for MockReceiver {
    fn receive(&mut self, buf: &mut [u8]) -> Result<Option<RxMeta>, NetError> {
        let mut wire = self.wire.lock();
        if wire.fail_rx.contains(&self.stream) {
            return Err(NetError::Io(std::io::Error::other("injected receive failure")));
        }
        let Some((frame, timestamp_ns)) = wire.rx.get_mut(&self.stream).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Ok(Some(RxMeta { len, timestamp_ns }))
    }
}

#[derive(Debug)]
struct MockTransmitter {
    stream: u16,
    wire: Arc<Mutex<Wire>>,
}

impl FrameTransmitter for MockTransmitter {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), NetError> {
        self.wire.lock().tx.entry(self.stream).or_default().push(frame.to_vec());
        Ok(())
    }
}

/// Encode a frame with the given header fields.
///
/// # Panics
///
/// If the payload does not fit a frame.
#[must_use]
pub fn frame(msg_id: u16, src_id: u16, sched_time: u64, payload: &[u8]) -> Vec<u8> {
    let header = FrameHeader::new(msg_id, src_id, sched_time, payload.len()).unwrap();
    let mut out = header.to_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}
