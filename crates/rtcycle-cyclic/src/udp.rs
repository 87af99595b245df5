//! UDP transport.
//!
//! Each stream is one UDP address. Receivers bind to it, transmitters send
//! to it from an ephemeral port. All sockets are non-blocking; receive
//! timestamps come from the task clock when the datagram is read.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

use rtcycle_scheduler::Clock;
use tracing::debug;

use crate::config::StreamTable;
use crate::error::NetError;
use crate::net::{FrameReceiver, FrameTransmitter, RxMeta, Transport};

/// [`Transport`] over non-blocking UDP sockets.
pub struct UdpTransport {
    streams: StreamTable,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("streams", &self.streams)
            .finish_non_exhaustive()
    }
}

impl UdpTransport {
    /// Transport for `streams`, timestamping with `clock`.
    #[must_use]
    pub fn new(streams: StreamTable, clock: Arc<dyn Clock>) -> Self {
        Self { streams, clock }
    }

    fn address(&self, stream: u16) -> Result<SocketAddr, NetError> {
        self.streams.get(stream).ok_or(NetError::UnknownStream(stream))
    }
}

impl Transport for UdpTransport {
    fn open_rx(&mut self, stream: u16) -> Result<Box<dyn FrameReceiver>, NetError> {
        let addr = self.address(stream)?;
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        debug!(stream, %addr, "udp receiver bound");
        Ok(Box::new(UdpReceiver {
            socket,
            clock: Arc::clone(&self.clock),
        }))
    }

    fn open_tx(&mut self, stream: u16) -> Result<Box<dyn FrameTransmitter>, NetError> {
        let addr = self.address(stream)?;
        let local = match addr {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(addr)?;
        socket.set_nonblocking(true)?;
        debug!(stream, %addr, "udp transmitter connected");
        Ok(Box::new(UdpTransmitter { socket }))
    }
}

/// Receiving half bound to a stream address.
pub struct UdpReceiver {
    socket: UdpSocket,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for UdpReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpReceiver")
            .field("socket", &self.socket)
            .field("clock", &self.clock.domain())
            .finish()
    }
}

impl FrameReceiver for UdpReceiver {
    fn receive(&mut self, buf: &mut [u8]) -> Result<Option<RxMeta>, NetError> {
        match self.socket.recv(buf) {
            Ok(len) => Ok(Some(RxMeta {
                len,
                timestamp_ns: self.clock.now_ns()?,
            })),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(NetError::Io(err)),
        }
    }
}

/// Sending half connected to a stream address.
#[derive(Debug)]
pub struct UdpTransmitter {
    socket: UdpSocket,
}

impl FrameTransmitter for UdpTransmitter {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), NetError> {
        let written = self.socket.send(frame)?;
        if written != frame.len() {
            return Err(NetError::ShortWrite {
                written,
                expected: frame.len(),
            });
        }
        Ok(())
    }
}
