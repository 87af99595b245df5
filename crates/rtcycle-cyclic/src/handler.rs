//! User callbacks of a cyclic task.

use crate::error::TransmitError;
use crate::frame::{FrameHeader, HEADER_LEN};
use crate::net::TxSocket;

/// Whether the timer delivered a regular tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerHealth {
    /// Regular tick.
    Ok,
    /// The clock or timer failed; the task restarts after this call.
    Fault,
}

/// A validated frame from a peer.
#[derive(Debug, Clone, Copy)]
pub struct RxMessage<'a> {
    /// Index of the peer in the task's receive order.
    pub peer: usize,
    /// Application message id.
    pub msg_id: u16,
    /// Sending task id.
    pub src_id: u16,
    /// Sender's scheduled time.
    pub sched_time: u64,
    /// Receive time minus `sched_time`.
    pub latency_ns: i64,
    /// Frame payload.
    pub payload: &'a [u8],
}

/// Code run by a task on its thread.
pub trait CyclicHandler: Send + 'static {
    /// A peer frame passed validation. Runs before [`CyclicHandler::on_cycle`]
    /// of the same tick.
    fn on_receive(&mut self, _msg: &RxMessage<'_>) {}

    /// Once per tick, and once with [`TimerHealth::Fault`] before a restart.
    fn on_cycle(&mut self, cycle: &mut Cycle<'_>);
}

impl<F> CyclicHandler for F
where
    F: FnMut(&mut Cycle<'_>) + Send + 'static,
{
    fn on_cycle(&mut self, cycle: &mut Cycle<'_>) {
        self(cycle);
    }
}

/// Send side owned by the tick engine.
#[derive(Debug)]
pub(crate) struct TxPath {
    pub(crate) socket: TxSocket,
    pub(crate) buf: Box<[u8]>,
    pub(crate) oversized: u64,
}

impl TxPath {
    pub(crate) fn new(socket: TxSocket, packet_size: usize) -> Self {
        Self {
            socket,
            buf: vec![0; packet_size].into_boxed_slice(),
            oversized: 0,
        }
    }
}

/// View of the current tick handed to [`CyclicHandler::on_cycle`].
#[derive(Debug)]
pub struct Cycle<'a> {
    task_id: u16,
    sched_time: u64,
    wake_time: u64,
    health: TimerHealth,
    tx: Option<&'a mut TxPath>,
}

impl<'a> Cycle<'a> {
    pub(crate) const fn new(
        task_id: u16,
        sched_time: u64,
        wake_time: u64,
        health: TimerHealth,
        tx: Option<&'a mut TxPath>,
    ) -> Self {
        Self {
            task_id,
            sched_time,
            wake_time,
            health,
            tx,
        }
    }

    /// Id of the running task.
    #[must_use]
    pub const fn task_id(&self) -> u16 {
        self.task_id
    }

    /// Scheduled time of this period.
    #[must_use]
    pub const fn sched_time(&self) -> u64 {
        self.sched_time
    }

    /// Clock reading at wakeup.
    #[must_use]
    pub const fn wake_time(&self) -> u64 {
        self.wake_time
    }

    /// Timer state for this call.
    #[must_use]
    pub const fn health(&self) -> TimerHealth {
        self.health
    }

    /// Send `payload` behind a header stamped with this period's scheduled
    /// time.
    ///
    /// # Errors
    ///
    /// [`TransmitError::Oversized`] when header and payload reach the buffer
    /// size (counted, nothing sent), [`TransmitError::NoTransmitter`], or the
    /// socket's error.
    pub fn transmit(&mut self, msg_id: u16, payload: &[u8]) -> Result<(), TransmitError> {
        let Some(tx) = self.tx.as_deref_mut() else {
            return Err(TransmitError::NoTransmitter);
        };
        let len = HEADER_LEN + payload.len();
        let capacity = tx.buf.len();
        if len >= capacity {
            tx.oversized += 1;
            return Err(TransmitError::Oversized { len, capacity });
        }
        let header = FrameHeader::new(msg_id, self.task_id, self.sched_time, payload.len())?;
        let written = header.encode_into(payload, &mut tx.buf)?;
        let frame = tx.buf.get(..written).unwrap_or_default();
        tx.socket.transmit(frame)?;
        Ok(())
    }
}
