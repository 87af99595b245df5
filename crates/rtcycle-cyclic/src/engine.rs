//! Per-tick work of a cyclic task.
//!
//! [`TickEngine`] is the slot handler registered with the task's timer. It
//! runs entirely on the pool thread: check the timer, score the schedule,
//! drain the receive sockets, run the user cycle, time the tick and
//! periodically publish a report. Nothing here allocates after construction.

use std::sync::Arc;

use rtcycle_scheduler::{HandlerStatus, Readiness, SlotHandler, TimerError};
use rtcycle_stats::HistogramError;
use tracing::{debug, error, trace, warn};

use crate::config::PeerBinding;
use crate::frame::FrameHeader;
use crate::handler::{Cycle, CyclicHandler, RxMessage, TimerHealth, TxPath};
use crate::net::{RxSocket, RxStatus, TxSocket};
use crate::stats::{CyclicReport, PeerStats, TaskStats};
use crate::task::{TaskShared, TaskState};

/// Schedule error of a wakeup, saturated to 32 bits.
#[must_use]
pub fn sched_error(now_ns: u64, sched_ns: u64) -> i32 {
    let diff = i128::from(now_ns) - i128::from(sched_ns);
    i32::try_from(diff).unwrap_or(if diff < 0 { i32::MIN } else { i32::MAX })
}

fn signed_diff(a: u64, b: u64) -> i64 {
    let diff = i128::from(a) - i128::from(b);
    i64::try_from(diff).unwrap_or(if diff < 0 { i64::MIN } else { i64::MAX })
}

/// One receive socket with its peer and statistics.
#[derive(Debug)]
pub(crate) struct Peer {
    binding: PeerBinding,
    socket: RxSocket,
    stats: PeerStats,
}

impl Peer {
    pub(crate) fn new(binding: PeerBinding, socket: RxSocket) -> Result<Self, HistogramError> {
        Ok(Self {
            binding,
            socket,
            stats: PeerStats::new()?,
        })
    }
}

pub(crate) struct TickEngine<H> {
    shared: Arc<TaskShared>,
    handler: H,
    peers: Vec<Peer>,
    tx: Option<TxPath>,
    rx_buf: Box<[u8]>,
    stats: TaskStats,
    stats_valid: bool,
    next_report: u64,
}

impl<H: CyclicHandler> TickEngine<H> {
    pub(crate) fn new(
        shared: Arc<TaskShared>,
        handler: H,
        peers: Vec<Peer>,
        tx: Option<TxSocket>,
    ) -> Result<Self, HistogramError> {
        let packet_size = shared.params.packet_size;
        let next_report = shared.params.report_interval();
        Ok(Self {
            handler,
            peers,
            tx: tx.map(|socket| TxPath::new(socket, packet_size)),
            rx_buf: vec![0; packet_size].into_boxed_slice(),
            stats: TaskStats::new()?,
            stats_valid: false,
            next_report,
            shared,
        })
    }

    pub(crate) fn tick(&mut self) -> HandlerStatus {
        if self.shared.state() != TaskState::Running {
            return HandlerStatus::Continue;
        }
        if self.shared.take_reset_request() {
            self.clear_stats();
        }

        let now = match self.shared.clock.now_ns() {
            Ok(now) => now,
            Err(err) => return self.timer_fault(err.into()),
        };
        let elapsed = match self.shared.timer.check(now) {
            Ok(0) => {
                trace!(task = self.shared.id, now, "spurious wake");
                return HandlerStatus::Continue;
            }
            Ok(elapsed) => elapsed,
            Err(err) => return self.timer_fault(err),
        };

        let scored = self.stats_valid;
        let sched_time = self.advance(elapsed, now);
        self.receive(sched_time);

        let mut cycle = Cycle::new(self.shared.id, sched_time, now, TimerHealth::Ok, self.tx.as_mut());
        self.handler.on_cycle(&mut cycle);

        if scored {
            self.finish(now, sched_time);
        }
        self.maybe_report(sched_time);
        HandlerStatus::Continue
    }

    /// Count the fault, tell the handler, then stop and re-arm at a fresh
    /// aligned start.
    fn timer_fault(&mut self, err: TimerError) -> HandlerStatus {
        let counters = &mut self.stats.counters;
        if err.is_discontinuity() {
            counters.clock_discont += 1;
        } else {
            counters.clock_err += 1;
        }
        warn!(task = self.shared.id, %err, "timer fault, restarting task");

        let sched_time = self.shared.sched_time();
        let mut cycle = Cycle::new(self.shared.id, sched_time, 0, TimerHealth::Fault, None);
        self.handler.on_cycle(&mut cycle);

        match self.shared.restart() {
            Ok(true) => debug!(task = self.shared.id, "task restarted"),
            Ok(false) => debug!(task = self.shared.id, "task no longer running, not restarted"),
            Err(err) => error!(task = self.shared.id, %err, "restart failed, task stays stopped"),
        }
        HandlerStatus::Error
    }

    /// Move the scheduled time forward and score the wakeup against it.
    fn advance(&mut self, elapsed: u64, now: u64) -> u64 {
        let period = self.shared.params.period_ns;
        let sched_time = self.shared.advance_sched_time(elapsed.saturating_mul(period));
        let counters = &mut self.stats.counters;
        counters.sched = counters.sched.saturating_add(elapsed);

        if !self.stats_valid {
            // First tick after creation: baseline only.
            self.stats_valid = true;
            return sched_time;
        }

        let err = sched_error(now, sched_time);
        let abs = u64::from(err.unsigned_abs());
        if err > 0 && abs > self.shared.params.late_threshold_ns {
            counters.late += 1;
        }
        if err < 0 {
            counters.early += 1;
        }
        if elapsed > 1 {
            counters.missed += elapsed - 1;
        }
        self.stats.sched_err.record(i64::from(err.unsigned_abs()));
        self.stats.sched_err_max = self.stats.sched_err_max.max(abs);
        self.shared.monitor.record_sched_err(abs);
        sched_time
    }

    fn receive(&mut self, sched_time: u64) {
        let expected = sched_time.saturating_sub(self.shared.params.transfer_time_ns);
        let Self {
            peers,
            rx_buf,
            handler,
            shared,
            ..
        } = self;

        for (index, peer) in peers.iter_mut().enumerate() {
            let mut seen = false;
            loop {
                let meta = match peer.socket.receive(rx_buf) {
                    RxStatus::Frame(meta) => meta,
                    RxStatus::NoFrame => {
                        if !seen {
                            peer.stats.err_underflow += 1;
                        }
                        peer.stats.link_up = false;
                        break;
                    }
                    RxStatus::Error => {
                        peer.stats.link_up = false;
                        break;
                    }
                };
                seen = true;

                let frame = rx_buf.get(..meta.len).unwrap_or_default();
                let (header, payload) = match FrameHeader::decode(frame) {
                    Ok(decoded) => decoded,
                    Err(err) => {
                        peer.stats.err_format += 1;
                        trace!(task = shared.id, peer = peer.binding.peer_id, %err, "malformed frame");
                        continue;
                    }
                };
                if header.sched_time != expected {
                    peer.stats.err_ts += 1;
                    trace!(
                        task = shared.id,
                        peer = peer.binding.peer_id,
                        got = header.sched_time,
                        expected,
                        "frame from another period"
                    );
                    continue;
                }
                if header.src_id != peer.binding.peer_id {
                    peer.stats.err_id += 1;
                    trace!(task = shared.id, expected = peer.binding.peer_id, got = header.src_id, "foreign source id");
                    continue;
                }

                let latency = signed_diff(meta.timestamp_ns, header.sched_time);
                peer.stats.latency.record(latency);
                shared.monitor.record_latency(index, latency.unsigned_abs());
                peer.stats.valid_frames += 1;
                peer.stats.link_up = true;
                handler.on_receive(&RxMessage {
                    peer: index,
                    msg_id: header.msg_id,
                    src_id: header.src_id,
                    sched_time: header.sched_time,
                    latency_ns: latency,
                    payload,
                });
                break;
            }
        }
    }

    fn finish(&mut self, wake: u64, sched_time: u64) {
        let Ok(end) = self.shared.clock.now_ns() else {
            return;
        };
        self.stats.proc_time.record(signed_diff(end, wake));
        self.stats.total_time.record(signed_diff(end, sched_time));
    }

    fn maybe_report(&mut self, sched_time: u64) {
        let interval = self.shared.params.report_interval();
        let sched = self.stats.counters.sched;
        if interval == 0 || sched < self.next_report {
            return;
        }
        self.next_report = (sched / interval).saturating_add(1).saturating_mul(interval);

        let report = self.report(sched_time);
        if self.shared.reports.publish(report).is_ok() {
            self.stats.reset_running();
            for peer in &mut self.peers {
                peer.stats.reset_running();
            }
        } else {
            trace!(task = self.shared.id, "previous report unread, keeping window");
        }
    }

    fn report(&self, sched_time: u64) -> CyclicReport {
        CyclicReport::new(
            self.shared.id,
            sched_time,
            &self.stats,
            self.tx.as_ref().map_or(0, |tx| tx.oversized),
            self.peers
                .iter()
                .map(|p| p.stats.report(p.binding.peer_id, p.socket.stream(), p.socket.stats())),
            self.tx.as_ref().map(|tx| tx.socket.stats()),
        )
    }

    fn clear_stats(&mut self) {
        self.stats.clear();
        for peer in &mut self.peers {
            peer.stats.clear();
            peer.socket.reset_stats();
        }
        if let Some(tx) = &mut self.tx {
            tx.oversized = 0;
            tx.socket.reset_stats();
        }
        self.shared.monitor.clear();
        self.next_report = self.shared.params.report_interval();
        debug!(task = self.shared.id, "statistics cleared");
    }
}

impl<H: CyclicHandler> SlotHandler for TickEngine<H> {
    fn on_ready(&mut self, _readiness: Readiness) -> HandlerStatus {
        self.tick()
    }

    fn on_timeout(&mut self) {
        if self.shared.state() == TaskState::Running {
            self.stats.counters.timeout += 1;
            warn!(task = self.shared.id, "no tick within the timeout budget");
        }
    }
}
