//! Task and traffic statistics, and the reports built from them.
//!
//! The tick engine owns the working state ([`TaskStats`], [`PeerStats`]) and
//! periodically copies it into a [`CyclicReport`] handed to a reader through a
//! snapshot cell. Peak values additionally go to atomic gauges ([`Monitor`])
//! that a monitoring reader can drain at any time.

use rtcycle_stats::{Histogram, HistogramError, MaxGauge, MinGauge, RunningStats, StatsSummary};
use tracing::info;

use crate::config::MAX_PEERS;
use crate::net::NetStats;

/// Buckets of the schedule error histogram.
pub const SCHED_ERR_BUCKETS: usize = 100;
/// Width of one schedule error bucket.
pub const SCHED_ERR_BUCKET_NS: u64 = 10_000;
/// Buckets of the processing time, total time and latency histograms.
pub const TIME_BUCKETS: usize = 100;
/// Width of one processing time, total time or latency bucket.
pub const TIME_BUCKET_NS: u64 = 1_000;

/// Scheduling counters of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounters {
    /// Scheduled periods, including missed ones.
    pub sched: u64,
    /// Ticks that woke before their scheduled time.
    pub early: u64,
    /// Ticks whose schedule error exceeded the late threshold.
    pub late: u64,
    /// Periods skipped by catch-up.
    pub missed: u64,
    /// Silences longer than the tick timeout.
    pub timeout: u64,
    /// Clock discontinuities.
    pub clock_discont: u64,
    /// Clock read or timer I/O failures.
    pub clock_err: u64,
}

/// Running statistics with a histogram of the same samples.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timing {
    stats: RunningStats,
    hist: Histogram,
}

impl Timing {
    const fn new(buckets: usize, width: u64) -> Result<Self, HistogramError> {
        match Histogram::new(buckets, width) {
            Ok(hist) => Ok(Self {
                stats: RunningStats::new(),
                hist,
            }),
            Err(err) => Err(err),
        }
    }

    /// Record `value`; the histogram sees its magnitude.
    pub(crate) fn record(&mut self, value: i64) {
        self.stats.update(value);
        self.hist.record(value.unsigned_abs());
    }

    pub(crate) fn report(&self) -> TimingReport {
        TimingReport {
            summary: self.stats.summary(),
            histogram: self.hist,
        }
    }

    fn clear(&mut self) {
        self.stats.clear();
        self.hist.reset();
    }
}

/// Summary and histogram of one measured quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingReport {
    /// Window statistics.
    pub summary: StatsSummary,
    /// Distribution since the last clear.
    pub histogram: Histogram,
}

/// Working statistics of the task itself.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TaskStats {
    pub(crate) counters: TaskCounters,
    pub(crate) sched_err: Timing,
    pub(crate) sched_err_max: u64,
    pub(crate) proc_time: Timing,
    pub(crate) total_time: Timing,
}

impl TaskStats {
    pub(crate) const fn new() -> Result<Self, HistogramError> {
        let sched_err = match Timing::new(SCHED_ERR_BUCKETS, SCHED_ERR_BUCKET_NS) {
            Ok(t) => t,
            Err(err) => return Err(err),
        };
        let time = match Timing::new(TIME_BUCKETS, TIME_BUCKET_NS) {
            Ok(t) => t,
            Err(err) => return Err(err),
        };
        Ok(Self {
            counters: TaskCounters {
                sched: 0,
                early: 0,
                late: 0,
                missed: 0,
                timeout: 0,
                clock_discont: 0,
                clock_err: 0,
            },
            sched_err,
            sched_err_max: 0,
            proc_time: time,
            total_time: time,
        })
    }

    /// Start a new window; counters, histograms and extremes stay.
    pub(crate) fn reset_running(&mut self) {
        self.sched_err.stats.reset();
        self.proc_time.stats.reset();
        self.total_time.stats.reset();
    }

    /// Forget everything.
    pub(crate) fn clear(&mut self) {
        self.counters = TaskCounters::default();
        self.sched_err.clear();
        self.sched_err_max = 0;
        self.proc_time.clear();
        self.total_time.clear();
    }

    fn report(&self, tx_oversized: u64) -> TaskReport {
        TaskReport {
            counters: self.counters,
            tx_oversized,
            sched_err: self.sched_err.report(),
            sched_err_max: self.sched_err_max,
            proc_time: self.proc_time.report(),
            total_time: self.total_time.report(),
        }
    }
}

/// Working statistics of one receive socket.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PeerStats {
    pub(crate) valid_frames: u64,
    pub(crate) err_id: u64,
    pub(crate) err_ts: u64,
    pub(crate) err_underflow: u64,
    pub(crate) err_format: u64,
    pub(crate) link_up: bool,
    pub(crate) latency: Timing,
}

impl PeerStats {
    pub(crate) const fn new() -> Result<Self, HistogramError> {
        match Timing::new(TIME_BUCKETS, TIME_BUCKET_NS) {
            Ok(latency) => Ok(Self {
                valid_frames: 0,
                err_id: 0,
                err_ts: 0,
                err_underflow: 0,
                err_format: 0,
                link_up: false,
                latency,
            }),
            Err(err) => Err(err),
        }
    }

    pub(crate) fn reset_running(&mut self) {
        self.latency.stats.reset();
    }

    pub(crate) fn clear(&mut self) {
        self.valid_frames = 0;
        self.err_id = 0;
        self.err_ts = 0;
        self.err_underflow = 0;
        self.err_format = 0;
        self.latency.clear();
    }

    pub(crate) fn report(&self, peer_id: u16, stream: u16, net: NetStats) -> PeerReport {
        PeerReport {
            peer_id,
            stream,
            valid_frames: self.valid_frames,
            err_id: self.err_id,
            err_ts: self.err_ts,
            err_underflow: self.err_underflow,
            err_format: self.err_format,
            link_up: self.link_up,
            latency: self.latency.report(),
            net,
        }
    }
}

/// Task part of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    /// Scheduling counters.
    pub counters: TaskCounters,
    /// Transmits refused for not fitting the send buffer.
    pub tx_oversized: u64,
    /// Absolute schedule error.
    pub sched_err: TimingReport,
    /// Largest absolute schedule error.
    pub sched_err_max: u64,
    /// Wakeup to end of tick.
    pub proc_time: TimingReport,
    /// Scheduled time to end of tick.
    pub total_time: TimingReport,
}

/// Receive socket part of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerReport {
    /// Expected source id.
    pub peer_id: u16,
    /// Stream id.
    pub stream: u16,
    /// Frames accepted.
    pub valid_frames: u64,
    /// Frames rejected for a wrong source id.
    pub err_id: u64,
    /// Frames rejected for a wrong scheduled time.
    pub err_ts: u64,
    /// Ticks that found nothing queued.
    pub err_underflow: u64,
    /// Frames too short for their header.
    pub err_format: u64,
    /// A frame was accepted on the last tick.
    pub link_up: bool,
    /// Receive time minus the sender's scheduled time.
    pub latency: TimingReport,
    /// Raw socket counters.
    pub net: NetStats,
}

/// Statistics of one task for one reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclicReport {
    /// Task id.
    pub task_id: u16,
    /// Scheduled time of the tick that built the report.
    pub sched_time: u64,
    /// Scheduling statistics.
    pub task: TaskReport,
    peers: [Option<PeerReport>; MAX_PEERS],
    /// Raw counters of the transmit socket.
    pub tx: Option<NetStats>,
}

impl CyclicReport {
    pub(crate) fn new(
        task_id: u16,
        sched_time: u64,
        stats: &TaskStats,
        tx_oversized: u64,
        peers: impl IntoIterator<Item = PeerReport>,
        tx: Option<NetStats>,
    ) -> Self {
        let mut slots = [None; MAX_PEERS];
        for (slot, peer) in slots.iter_mut().zip(peers) {
            *slot = Some(peer);
        }
        Self {
            task_id,
            sched_time,
            task: stats.report(tx_oversized),
            peers: slots,
            tx,
        }
    }

    /// Receive sockets in receive order.
    pub fn peers(&self) -> impl Iterator<Item = &PeerReport> {
        self.peers.iter().flatten()
    }

    /// Receive socket `index`.
    #[must_use]
    pub fn peer(&self, index: usize) -> Option<&PeerReport> {
        self.peers.get(index).and_then(Option::as_ref)
    }

    /// Print the report.
    pub fn log(&self) {
        let task = self.task_id;
        let c = &self.task.counters;
        info!(
            task,
            sched = c.sched,
            early = c.early,
            late = c.late,
            missed = c.missed,
            timeout = c.timeout,
            clock_discont = c.clock_discont,
            clock_err = c.clock_err,
            tx_oversized = self.task.tx_oversized,
            "cyclic task stats"
        );
        info!(task, max = self.task.sched_err_max, "  sched_err  {}", self.task.sched_err.summary);
        info!(task, "  sched_err  hist {}", self.task.sched_err.histogram);
        info!(task, "  proc_time  {}", self.task.proc_time.summary);
        info!(task, "  proc_time  hist {}", self.task.proc_time.histogram);
        info!(task, "  total_time {}", self.task.total_time.summary);
        info!(task, "  total_time hist {}", self.task.total_time.histogram);

        for peer in self.peers() {
            info!(
                task,
                peer = peer.peer_id,
                stream = peer.stream,
                valid = peer.valid_frames,
                err_id = peer.err_id,
                err_ts = peer.err_ts,
                err_underflow = peer.err_underflow,
                err_format = peer.err_format,
                link = peer.link_up,
                frames = peer.net.frames,
                net_err = peer.net.err,
                "  rx socket"
            );
            info!(task, peer = peer.peer_id, "    latency {}", peer.latency.summary);
            info!(task, peer = peer.peer_id, "    latency hist {}", peer.latency.histogram);
        }
        if let Some(tx) = self.tx {
            info!(task, frames = tx.frames, net_err = tx.err, "  tx socket");
        }
    }
}

/// Latency extremes of one receive socket since the last read-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyPeak {
    /// Smallest latency, `None` without frames.
    pub min: Option<u64>,
    /// Largest latency.
    pub max: u64,
}

/// Result of [`crate::CyclicTask::monitoring`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoringSnapshot {
    /// Largest absolute schedule error since the last read-out.
    pub sched_err_max: u64,
    /// Per receive socket, in receive order.
    pub latency: Vec<LatencyPeak>,
}

/// Peak gauges written by the tick and drained by a monitoring reader.
#[derive(Debug, Default)]
pub(crate) struct Monitor {
    sched_err_max: MaxGauge,
    latency_min: [MinGauge; MAX_PEERS],
    latency_max: [MaxGauge; MAX_PEERS],
}

impl Monitor {
    pub(crate) fn record_sched_err(&self, abs_err: u64) {
        self.sched_err_max.record(abs_err);
    }

    pub(crate) fn record_latency(&self, peer: usize, latency: u64) {
        if let Some(min) = self.latency_min.get(peer) {
            min.record(latency);
        }
        if let Some(max) = self.latency_max.get(peer) {
            max.record(latency);
        }
    }

    /// Drop every peak without reading it out.
    pub(crate) fn clear(&self) {
        self.sched_err_max.take();
        for (min, max) in self.latency_min.iter().zip(&self.latency_max) {
            min.take();
            max.take();
        }
    }

    pub(crate) fn take(&self, peers: usize) -> MonitoringSnapshot {
        MonitoringSnapshot {
            sched_err_max: self.sched_err_max.take(),
            latency: self
                .latency_min
                .iter()
                .zip(&self.latency_max)
                .take(peers)
                .map(|(min, max)| LatencyPeak {
                    min: min.take(),
                    max: max.take(),
                })
                .collect(),
        }
    }
}
