//! Cyclic task lifecycle.
//!
//! ```text
//! register ──► Registered ──start──► Running ──stop──► Stopped
//!                                      ▲                  │
//!                                      └──────start───────┘
//! deregister (any state) ──► Deregistered
//! ```
//!
//! Starting aligns the first tick to the period grid one to one and a half
//! seconds ahead, plus the task's phase offset. A clock fault on the tick
//! thread stops and restarts the task through the same path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use parking_lot::Mutex;
use rtcycle_scheduler::{Clock, ThreadPool, Timer};
use rtcycle_stats::{NSEC_PER_SEC, SnapshotCell};
use tracing::{debug, info, warn};

use crate::config::{TaskDescriptor, TaskParams, is_valid_period};
use crate::engine::{Peer, TickEngine};
use crate::error::{NetError, TaskError};
use crate::handler::CyclicHandler;
use crate::net::{RxSocket, Transport, TxSocket};
use crate::stats::{CyclicReport, Monitor, MonitoringSnapshot};

/// Lifecycle state of a [`CyclicTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Sockets and timer slot exist; the timer is not armed.
    Registered,
    /// The timer is armed and ticks run.
    Running,
    /// Disarmed; can be started again.
    Stopped,
    /// Sockets closed and timer slot released.
    Deregistered,
}

impl TaskState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Registered => 0,
            Self::Running => 1,
            Self::Stopped => 2,
            Self::Deregistered => 3,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Registered,
            1 => Self::Running,
            2 => Self::Stopped,
            _ => Self::Deregistered,
        }
    }
}

/// First tick time for a start at `now_ns`.
///
/// The next full second after `now + 0.5 s`, snapped to the period grid, plus
/// `offset_ns`.
#[must_use]
pub const fn aligned_start(now_ns: u64, period_ns: u64, offset_ns: u64) -> u64 {
    let second = (now_ns.saturating_add(NSEC_PER_SEC / 2) / NSEC_PER_SEC + 1).saturating_mul(NSEC_PER_SEC);
    let grid = if period_ns == 0 { second } else { second / period_ns * period_ns };
    grid.saturating_add(offset_ns)
}

/// State shared between the owner and the tick engine.
pub(crate) struct TaskShared {
    pub(crate) id: u16,
    pub(crate) params: TaskParams,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) timer: Arc<Timer>,
    pub(crate) reports: SnapshotCell<CyclicReport>,
    pub(crate) monitor: Monitor,
    sched_time: AtomicU64,
    state: AtomicU8,
    reset_requested: AtomicBool,
    // Serializes state transitions that also touch the timer.
    lifecycle: Mutex<()>,
}

impl TaskShared {
    pub(crate) fn new(descriptor: &TaskDescriptor, clock: Arc<dyn Clock>, timer: Arc<Timer>) -> Self {
        Self {
            id: descriptor.id,
            params: descriptor.params,
            clock,
            timer,
            reports: SnapshotCell::new(),
            monitor: Monitor::default(),
            sched_time: AtomicU64::new(0),
            state: AtomicU8::new(TaskState::Registered.as_u8()),
            reset_requested: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: TaskState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn sched_time(&self) -> u64 {
        self.sched_time.load(Ordering::Relaxed)
    }

    pub(crate) fn advance_sched_time(&self, delta: u64) -> u64 {
        let next = self.sched_time().saturating_add(delta);
        self.sched_time.store(next, Ordering::Relaxed);
        next
    }

    pub(crate) fn request_reset(&self) {
        self.reset_requested.store(true, Ordering::Release);
    }

    pub(crate) fn take_reset_request(&self) -> bool {
        self.reset_requested.swap(false, Ordering::AcqRel)
    }

    /// Arm a registered or stopped task.
    pub(crate) fn start(&self) -> Result<(), TaskError> {
        let _guard = self.lifecycle.lock();
        match self.state() {
            TaskState::Registered | TaskState::Stopped => self.arm(),
            state => Err(TaskError::InvalidState { op: "start", state }),
        }
    }

    /// Disarm a running task; a no-op unless running.
    pub(crate) fn stop(&self) -> Result<(), TaskError> {
        let _guard = self.lifecycle.lock();
        match self.state() {
            TaskState::Running => {
                self.set_state(TaskState::Stopped);
                self.timer.stop()?;
                Ok(())
            }
            TaskState::Stopped | TaskState::Registered => Ok(()),
            state @ TaskState::Deregistered => Err(TaskError::InvalidState { op: "stop", state }),
        }
    }

    /// Stop and re-arm at a fresh aligned start, if still running.
    ///
    /// Returns `false` when a concurrent stop or deregistration got there
    /// first; the task is then left alone.
    pub(crate) fn restart(&self) -> Result<bool, TaskError> {
        let _guard = self.lifecycle.lock();
        if self.state() != TaskState::Running {
            return Ok(false);
        }
        self.set_state(TaskState::Stopped);
        if let Err(err) = self.timer.stop() {
            warn!(task = self.id, %err, "stop before restart failed");
        }
        self.arm().map(|()| true)
    }

    /// Mark deregistered. Returns `false` if it already was.
    pub(crate) fn retire(&self) -> bool {
        let _guard = self.lifecycle.lock();
        if self.state() == TaskState::Deregistered {
            return false;
        }
        self.set_state(TaskState::Deregistered);
        true
    }

    /// Arm the timer at a freshly aligned start. Callers hold `lifecycle`.
    fn arm(&self) -> Result<(), TaskError> {
        let period = self.params.period_ns;
        if !is_valid_period(period) {
            return Err(TaskError::InvalidPeriod(period));
        }
        let now = self.clock.now_ns()?;
        let start = aligned_start(now, period, self.params.offset_ns);
        self.sched_time.store(start.saturating_sub(period), Ordering::Relaxed);
        self.timer.start(start, period)?;
        self.set_state(TaskState::Running);
        debug!(task = self.id, start, period, "task armed");
        Ok(())
    }
}

/// A periodic task bound to a timer slot, its sockets and a handler.
///
/// Dropping a task that is still registered deregisters it.
pub struct CyclicTask {
    shared: Arc<TaskShared>,
    peers: usize,
}

impl std::fmt::Debug for CyclicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CyclicTask")
            .field("id", &self.shared.id)
            .field("state", &self.shared.state())
            .field("thread", &self.shared.timer.thread_index())
            .finish_non_exhaustive()
    }
}

impl CyclicTask {
    /// Open the task's sockets, create its timer and claim a slot for it.
    ///
    /// The task is left in [`TaskState::Registered`]; call
    /// [`CyclicTask::start`] to arm it.
    ///
    /// # Errors
    ///
    /// [`TaskError::TooManyPeers`], [`TaskError::UnknownStream`],
    /// [`TaskError::Net`] or [`TaskError::Timer`]. Sockets opened before the
    /// failure are closed again.
    pub fn register<H: CyclicHandler>(
        pool: &ThreadPool,
        descriptor: &TaskDescriptor,
        transport: &mut dyn Transport,
        clock: Arc<dyn Clock>,
        handler: H,
    ) -> Result<Self, TaskError> {
        descriptor.validate()?;
        let params = &descriptor.params;

        let peers = descriptor
            .active_peers()
            .iter()
            .map(|binding| -> Result<Peer, TaskError> {
                let rx = transport.open_rx(binding.stream).map_err(|err| stream_error(binding.stream, err))?;
                Ok(Peer::new(*binding, RxSocket::new(binding.stream, rx))?)
            })
            .collect::<Result<Vec<_>, TaskError>>()?;
        let tx = descriptor
            .tx_stream
            .map(|stream| {
                transport
                    .open_tx(stream)
                    .map(|inner| TxSocket::new(stream, inner))
                    .map_err(|err| stream_error(stream, err))
            })
            .transpose()?;

        let timer = Arc::new(Timer::new(params.timer, params.clock, params.timer_options)?);
        let shared = Arc::new(TaskShared::new(descriptor, clock, Arc::clone(&timer)));
        let engine = TickEngine::new(Arc::clone(&shared), handler, peers, tx)?;
        timer.attach_with_timeout(pool, params.capabilities, params.tick_timeout, engine)?;

        info!(
            task = descriptor.id,
            role = ?descriptor.role,
            period_ns = params.period_ns,
            offset_ns = params.offset_ns,
            peers = descriptor.num_peers,
            thread = ?timer.thread_index(),
            "cyclic task registered"
        );
        Ok(Self {
            shared,
            peers: descriptor.num_peers,
        })
    }

    /// Task id.
    #[must_use]
    pub fn id(&self) -> u16 {
        self.shared.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.shared.state()
    }

    /// Scheduled time of the latest tick.
    #[must_use]
    pub fn sched_time(&self) -> u64 {
        self.shared.sched_time()
    }

    /// Thread running the task's ticks.
    #[must_use]
    pub fn thread_index(&self) -> Option<usize> {
        self.shared.timer.thread_index()
    }

    /// Arm the timer at the next aligned start.
    ///
    /// # Errors
    ///
    /// [`TaskError::InvalidState`] unless registered or stopped,
    /// [`TaskError::InvalidPeriod`], [`TaskError::Clock`] or
    /// [`TaskError::Timer`]. A failed start changes nothing.
    pub fn start(&self) -> Result<(), TaskError> {
        self.shared.start()
    }

    /// Disarm the timer; an in-flight tick completes. Stopping a stopped task
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// [`TaskError::InvalidState`] after deregistration, or [`TaskError::Timer`].
    pub fn stop(&self) -> Result<(), TaskError> {
        self.shared.stop()
    }

    /// Disarm, release the timer slot and close the sockets.
    ///
    /// # Errors
    ///
    /// [`TaskError::Timer`] if disarming failed; the slot is released anyway.
    pub fn deregister(self) -> Result<(), TaskError> {
        self.release()
    }

    fn release(&self) -> Result<(), TaskError> {
        if !self.shared.retire() {
            return Ok(());
        }
        let result = self.shared.timer.exit();
        debug!(task = self.shared.id, "cyclic task deregistered");
        result.map_err(TaskError::from)
    }

    /// Clear every counter, statistic and histogram on the next tick.
    pub fn request_stats_reset(&self) {
        self.shared.request_reset();
    }

    /// Take the pending report, if a reporting period has completed since the
    /// last call.
    #[must_use]
    pub fn take_report(&self) -> Option<CyclicReport> {
        self.shared.reports.take()
    }

    /// Read and reset the peak schedule error and per-socket latency extremes.
    #[must_use]
    pub fn monitoring(&self) -> MonitoringSnapshot {
        self.shared.monitor.take(self.peers)
    }
}

impl Drop for CyclicTask {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(task = self.shared.id, %err, "deregistration on drop failed");
        }
    }
}

fn stream_error(stream: u16, err: NetError) -> TaskError {
    match err {
        NetError::UnknownStream(_) => TaskError::UnknownStream(stream),
        other => TaskError::Net(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_start() {
        let second = NSEC_PER_SEC;
        assert_eq!(aligned_start(0, 2_000_000, 0), second);
        // 0.4 s rounds to the next second, 0.6 s skips one more.
        assert_eq!(aligned_start(400_000_000, 2_000_000, 0), second);
        assert_eq!(aligned_start(600_000_000, 2_000_000, 0), 2 * second);
        assert_eq!(aligned_start(5 * second, 2_000_000, 1_000_000), 6 * second + 1_000_000);
    }

    #[test]
    fn test_state_encoding() {
        for state in [
            TaskState::Registered,
            TaskState::Running,
            TaskState::Stopped,
            TaskState::Deregistered,
        ] {
            assert_eq!(TaskState::from_u8(state.as_u8()), state);
        }
    }
}
