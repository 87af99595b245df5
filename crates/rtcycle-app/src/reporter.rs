//! Once-a-second statistics output on the pool's statistics thread.

use std::sync::Arc;

use rtcycle_cyclic::CyclicTask;
use rtcycle_scheduler::{
    Capabilities, Clock, ClockDomain, HandlerStatus, Readiness, SlotHandler, SystemClock, ThreadPool, Timer,
    TimerError, TimerKind, TimerOptions,
};
use rtcycle_stats::NSEC_PER_SEC;
use tracing::{info, warn};

/// Timer slot that logs thread snapshots, task reports and monitoring peaks.
pub struct Reporter {
    timer: Arc<Timer>,
    pool: Arc<ThreadPool>,
    tasks: Vec<Arc<CyclicTask>>,
}

impl Reporter {
    /// Attach a one-second hardware timer on a [`Capabilities::STATS`] thread.
    ///
    /// Returns the timer; [`Timer::exit`] stops reporting and drops the
    /// reporter's task references.
    pub fn spawn(pool: &Arc<ThreadPool>, tasks: Vec<Arc<CyclicTask>>) -> Result<Arc<Timer>, TimerError> {
        let timer = Arc::new(Timer::new(TimerKind::Hardware, ClockDomain::Monotonic, TimerOptions::default())?);
        let reporter = Self {
            timer: Arc::clone(&timer),
            pool: Arc::clone(pool),
            tasks,
        };
        timer.attach(pool, Capabilities::STATS, reporter)?;
        let now = SystemClock::monotonic().now_ns()?;
        timer.start(now.saturating_add(NSEC_PER_SEC), NSEC_PER_SEC)?;
        Ok(timer)
    }
}

impl SlotHandler for Reporter {
    fn on_ready(&mut self, _readiness: Readiness) -> HandlerStatus {
        match self.timer.check(0) {
            Ok(0) => return HandlerStatus::Continue,
            Ok(_) => {}
            Err(err) => {
                warn!(%err, "statistics timer failed");
                return HandlerStatus::Error;
            }
        }

        for snapshot in self.pool.take_thread_stats() {
            snapshot.log();
        }
        for task in &self.tasks {
            if let Some(report) = task.take_report() {
                report.log();
            }
            let peaks = task.monitoring();
            info!(
                task = task.id(),
                state = ?task.state(),
                sched_err_max_ns = peaks.sched_err_max,
                latency = ?peaks.latency,
                "monitoring"
            );
        }
        HandlerStatus::Continue
    }
}
