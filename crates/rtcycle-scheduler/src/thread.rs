//! Pool threads and their dispatch loop.
//!
//! Each thread owns a fixed slot array and sleeps in one of two ways:
//!
//! - [`WakeMode::Readiness`]: on its epoll instance, for descriptor slots
//! - [`WakeMode::Deadline`]: with `clock_nanosleep` towards the earliest armed
//!   [`DeadlineWake`](crate::slot::DeadlineWake) of its slots
//!
//! Either wait is bounded by [`WAIT_TIMEOUT`] so slot timeouts and the exit
//! flag are serviced even when nothing happens.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rtcycle_stats::{RunningStats, SnapshotCell, StatsSummary};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::capability::Capabilities;
use crate::clock::ClockDomain;
use crate::error::ThreadError;
use crate::platform::{self, Epoll, EventBuffer};
use crate::rt_setup::{RtPolicy, RtSetup};
use crate::slot::{HandlerStatus, Readiness, SlotEntry, SlotHandler};
use crate::MAX_THREAD_SLOTS;

/// Upper bound on any single wait of a pool thread.
pub const WAIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Interval between thread statistics snapshots.
pub const THREAD_STATS_PERIOD: Duration = Duration::from_secs(10);

const WAIT_TIMEOUT_MS: i32 = 100;

/// Static description of one pool thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadConfig {
    /// Capabilities the thread advertises.
    pub capabilities: Capabilities,
    /// Core to pin to.
    pub cpu: Option<usize>,
    /// `SCHED_FIFO` priority.
    pub priority: Option<i32>,
    /// Number of slots; zero means the thread never runs its loop.
    pub max_slots: usize,
}

impl ThreadConfig {
    /// Thread with `max_slots` slots and no real-time settings.
    #[must_use]
    pub const fn new(capabilities: Capabilities, max_slots: usize) -> Self {
        Self {
            capabilities,
            cpu: None,
            priority: None,
            max_slots,
        }
    }

    /// Pin to `cpu`.
    #[must_use]
    pub const fn with_cpu(mut self, cpu: usize) -> Self {
        self.cpu = Some(cpu);
        self
    }

    /// Run at FIFO `priority`.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Real-time setup for this thread under `policy`.
    #[must_use]
    pub const fn rt_setup(&self, policy: RtPolicy) -> RtSetup {
        RtSetup {
            priority: self.priority,
            cpu: self.cpu,
            lock_memory: false,
            policy,
        }
    }
}

/// The stock thread table: one cyclic-loop thread, one pass-through thread
/// and one statistics thread, all with the full slot count.
#[must_use]
pub fn default_threads() -> Vec<ThreadConfig> {
    vec![
        ThreadConfig::new(Capabilities::TSN_LOOP | Capabilities::TIMER, MAX_THREAD_SLOTS)
            .with_cpu(1)
            .with_priority(60),
        ThreadConfig::new(Capabilities::TSN_PT | Capabilities::CONTROLLED, MAX_THREAD_SLOTS)
            .with_cpu(1)
            .with_priority(59),
        ThreadConfig::new(Capabilities::STATS | Capabilities::TIMER, MAX_THREAD_SLOTS)
            .with_cpu(0)
            .with_priority(1),
    ]
}

/// How a thread sleeps between dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeMode {
    /// On the readiness multiplexer.
    Readiness,
    /// Towards the earliest armed deadline in the given clock.
    Deadline(ClockDomain),
}

impl WakeMode {
    const fn encode(mode: Option<Self>) -> u8 {
        match mode {
            None => 0,
            Some(Self::Readiness) => 1,
            Some(Self::Deadline(ClockDomain::Monotonic)) => 2,
            Some(Self::Deadline(ClockDomain::Realtime)) => 3,
        }
    }

    const fn decode(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Readiness),
            2 => Some(Self::Deadline(ClockDomain::Monotonic)),
            3 => Some(Self::Deadline(ClockDomain::Realtime)),
            _ => None,
        }
    }
}

/// Statistics of one thread over one reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadStatsSnapshot {
    /// Thread index.
    pub thread: usize,
    /// Wakeups since start.
    pub wakeups: u64,
    /// Ready sources per wakeup.
    pub events: StatsSummary,
    /// Nanoseconds between consecutive wakeups.
    pub wake_interval: StatsSummary,
    /// Nanoseconds spent dispatching per wakeup.
    pub processing_time: StatsSummary,
    /// Error or hang-up events skipped since start.
    pub error_events: u64,
    /// Handler invocations that returned [`HandlerStatus::Error`].
    pub handler_errors: u64,
    /// Slot timeouts fired since start.
    pub timeouts: u64,
}

impl ThreadStatsSnapshot {
    /// Emit the snapshot through `tracing`.
    pub fn log(&self) {
        info!(
            thread = self.thread,
            wakeups = self.wakeups,
            error_events = self.error_events,
            handler_errors = self.handler_errors,
            timeouts = self.timeouts,
            "thread stats"
        );
        info!(thread = self.thread, "  events     {}", self.events);
        info!(thread = self.thread, "  wake (ns)  {}", self.wake_interval);
        info!(thread = self.thread, "  proc (ns)  {}", self.processing_time);
    }
}

#[derive(Debug, Default)]
struct ThreadStats {
    wakeups: u64,
    events: RunningStats,
    wake_interval: RunningStats,
    processing_time: RunningStats,
    error_events: u64,
    handler_errors: u64,
    timeouts: u64,
}

impl ThreadStats {
    fn snapshot(&self, thread: usize) -> ThreadStatsSnapshot {
        ThreadStatsSnapshot {
            thread,
            wakeups: self.wakeups,
            events: self.events.summary(),
            wake_interval: self.wake_interval.summary(),
            processing_time: self.processing_time.summary(),
            error_events: self.error_events,
            handler_errors: self.handler_errors,
            timeouts: self.timeouts,
        }
    }

    fn reset_window(&mut self) {
        self.events.reset();
        self.wake_interval.reset();
        self.processing_time.reset();
    }
}

fn nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

/// One pool thread's shared state.
pub(crate) struct Worker {
    pub(crate) index: usize,
    pub(crate) config: ThreadConfig,
    pub(crate) policy: RtPolicy,
    pub(crate) epoll: Epoll,
    pub(crate) slots: Box<[Mutex<SlotEntry>]>,
    pub(crate) active: AtomicUsize,
    mode: AtomicU8,
    exit: AtomicBool,
    looping: AtomicBool,
    stats: SnapshotCell<ThreadStatsSnapshot>,
}

impl Worker {
    pub(crate) fn new(index: usize, config: ThreadConfig, policy: RtPolicy) -> std::io::Result<Self> {
        let slots = (0..config.max_slots.min(MAX_THREAD_SLOTS))
            .map(|_| Mutex::new(SlotEntry::default()))
            .collect();
        Ok(Self {
            index,
            config,
            policy,
            epoll: Epoll::new()?,
            slots,
            active: AtomicUsize::new(0),
            mode: AtomicU8::new(WakeMode::encode(None)),
            exit: AtomicBool::new(false),
            looping: AtomicBool::new(false),
            stats: SnapshotCell::new(),
        })
    }

    pub(crate) fn mode(&self) -> Option<WakeMode> {
        WakeMode::decode(self.mode.load(Ordering::Acquire))
    }

    pub(crate) fn set_mode(&self, mode: Option<WakeMode>) {
        self.mode.store(WakeMode::encode(mode), Ordering::Release);
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    pub(crate) fn request_exit(&self) {
        self.exit.store(true, Ordering::Release);
    }

    pub(crate) fn take_stats(&self) -> Option<ThreadStatsSnapshot> {
        self.stats.take()
    }

    /// First free slot index.
    pub(crate) fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|slot| !slot.lock().used)
    }

    /// Thread body.
    pub(crate) fn run(&self) -> Result<(), ThreadError> {
        if self.slots.is_empty() {
            debug!(thread = self.index, "no slots configured, not starting loop");
            return Ok(());
        }

        self.config.rt_setup(self.policy).apply(self.index)?;
        self.looping.store(true, Ordering::Release);
        debug!(thread = self.index, capabilities = %self.config.capabilities, "thread loop started");

        let result = self.dispatch_loop();
        self.looping.store(false, Ordering::Release);
        result
    }

    fn dispatch_loop(&self) -> Result<(), ThreadError> {
        let mut events = EventBuffer::with_capacity(self.slots.len());
        let mut stats = ThreadStats::default();
        let mut last_wake: Option<Instant> = None;
        let mut last_timeout_check = Instant::now();
        let mut last_report = Instant::now();

        while !self.exit.load(Ordering::Acquire) {
            let ready = match self.mode() {
                Some(WakeMode::Deadline(domain)) => {
                    self.sleep_until_deadline(domain)?;
                    self.dispatch_deadlines(domain, &mut stats)
                }
                Some(WakeMode::Readiness) | None => {
                    self.epoll
                        .wait(&mut events, WAIT_TIMEOUT_MS)
                        .map_err(|source| ThreadError::Wait {
                            thread: self.index,
                            source,
                        })?;
                    self.dispatch_events(&events, &mut stats)
                }
            };

            let woke = Instant::now();
            if let Some(prev) = last_wake {
                stats.wake_interval.update(nanos(woke.saturating_duration_since(prev)));
            }
            last_wake = Some(woke);
            stats.wakeups = stats.wakeups.saturating_add(1);
            stats.events.update(i64::try_from(ready).unwrap_or(i64::MAX));

            let now = Instant::now();
            if now.saturating_duration_since(last_timeout_check) >= WAIT_TIMEOUT {
                let elapsed = now.saturating_duration_since(last_timeout_check);
                last_timeout_check = now;
                self.check_timeouts(elapsed, &mut stats);
            }

            let done = Instant::now();
            stats.processing_time.update(nanos(done.saturating_duration_since(woke)));

            if done.saturating_duration_since(last_report) >= THREAD_STATS_PERIOD {
                last_report = done;
                if self.active() > 0 && self.stats.publish(stats.snapshot(self.index)).is_ok() {
                    stats.reset_window();
                }
            }

            std::thread::yield_now();
        }

        debug!(thread = self.index, "thread loop exiting");
        Ok(())
    }

    fn sleep_until_deadline(&self, domain: ClockDomain) -> Result<(), ThreadError> {
        let earliest = self
            .slots
            .iter()
            .filter_map(|slot| {
                let entry = slot.lock();
                if entry.used && entry.enabled {
                    entry.wake().and_then(|w| w.deadline())
                } else {
                    None
                }
            })
            .min();

        match platform::clock_now(domain) {
            Ok(now) => {
                let limit = now.saturating_add(u64::try_from(WAIT_TIMEOUT.as_nanos()).unwrap_or(u64::MAX));
                let target = earliest.map_or(limit, |deadline| deadline.min(limit));
                if target > now {
                    platform::sleep_until(domain, target).map_err(|source| ThreadError::Wait {
                        thread: self.index,
                        source,
                    })?;
                }
            }
            // Armed slots are dispatched right away so their owners see the
            // clock failure; with nothing armed, just wait.
            Err(_) if earliest.is_some() => {}
            Err(err) => {
                trace!(thread = self.index, %err, "clock unreadable while idle");
                std::thread::sleep(WAIT_TIMEOUT);
            }
        }
        Ok(())
    }

    fn dispatch_deadlines(&self, domain: ClockDomain, stats: &mut ThreadStats) -> usize {
        let now = platform::clock_now(domain).ok();
        let mut fired = 0_usize;
        for (idx, slot) in self.slots.iter().enumerate() {
            let due = {
                let entry = slot.lock();
                if !entry.used || !entry.enabled {
                    continue;
                }
                entry.wake().is_some_and(|wake| match now {
                    Some(now) => wake.fire_if_due(now),
                    None => wake.fire_if_armed(),
                })
            };
            if due {
                fired = fired.saturating_add(1);
                self.dispatch_slot(idx, Readiness::READABLE, stats);
            }
        }
        fired
    }

    fn dispatch_events(&self, events: &EventBuffer, stats: &mut ThreadStats) -> usize {
        let mut count = 0_usize;
        for (token, readiness) in events.iter() {
            count = count.saturating_add(1);
            if readiness.is_error_or_hangup() {
                stats.error_events = stats.error_events.saturating_add(1);
                trace!(thread = self.index, token, "error/hang-up event skipped");
                continue;
            }
            if let Ok(idx) = usize::try_from(token) {
                self.dispatch_slot(idx, readiness, stats);
            }
        }
        count
    }

    /// Run a slot's handler without holding the slot lock.
    fn dispatch_slot(&self, idx: usize, readiness: Readiness, stats: &mut ThreadStats) {
        let Some(slot) = self.slots.get(idx) else {
            return;
        };
        let (mut handler, generation) = {
            let mut entry = slot.lock();
            if !entry.used || !entry.enabled {
                return;
            }
            if readiness.is_io() {
                entry.idle_ns = 0;
            }
            let Some(handler) = entry.handler.take() else {
                return;
            };
            (handler, entry.generation)
        };

        if handler.on_ready(readiness) == HandlerStatus::Error {
            stats.handler_errors = stats.handler_errors.saturating_add(1);
        }
        self.restore(slot, generation, handler);
    }

    fn check_timeouts(&self, elapsed: Duration, stats: &mut ThreadStats) {
        let delta = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        for slot in self.slots.iter() {
            let expired = {
                let mut entry = slot.lock();
                let Some(budget) = entry.timeout_budget_ns.filter(|_| entry.used) else {
                    continue;
                };
                entry.idle_ns = entry.idle_ns.saturating_add(delta);
                if entry.idle_ns > budget {
                    entry.idle_ns = 0;
                    entry.timeouts = entry.timeouts.saturating_add(1);
                    let generation = entry.generation;
                    entry.handler.take().map(|handler| (handler, generation))
                } else {
                    None
                }
            };
            if let Some((mut handler, generation)) = expired {
                stats.timeouts = stats.timeouts.saturating_add(1);
                handler.on_timeout();
                self.restore(slot, generation, handler);
            }
        }
    }

    /// Put a handler back unless its slot was released meanwhile.
    fn restore(&self, slot: &Mutex<SlotEntry>, generation: u64, handler: Box<dyn SlotHandler>) {
        let orphan = {
            let mut entry = slot.lock();
            if entry.used && entry.generation == generation && entry.handler.is_none() {
                entry.handler = Some(handler);
                None
            } else {
                Some(handler)
            }
        };
        drop(orphan);
    }
}
