//! Task lifecycle on a real pool with an in-memory transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rtcycle_cyclic::{
    Cycle, CyclicTask, FrameHeader, TaskDescriptor, TaskError, TaskRole, TaskState, TimerHealth, default_table,
};
use rtcycle_scheduler::{Capabilities, Clock, RtPolicy, SystemClock, ThreadConfig, ThreadPool};
use rtcycle_test_helpers::prelude::*;

/// Aligned starts land up to 1.5 s ahead.
const WAIT: Duration = Duration::from_secs(5);

fn loop_pool() -> Result<ThreadPool, Box<dyn std::error::Error>> {
    Ok(ThreadPool::start(
        vec![
            ThreadConfig::new(Capabilities::TSN_LOOP | Capabilities::TIMER, 4),
            ThreadConfig::new(Capabilities::STATS | Capabilities::TIMER, 2),
        ],
        RtPolicy::Disabled,
    )?)
}

fn clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock::monotonic())
}

fn controller() -> TaskDescriptor {
    must_some(default_table().into_iter().next(), "controller descriptor")
}

/// Handler that sends one frame per healthy cycle and counts calls.
fn sender(cycles: Arc<AtomicU64>) -> impl FnMut(&mut Cycle<'_>) + Send + 'static {
    move |cycle: &mut Cycle<'_>| {
        let stamp = cycle.sched_time().to_le_bytes();
        if cycle.health() == TimerHealth::Ok && cycle.transmit(7, &stamp).is_ok() {
            cycles.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[test]
fn test_register_opens_sockets_and_claims_slot() -> TestResult {
    let pool = loop_pool()?;
    let mut transport = MockTransport::new();
    let task = CyclicTask::register(&pool, &controller(), &mut transport, clock(), |_: &mut Cycle<'_>| {})?;

    assert_eq!(task.state(), TaskState::Registered);
    assert_eq!(task.id(), TaskRole::Controller.id());
    assert_eq!(task.thread_index(), Some(0));
    assert_eq!(transport.opened_rx(), vec![1]);
    assert_eq!(transport.opened_tx(), vec![0]);
    assert_eq!(pool.active_slots(0), Some(1));

    task.deregister()?;
    assert_eq!(pool.active_slots(0), Some(0));
    Ok(())
}

#[test]
fn test_running_task_transmits_stamped_frames() -> TestResult {
    let pool = loop_pool()?;
    let mut transport = MockTransport::new();
    let cycles = Arc::new(AtomicU64::new(0));
    let task = CyclicTask::register(&pool, &controller(), &mut transport, clock(), sender(Arc::clone(&cycles)))?;

    task.start()?;
    assert_eq!(task.state(), TaskState::Running);
    assert!(wait_until(WAIT, || cycles.load(Ordering::Relaxed) >= 5));

    let sent = transport.sent(0);
    let first = must_some(sent.first(), "a frame");
    let (header, payload) = FrameHeader::decode(first)?;
    assert_eq!(header.msg_id, 7);
    assert_eq!(header.src_id, task.id());
    assert_eq!(payload, header.sched_time.to_le_bytes());
    assert_eq!(header.sched_time % 2_000_000, 0);

    task.stop()?;
    assert_eq!(task.state(), TaskState::Stopped);
    task.deregister()?;
    Ok(())
}

#[test]
fn test_stop_is_idempotent_and_restart_works() -> TestResult {
    let pool = loop_pool()?;
    let mut transport = MockTransport::new();
    let cycles = Arc::new(AtomicU64::new(0));
    let task = CyclicTask::register(&pool, &controller(), &mut transport, clock(), sender(Arc::clone(&cycles)))?;

    task.stop()?;
    assert_eq!(task.state(), TaskState::Registered);

    task.start()?;
    assert!(matches!(
        task.start(),
        Err(TaskError::InvalidState {
            op: "start",
            state: TaskState::Running
        })
    ));
    assert!(wait_until(WAIT, || cycles.load(Ordering::Relaxed) >= 2));

    task.stop()?;
    task.stop()?;
    std::thread::sleep(Duration::from_millis(20));
    let stopped_at = cycles.load(Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(cycles.load(Ordering::Relaxed), stopped_at);

    task.start()?;
    assert!(wait_until(WAIT, || cycles.load(Ordering::Relaxed) > stopped_at));
    task.deregister()?;
    Ok(())
}

#[test]
fn test_invalid_period_fails_start_without_side_effects() -> TestResult {
    let pool = loop_pool()?;
    let mut transport = MockTransport::new();
    let mut descriptor = controller();
    descriptor.set_period(3_000_000);
    let task = CyclicTask::register(&pool, &descriptor, &mut transport, clock(), |_: &mut Cycle<'_>| {})?;

    assert!(matches!(task.start(), Err(TaskError::InvalidPeriod(3_000_000))));
    assert_eq!(task.state(), TaskState::Registered);
    assert_eq!(task.sched_time(), 0);
    Ok(())
}

#[test]
fn test_too_many_peers_rejected_before_opening_sockets() -> TestResult {
    let pool = loop_pool()?;
    let mut transport = MockTransport::new();
    let mut descriptor = controller();
    descriptor.num_peers = 3;

    let result = CyclicTask::register(&pool, &descriptor, &mut transport, clock(), |_: &mut Cycle<'_>| {});
    assert!(matches!(result, Err(TaskError::TooManyPeers { requested: 3, max: 2 })));
    assert!(transport.opened_rx().is_empty());
    assert_eq!(pool.active_slots(0), Some(0));
    Ok(())
}

#[test]
fn test_unknown_stream_fails_registration() -> TestResult {
    let pool = loop_pool()?;
    let mut transport = MockTransport::new().without_stream(1);

    let result = CyclicTask::register(&pool, &controller(), &mut transport, clock(), |_: &mut Cycle<'_>| {});
    assert!(matches!(result, Err(TaskError::UnknownStream(1))));
    assert_eq!(pool.active_slots(0), Some(0));
    Ok(())
}

#[test]
fn test_no_capable_thread_fails_registration() -> TestResult {
    let pool = ThreadPool::start(vec![ThreadConfig::new(Capabilities::STATS, 2)], RtPolicy::Disabled)?;
    let mut transport = MockTransport::new();
    let result = CyclicTask::register(&pool, &controller(), &mut transport, clock(), |_: &mut Cycle<'_>| {});
    assert!(matches!(result, Err(TaskError::Timer(_))));
    Ok(())
}

#[test]
fn test_drop_releases_slot() -> TestResult {
    let pool = loop_pool()?;
    let mut transport = MockTransport::new();
    {
        let task = CyclicTask::register(&pool, &controller(), &mut transport, clock(), |_: &mut Cycle<'_>| {})?;
        task.start()?;
        assert_eq!(pool.active_slots(0), Some(1));
    }
    assert_eq!(pool.active_slots(0), Some(0));
    Ok(())
}

#[test]
fn test_report_published_after_stats_period() -> TestResult {
    let pool = loop_pool()?;
    let mut transport = MockTransport::new();
    let mut descriptor = controller();
    descriptor.params.stats_period_sec = 1;
    let cycles = Arc::new(AtomicU64::new(0));
    let task = CyclicTask::register(&pool, &descriptor, &mut transport, clock(), sender(Arc::clone(&cycles)))?;
    task.start()?;

    let mut report = None;
    assert!(wait_until(Duration::from_secs(6), || {
        report = task.take_report();
        report.is_some()
    }));
    let report = must_some(report, "report");
    assert_eq!(report.task_id, task.id());
    assert!(report.task.counters.sched >= descriptor.params.report_interval());
    let peer = must_some(report.peer(0), "peer report");
    assert_eq!(peer.stream, 1);
    // Nothing arrives over the mock transport.
    assert_eq!(peer.valid_frames, 0);
    assert!(peer.err_underflow > 0);
    assert!(!peer.link_up);
    assert!(report.tx.is_some_and(|tx| tx.frames > 0));

    let monitoring = task.monitoring();
    assert_eq!(monitoring.latency.len(), 1);
    task.deregister()?;
    Ok(())
}
