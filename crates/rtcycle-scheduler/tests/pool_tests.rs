//! Thread pool integration tests: registration, dispatch and release.

use std::net::UdpSocket;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rtcycle_scheduler::{
    Capabilities, ClockDomain, DeadlineWake, HandlerStatus, PoolError, Readiness, Registration, RtPolicy,
    SlotHandler, ThreadConfig, ThreadPool, WakeMode,
};
use rtcycle_test_helpers::prelude::*;

const WAIT: Duration = Duration::from_secs(2);

fn pool(configs: Vec<ThreadConfig>) -> Result<ThreadPool, PoolError> {
    ThreadPool::start(configs, RtPolicy::Disabled)
}

fn idle() -> impl SlotHandler {
    |_: Readiness| HandlerStatus::Continue
}

fn monotonic_wake() -> Arc<DeadlineWake> {
    Arc::new(DeadlineWake::new(ClockDomain::Monotonic))
}

#[test]
fn test_unsatisfiable_capabilities_claim_nothing() -> TestResult {
    let pool = pool(vec![ThreadConfig::new(Capabilities::TIMER, 2)])?;
    let result = pool.register(Registration::deadline(Capabilities::TSN_PT, monotonic_wake(), idle()));
    assert!(matches!(result, Err(PoolError::NoCapableThread(_))));
    assert_eq!(pool.active_slots(0), Some(0));
    assert_eq!(pool.wake_mode(0), None);
    Ok(())
}

#[test]
fn test_first_capable_thread_with_free_slot_wins() -> TestResult {
    let pool = pool(vec![
        ThreadConfig::new(Capabilities::STATS, 1),
        ThreadConfig::new(Capabilities::TIMER | Capabilities::TSN_LOOP, 1),
        ThreadConfig::new(Capabilities::TIMER, 1),
    ])?;

    let first = pool.register(Registration::deadline(Capabilities::TIMER, monotonic_wake(), idle()))?;
    assert_eq!(first.thread_index(), 1);
    let second = pool.register(Registration::deadline(Capabilities::TIMER, monotonic_wake(), idle()))?;
    assert_eq!(second.thread_index(), 2);

    let full = pool.register(Registration::deadline(Capabilities::TIMER, monotonic_wake(), idle()));
    assert!(matches!(full, Err(PoolError::NoCapableThread(_))));
    Ok(())
}

#[test]
fn test_wake_mode_mismatch_skips_thread() -> TestResult {
    let pool = pool(vec![
        ThreadConfig::new(Capabilities::TIMER, 4),
        ThreadConfig::new(Capabilities::TIMER, 4),
    ])?;
    let socket = UdpSocket::bind("127.0.0.1:0")?;

    let deadline = pool.register(Registration::deadline(Capabilities::TIMER, monotonic_wake(), idle()))?;
    assert_eq!(deadline.thread_index(), 0);
    assert_eq!(pool.wake_mode(0), Some(WakeMode::Deadline(ClockDomain::Monotonic)));

    let fd = pool.register(Registration::fd(
        Capabilities::TIMER,
        socket.as_raw_fd(),
        Readiness::READABLE,
        idle(),
    ))?;
    assert_eq!(fd.thread_index(), 1);
    assert_eq!(pool.wake_mode(1), Some(WakeMode::Readiness));

    let realtime = Arc::new(DeadlineWake::new(ClockDomain::Realtime));
    let mismatch = pool.register(Registration::deadline(Capabilities::TIMER, realtime, idle()));
    assert!(matches!(mismatch, Err(PoolError::NoCapableThread(_))));
    Ok(())
}

#[test]
fn test_duplicate_fd_rejected() -> TestResult {
    let pool = pool(vec![ThreadConfig::new(Capabilities::CONTROLLED, 4)])?;
    let socket = UdpSocket::bind("127.0.0.1:0")?;
    let fd = socket.as_raw_fd();

    let _first = pool.register(Registration::fd(Capabilities::CONTROLLED, fd, Readiness::READABLE, idle()))?;
    let again = pool.register(Registration::fd(Capabilities::CONTROLLED, fd, Readiness::READABLE, idle()));
    assert!(matches!(again, Err(PoolError::DuplicateFd(d)) if d == fd));
    assert_eq!(pool.active_slots(0), Some(1));
    Ok(())
}

#[test]
fn test_enable_disable_idempotent_and_release_frees_slot() -> TestResult {
    let pool = pool(vec![ThreadConfig::new(Capabilities::CONTROLLED, 2)])?;
    let socket = UdpSocket::bind("127.0.0.1:0")?;
    let handle = pool.register(Registration::fd(
        Capabilities::CONTROLLED,
        socket.as_raw_fd(),
        Readiness::READABLE,
        idle(),
    ))?;

    assert!(handle.is_enabled());
    handle.enable()?;
    handle.disable()?;
    handle.disable()?;
    assert!(!handle.is_enabled());
    handle.enable()?;
    assert!(handle.is_enabled());

    let slot = handle.slot_index();
    handle.release()?;
    assert_eq!(pool.active_slots(0), Some(0));
    assert_eq!(pool.wake_mode(0), None);

    let reused = pool.register(Registration::fd(
        Capabilities::CONTROLLED,
        socket.as_raw_fd(),
        Readiness::READABLE,
        idle(),
    ))?;
    assert_eq!(reused.slot_index(), slot);
    Ok(())
}

#[test]
fn test_zero_slot_thread_does_not_loop() -> TestResult {
    let pool = pool(vec![
        ThreadConfig::new(Capabilities::TIMER, 0),
        ThreadConfig::new(Capabilities::TIMER, 1),
    ])?;
    assert!(wait_until(WAIT, || pool.is_looping(1)));
    assert!(!pool.is_looping(0));

    let handle = pool.register(Registration::deadline(Capabilities::TIMER, monotonic_wake(), idle()))?;
    assert_eq!(handle.thread_index(), 1);
    Ok(())
}

#[test]
fn test_socket_readiness_dispatches_handler() -> TestResult {
    let pool = pool(vec![ThreadConfig::new(Capabilities::TSN_PT, 2)])?;
    let receiver = UdpSocket::bind("127.0.0.1:0")?;
    receiver.set_nonblocking(true)?;
    let addr = receiver.local_addr()?;
    let fd = receiver.as_raw_fd();

    let received = Arc::new(AtomicU64::new(0));
    let seen = Arc::clone(&received);
    let _handle = pool.register(Registration::fd(
        Capabilities::TSN_PT,
        fd,
        Readiness::READABLE,
        move |readiness: Readiness| {
            let mut buf = [0u8; 64];
            if readiness.is_readable() {
                while receiver.recv(&mut buf).is_ok() {
                    seen.fetch_add(1, Ordering::Relaxed);
                }
            }
            HandlerStatus::Continue
        },
    ))?;

    let sender = UdpSocket::bind("127.0.0.1:0")?;
    sender.send_to(b"ping", addr)?;
    sender.send_to(b"ping", addr)?;
    assert!(wait_until(WAIT, || received.load(Ordering::Relaxed) == 2));
    Ok(())
}

#[test]
fn test_deadline_slot_fires_when_due() -> TestResult {
    let pool = pool(vec![ThreadConfig::new(Capabilities::TIMER, 1)])?;
    let wake = monotonic_wake();
    let fired = Arc::new(AtomicU64::new(0));
    let count = Arc::clone(&fired);
    let _handle = pool.register(Registration::deadline(
        Capabilities::TIMER,
        Arc::clone(&wake),
        move |_: Readiness| {
            count.fetch_add(1, Ordering::Relaxed);
            HandlerStatus::Continue
        },
    ))?;

    // Already due: fires on the next loop iteration, once.
    wake.arm(0);
    assert!(wait_until(WAIT, || fired.load(Ordering::Relaxed) == 1));
    assert_eq!(wake.deadline(), None);
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(fired.load(Ordering::Relaxed), 1);
    Ok(())
}

struct TimeoutCounter(Arc<AtomicU64>);

impl SlotHandler for TimeoutCounter {
    fn on_ready(&mut self, _: Readiness) -> HandlerStatus {
        HandlerStatus::Continue
    }

    fn on_timeout(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn test_idle_slot_times_out() -> TestResult {
    let pool = pool(vec![ThreadConfig::new(Capabilities::TIMER, 1)])?;
    let timeouts = Arc::new(AtomicU64::new(0));
    let handle = pool.register(
        Registration::deadline(Capabilities::TIMER, monotonic_wake(), TimeoutCounter(Arc::clone(&timeouts)))
            .with_timeout(Duration::from_millis(150)),
    )?;

    assert!(wait_until(WAIT, || timeouts.load(Ordering::Relaxed) >= 1));
    assert!(handle.timeouts() >= 1);
    Ok(())
}

#[test]
fn test_handler_errors_are_counted_not_fatal() -> TestResult {
    let pool = pool(vec![ThreadConfig::new(Capabilities::TIMER, 1)])?;
    let wake = monotonic_wake();
    let calls = Arc::new(AtomicU64::new(0));
    let count = Arc::clone(&calls);
    let _handle = pool.register(Registration::deadline(
        Capabilities::TIMER,
        Arc::clone(&wake),
        move |_: Readiness| {
            count.fetch_add(1, Ordering::Relaxed);
            HandlerStatus::Error
        },
    ))?;

    wake.arm(0);
    assert!(wait_until(WAIT, || calls.load(Ordering::Relaxed) == 1));
    wake.arm(0);
    assert!(wait_until(WAIT, || calls.load(Ordering::Relaxed) == 2));
    assert!(pool.is_looping(0));
    Ok(())
}

#[test]
fn test_too_many_threads_rejected() {
    let configs = vec![ThreadConfig::new(Capabilities::TIMER, 1); rtcycle_scheduler::MAX_THREADS + 1];
    assert!(matches!(
        ThreadPool::start(configs, RtPolicy::Disabled),
        Err(PoolError::TooManyThreads(n)) if n == rtcycle_scheduler::MAX_THREADS + 1
    ));
}

#[test]
fn test_shutdown_joins_threads() -> TestResult {
    let pool = pool(vec![ThreadConfig::new(Capabilities::TIMER, 1)])?;
    assert!(wait_until(WAIT, || pool.is_looping(0)));
    assert!(pool.shutdown().is_empty());
    assert!(!pool.is_looping(0));
    assert!(pool.shutdown().is_empty());
    Ok(())
}
