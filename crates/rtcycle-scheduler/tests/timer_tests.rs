//! Timer backends running on a real pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rtcycle_scheduler::{
    Capabilities, Clock, ClockDomain, HandlerStatus, Readiness, RtPolicy, SystemClock, ThreadConfig, ThreadPool,
    Timer, TimerError, TimerKind, TimerOptions,
};
use rtcycle_test_helpers::prelude::*;

const PERIOD_NS: u64 = 2_000_000;
const WAIT: Duration = Duration::from_secs(3);

fn timer_pool() -> Result<ThreadPool, Box<dyn std::error::Error>> {
    Ok(ThreadPool::start(
        vec![
            ThreadConfig::new(Capabilities::TIMER | Capabilities::TSN_LOOP, 4),
            ThreadConfig::new(Capabilities::TIMER | Capabilities::TSN_LOOP, 4),
        ],
        RtPolicy::Disabled,
    )?)
}

/// Attach `timer` with a handler that sums elapsed periods.
fn attach_counter(pool: &ThreadPool, timer: &Arc<Timer>) -> Result<Arc<AtomicU64>, TimerError> {
    let periods = Arc::new(AtomicU64::new(0));
    let sum = Arc::clone(&periods);
    let tick = Arc::clone(timer);
    let clock = SystemClock::new(timer.domain());
    timer.attach(pool, Capabilities::TSN_LOOP, move |_: Readiness| {
        let Ok(now) = clock.now_ns() else {
            return HandlerStatus::Error;
        };
        match tick.check(now) {
            Ok(elapsed) => {
                sum.fetch_add(elapsed, Ordering::Relaxed);
                HandlerStatus::Continue
            }
            Err(_) => HandlerStatus::Error,
        }
    })?;
    Ok(periods)
}

fn run_periods(kind: TimerKind) -> TestResult {
    let pool = timer_pool()?;
    let timer = Arc::new(Timer::new(kind, ClockDomain::Monotonic, TimerOptions::default())?);
    let periods = attach_counter(&pool, &timer)?;
    assert!(timer.is_attached());
    assert_eq!(timer.thread_index(), Some(0));

    let start = SystemClock::monotonic().now_ns()? + 5 * PERIOD_NS;
    timer.start(start, PERIOD_NS)?;
    assert!(wait_until(WAIT, || periods.load(Ordering::Relaxed) >= 10));

    timer.exit()?;
    assert!(!timer.is_attached());
    assert_eq!(pool.active_slots(0), Some(0));
    Ok(())
}

#[test]
fn test_hardware_timer_ticks() -> TestResult {
    run_periods(TimerKind::Hardware)
}

#[test]
fn test_adaptive_timer_ticks() -> TestResult {
    run_periods(TimerKind::Adaptive)
}

#[test]
fn test_hardware_and_adaptive_use_separate_threads() -> TestResult {
    let pool = timer_pool()?;
    let adaptive = Arc::new(Timer::new(TimerKind::Adaptive, ClockDomain::Monotonic, TimerOptions::default())?);
    let hardware = Arc::new(Timer::new(TimerKind::Hardware, ClockDomain::Monotonic, TimerOptions::default())?);
    let _a = attach_counter(&pool, &adaptive)?;
    let _h = attach_counter(&pool, &hardware)?;

    assert_eq!(adaptive.thread_index(), Some(0));
    assert_eq!(hardware.thread_index(), Some(1));

    adaptive.exit()?;
    hardware.exit()?;
    Ok(())
}

#[test]
fn test_attach_twice_rejected() -> TestResult {
    let pool = timer_pool()?;
    let timer = Arc::new(Timer::new(TimerKind::Adaptive, ClockDomain::Monotonic, TimerOptions::default())?);
    let _periods = attach_counter(&pool, &timer)?;
    let again = timer.attach(&pool, Capabilities::TSN_LOOP, |_: Readiness| HandlerStatus::Continue);
    assert!(matches!(again, Err(TimerError::AlreadyAttached)));
    assert_eq!(pool.active_slots(0), Some(1));
    timer.exit()?;
    timer.exit()?;
    Ok(())
}

#[test]
fn test_attach_without_capable_thread_fails() -> TestResult {
    let pool = timer_pool()?;
    let timer = Timer::new(TimerKind::Adaptive, ClockDomain::Monotonic, TimerOptions::default())?;
    let result = timer.attach(&pool, Capabilities::STATS, |_: Readiness| HandlerStatus::Continue);
    assert!(matches!(result, Err(TimerError::Pool(_))));
    assert!(!timer.is_attached());
    Ok(())
}

#[test]
fn test_adaptive_check_before_start_is_spurious() -> TestResult {
    let timer = Timer::new(TimerKind::Adaptive, ClockDomain::Monotonic, TimerOptions::default())?;
    timer.start(1_000_000_000, PERIOD_NS)?;
    assert_eq!(timer.check(1_000_000_000 - 1)?, 0);
    assert_eq!(timer.check(1_000_000_000 - PERIOD_NS)?, 0);
    assert!(matches!(
        timer.check(1_000_000_000 - PERIOD_NS - 1),
        Err(TimerError::Discontinuity)
    ));
    Ok(())
}

#[test]
fn test_adaptive_catchup_bound_is_inclusive() -> TestResult {
    let options = TimerOptions {
        max_catchup: Duration::from_secs(10),
        early_tolerance: None,
    };
    let timer = Timer::new(TimerKind::Adaptive, ClockDomain::Monotonic, options)?;
    let start = 1_000_000_000;
    timer.start(start, PERIOD_NS)?;
    assert_eq!(timer.check(start + 10_000_000_000)?, 10_000_000_000 / PERIOD_NS + 1);

    timer.start(start, PERIOD_NS)?;
    assert!(timer.check(start + 10_000_000_001).is_err_and(|e| e.is_discontinuity()));
    Ok(())
}
