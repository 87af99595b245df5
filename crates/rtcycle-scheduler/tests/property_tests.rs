//! Property tests for capability matching and the adaptive timer.

use std::time::Duration;

use proptest::prelude::*;
use quickcheck_macros::quickcheck;
use rtcycle_scheduler::{Capabilities, ClockDomain, Timer, TimerKind, TimerOptions};

#[quickcheck]
fn capabilities_superset_contains_subset(a: u32, b: u32) -> bool {
    let thread = Capabilities::from_bits(a | b);
    thread.contains(Capabilities::from_bits(a)) && thread.contains(Capabilities::from_bits(b))
}

#[quickcheck]
fn capabilities_contains_matches_mask(thread: u32, required: u32) -> bool {
    Capabilities::from_bits(thread).contains(Capabilities::from_bits(required)) == (thread & required == required)
}

#[quickcheck]
fn every_thread_satisfies_empty_request(thread: u32) -> bool {
    Capabilities::from_bits(thread).contains(Capabilities::NONE)
}

fn adaptive() -> Timer {
    let options = TimerOptions {
        max_catchup: Duration::from_secs(10),
        early_tolerance: None,
    };
    Timer::new(TimerKind::Adaptive, ClockDomain::Monotonic, options).unwrap_or_else(|err| panic!("{err}"))
}

proptest! {
    #[test]
    fn prop_adaptive_elapsed_counts_whole_periods(
        period in 1_000u64..10_000_000,
        late in 0u64..5_000_000_000,
    ) {
        let timer = adaptive();
        let start = 1_000_000_000_u64;
        timer.start(start, period).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let elapsed = timer.check(start + late).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(elapsed, late / period + 1);
        // The next deadline lies strictly ahead of `now` and within one period.
        let again = timer.check(start + late).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(again, 0);
    }

    #[test]
    fn prop_adaptive_sequence_sums_to_total(
        period in 1_000u64..1_000_000,
        steps in proptest::collection::vec(0u64..3_000_000, 1..50),
    ) {
        let timer = adaptive();
        let start = 1_000_000_000_u64;
        timer.start(start, period).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut now = start;
        let mut total = 0u64;
        for step in steps {
            now += step;
            total += timer.check(now).map_err(|e| TestCaseError::fail(e.to_string()))?;
        }
        prop_assert_eq!(total, (now - start) / period + 1);
    }
}
