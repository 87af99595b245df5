//! Property-based tests for rtcycle-stats.

use proptest::prelude::*;
use quickcheck_macros::quickcheck;
use rtcycle_stats::{Histogram, RunningStats, SnapshotCell};

#[quickcheck]
fn prop_variance_is_mean_square_minus_mean_squared(samples: Vec<i32>) -> bool {
    let mut stats = RunningStats::new();
    for s in &samples {
        stats.update(i64::from(*s));
    }
    let summary = stats.summary();
    let mean_mag = u128::from(summary.mean.unsigned_abs());
    summary.variance == summary.mean_square.saturating_sub(mean_mag * mean_mag)
}

#[quickcheck]
fn prop_min_le_mean_le_max(samples: Vec<i32>) -> bool {
    if samples.is_empty() {
        return true;
    }
    let mut stats = RunningStats::new();
    for s in &samples {
        stats.update(i64::from(*s));
    }
    let s = stats.summary();
    s.min <= s.mean && s.mean <= s.max && s.count == samples.len() as u64
}

#[quickcheck]
fn prop_reset_never_loses_absolute_extremes(first: Vec<i32>, second: Vec<i32>) -> bool {
    let mut stats = RunningStats::new();
    for s in &first {
        stats.update(i64::from(*s));
    }
    stats.reset();
    for s in &second {
        stats.update(i64::from(*s));
    }
    let summary = stats.summary();
    let all: Vec<i64> = first.iter().chain(&second).map(|v| i64::from(*v)).collect();
    match (all.iter().min(), all.iter().max()) {
        (Some(lo), Some(hi)) => summary.abs_min == *lo && summary.abs_max == *hi,
        _ => summary.abs_min == 0 && summary.abs_max == 0,
    }
}

proptest! {
    #[test]
    fn histogram_total_matches_samples(
        buckets in 1_usize..=256,
        width in 1_u64..100_000,
        samples in prop::collection::vec(any::<u64>(), 0..500),
    ) {
        let mut hist = Histogram::new(buckets, width)?;
        for s in &samples {
            hist.record(*s);
        }
        prop_assert_eq!(hist.total(), samples.len() as u64);
        prop_assert_eq!(hist.buckets().len(), buckets);
    }

    #[test]
    fn histogram_overflow_lands_in_last_bucket(
        buckets in 1_usize..=256,
        width in 1_u64..100_000,
        extra in 0_u64..1_000_000,
    ) {
        let mut hist = Histogram::new(buckets, width)?;
        let beyond = (buckets as u64) * width + extra;
        hist.record(beyond);
        prop_assert_eq!(hist.bucket_for(beyond), buckets - 1);
        prop_assert_eq!(hist.buckets().last().copied(), Some(1));
    }

    #[test]
    fn snapshot_cell_keeps_first_until_taken(values in prop::collection::vec(any::<u32>(), 1..20)) {
        let cell = SnapshotCell::new();
        let mut accepted = None;
        for v in &values {
            if cell.publish(*v).is_ok() {
                prop_assert!(accepted.is_none());
                accepted = Some(*v);
            }
        }
        prop_assert_eq!(cell.take(), values.first().copied());
        prop_assert_eq!(accepted, values.first().copied());
    }
}
