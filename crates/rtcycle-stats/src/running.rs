//! Incremental running statistics.
//!
//! [`RunningStats`] accumulates integer samples (nanoseconds, usually signed
//! schedule errors or latencies) and produces a [`StatsSummary`] on demand.
//! The window can be reset independently of the absolute extremes, which
//! survive every [`RunningStats::reset`] and are only cleared by
//! [`RunningStats::clear`].

use core::fmt;

/// Summary of one statistics window.
///
/// Integer arithmetic throughout: `mean` is truncated towards zero and
/// `variance` is `mean_square - mean²`, saturating at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSummary {
    /// Number of samples in the window.
    pub count: u64,
    /// Smallest sample of the window (0 when empty).
    pub min: i64,
    /// Largest sample of the window (0 when empty).
    pub max: i64,
    /// Mean of the window.
    pub mean: i64,
    /// Mean of the squared samples.
    pub mean_square: u128,
    /// Variance of the window.
    pub variance: u128,
    /// Smallest sample since the last [`RunningStats::clear`].
    pub abs_min: i64,
    /// Largest sample since the last [`RunningStats::clear`].
    pub abs_max: i64,
}

impl StatsSummary {
    /// True when the window held no samples.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min {:>9} mean {:>9} max {:>9} rms^2 {:>12} stddev^2 {:>12} absmin {:>9} absmax {:>9}",
            self.min,
            self.mean,
            self.max,
            self.mean_square,
            self.variance,
            self.abs_min,
            self.abs_max
        )
    }
}

/// Running statistics accumulator.
///
/// # RT Safety
///
/// `update` is a handful of integer operations with no allocation. Sums are
/// kept in 128-bit accumulators so realistic nanosecond samples cannot
/// overflow within a window.
#[derive(Debug, Clone, Copy)]
pub struct RunningStats {
    count: u64,
    min: i64,
    max: i64,
    sum: i128,
    sum_sq: u128,
    abs_min: i64,
    abs_max: i64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStats {
    /// Empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: 0,
            min: i64::MAX,
            max: i64::MIN,
            sum: 0,
            sum_sq: 0,
            abs_min: i64::MAX,
            abs_max: i64::MIN,
        }
    }

    /// Add one sample.
    #[inline]
    pub fn update(&mut self, value: i64) {
        self.count = self.count.saturating_add(1);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.abs_min = self.abs_min.min(value);
        self.abs_max = self.abs_max.max(value);
        self.sum = self.sum.saturating_add(i128::from(value));
        let magnitude = u128::from(value.unsigned_abs());
        self.sum_sq = self.sum_sq.saturating_add(magnitude.saturating_mul(magnitude));
    }

    /// Number of samples in the current window.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Compute the summary of the current window without resetting it.
    #[must_use]
    pub fn summary(&self) -> StatsSummary {
        if self.count == 0 {
            return StatsSummary {
                abs_min: if self.abs_min == i64::MAX { 0 } else { self.abs_min },
                abs_max: if self.abs_max == i64::MIN { 0 } else { self.abs_max },
                ..StatsSummary::default()
            };
        }

        let n = i128::from(self.count);
        let mean = i64::try_from(self.sum / n).unwrap_or(if self.sum < 0 { i64::MIN } else { i64::MAX });
        let mean_square = self.sum_sq / u128::from(self.count);
        let mean_mag = u128::from(mean.unsigned_abs());
        let variance = mean_square.saturating_sub(mean_mag.saturating_mul(mean_mag));

        StatsSummary {
            count: self.count,
            min: self.min,
            max: self.max,
            mean,
            mean_square,
            variance,
            abs_min: self.abs_min,
            abs_max: self.abs_max,
        }
    }

    /// Start a new window. Absolute extremes are kept.
    pub fn reset(&mut self) {
        *self = Self {
            abs_min: self.abs_min,
            abs_max: self.abs_max,
            ..Self::new()
        };
    }

    /// Forget everything, absolute extremes included.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary_is_zeroed() {
        let stats = RunningStats::new();
        let summary = stats.summary();
        assert!(summary.is_empty());
        assert_eq!(summary, StatsSummary::default());
    }

    #[test]
    fn test_summary_values() {
        let mut stats = RunningStats::new();
        for v in [10, 20, 30] {
            stats.update(v);
        }
        let s = stats.summary();
        assert_eq!(s.count, 3);
        assert_eq!(s.min, 10);
        assert_eq!(s.max, 30);
        assert_eq!(s.mean, 20);
        assert_eq!(s.mean_square, 466);
        assert_eq!(s.variance, 66);
    }

    #[test]
    fn test_negative_samples() {
        let mut stats = RunningStats::new();
        stats.update(-50);
        stats.update(50);
        let s = stats.summary();
        assert_eq!(s.mean, 0);
        assert_eq!(s.mean_square, 2500);
        assert_eq!(s.variance, 2500);
        assert_eq!(s.min, -50);
    }

    #[test]
    fn test_reset_keeps_absolute_extremes() {
        let mut stats = RunningStats::new();
        stats.update(5);
        stats.update(500);
        stats.reset();
        stats.update(42);

        let s = stats.summary();
        assert_eq!(s.count, 1);
        assert_eq!(s.min, 42);
        assert_eq!(s.max, 42);
        assert_eq!(s.abs_min, 5);
        assert_eq!(s.abs_max, 500);

        stats.clear();
        assert_eq!(stats.summary(), StatsSummary::default());
    }
}
