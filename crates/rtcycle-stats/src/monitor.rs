//! Peak gauges shared between the RT thread and a monitoring reader.
//!
//! The RT side records with a single relaxed `fetch_max`/`fetch_min`; the
//! reader takes the value and re-arms the gauge in one `swap`.

use core::sync::atomic::{AtomicU64, Ordering};

/// Largest value seen since the last [`MaxGauge::take`].
#[derive(Debug, Default)]
pub struct MaxGauge(AtomicU64);

impl MaxGauge {
    /// Gauge reading zero.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Fold `value` into the peak.
    #[inline]
    pub fn record(&self, value: u64) {
        self.0.fetch_max(value, Ordering::Relaxed);
    }

    /// Current peak.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Read the peak and reset it to zero.
    pub fn take(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// Smallest value seen since the last [`MinGauge::take`].
///
/// Reads `None` until something is recorded.
#[derive(Debug)]
pub struct MinGauge(AtomicU64);

impl Default for MinGauge {
    fn default() -> Self {
        Self::new()
    }
}

impl MinGauge {
    /// Gauge with nothing recorded.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(u64::MAX))
    }

    /// Fold `value` into the minimum.
    #[inline]
    pub fn record(&self, value: u64) {
        self.0.fetch_min(value, Ordering::Relaxed);
    }

    /// Current minimum.
    #[must_use]
    pub fn get(&self) -> Option<u64> {
        Some(self.0.load(Ordering::Relaxed)).filter(|v| *v != u64::MAX)
    }

    /// Read the minimum and reset the gauge.
    pub fn take(&self) -> Option<u64> {
        Some(self.0.swap(u64::MAX, Ordering::Relaxed)).filter(|v| *v != u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_gauge_take_resets() {
        let gauge = MaxGauge::new();
        gauge.record(7);
        gauge.record(3);
        assert_eq!(gauge.get(), 7);
        assert_eq!(gauge.take(), 7);
        assert_eq!(gauge.take(), 0);
    }

    #[test]
    fn test_min_gauge_take_resets() {
        let gauge = MinGauge::new();
        assert_eq!(gauge.get(), None);
        gauge.record(90);
        gauge.record(40);
        assert_eq!(gauge.take(), Some(40));
        assert_eq!(gauge.take(), None);
    }
}
