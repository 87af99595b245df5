//! Bounded fixed-width histograms.
//!
//! Storage is an inline array of [`MAX_HISTOGRAM_BUCKETS`] counters so a
//! histogram can be copied into a snapshot without touching the allocator.
//! Samples beyond the last configured bucket are clamped into it.

use core::fmt;

/// Upper bound on configurable buckets.
pub const MAX_HISTOGRAM_BUCKETS: usize = 256;

/// Invalid histogram geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HistogramError {
    /// Bucket count is zero or above [`MAX_HISTOGRAM_BUCKETS`].
    #[error("invalid bucket count {0} (expected 1..=256)")]
    BucketCount(usize),
    /// Bucket width is zero.
    #[error("bucket width must be non-zero")]
    BucketWidth,
}

/// Fixed-width histogram.
#[derive(Clone, Copy)]
pub struct Histogram {
    buckets: [u64; MAX_HISTOGRAM_BUCKETS],
    len: usize,
    width: u64,
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Histogram")
            .field("len", &self.len)
            .field("width", &self.width)
            .field("total", &self.total())
            .finish()
    }
}

impl PartialEq for Histogram {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.buckets() == other.buckets()
    }
}

impl Eq for Histogram {}

impl Histogram {
    /// Create a histogram of `buckets` buckets, each `width` units wide.
    ///
    /// # Errors
    ///
    /// Returns [`HistogramError`] when `buckets` is outside
    /// `1..=MAX_HISTOGRAM_BUCKETS` or `width` is zero.
    pub const fn new(buckets: usize, width: u64) -> Result<Self, HistogramError> {
        if buckets == 0 || buckets > MAX_HISTOGRAM_BUCKETS {
            return Err(HistogramError::BucketCount(buckets));
        }
        if width == 0 {
            return Err(HistogramError::BucketWidth);
        }
        Ok(Self {
            buckets: [0; MAX_HISTOGRAM_BUCKETS],
            len: buckets,
            width,
        })
    }

    /// Width of one bucket.
    #[must_use]
    pub const fn bucket_width(&self) -> u64 {
        self.width
    }

    /// Number of configured buckets.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always false; a histogram has at least one bucket.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of the bucket `value` falls into.
    #[must_use]
    pub fn bucket_for(&self, value: u64) -> usize {
        let last = self.len.saturating_sub(1);
        usize::try_from(value / self.width).map_or(last, |idx| idx.min(last))
    }

    /// Count one sample.
    #[inline]
    pub fn record(&mut self, value: u64) {
        let idx = self.bucket_for(value);
        if let Some(slot) = self.buckets.get_mut(idx) {
            *slot = slot.saturating_add(1);
        }
    }

    /// Count of the bucket that `value` would land in.
    #[must_use]
    pub fn count_at(&self, value: u64) -> u64 {
        self.buckets.get(self.bucket_for(value)).copied().unwrap_or(0)
    }

    /// Configured buckets.
    #[must_use]
    pub fn buckets(&self) -> &[u64] {
        self.buckets.get(..self.len).unwrap_or(&[])
    }

    /// Sum of all buckets.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.buckets().iter().fold(0_u64, |acc, n| acc.saturating_add(*n))
    }

    /// Zero every bucket.
    pub fn reset(&mut self) {
        self.buckets = [0; MAX_HISTOGRAM_BUCKETS];
    }

    /// Non-empty buckets as `(lower_bound, count)`.
    pub fn occupied(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        let width = self.width;
        self.buckets()
            .iter()
            .zip(0_u64..)
            .filter(|(count, _)| **count != 0)
            .map(move |(count, idx)| (idx.saturating_mul(width), *count))
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (lower, count) in self.occupied() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{lower}:{count}")?;
            first = false;
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_is_validated() {
        assert_eq!(Histogram::new(0, 10).err(), Some(HistogramError::BucketCount(0)));
        assert_eq!(
            Histogram::new(MAX_HISTOGRAM_BUCKETS + 1, 10).err(),
            Some(HistogramError::BucketCount(MAX_HISTOGRAM_BUCKETS + 1))
        );
        assert_eq!(Histogram::new(4, 0).err(), Some(HistogramError::BucketWidth));
    }

    #[test]
    fn test_record_and_clamp() -> Result<(), HistogramError> {
        let mut hist = Histogram::new(100, 10_000)?;
        hist.record(50_000);
        hist.record(59_999);
        hist.record(u64::MAX);
        hist.record(5_000_000);

        assert_eq!(hist.count_at(50_000), 2);
        assert_eq!(hist.bucket_for(50_000), 5);
        assert_eq!(hist.buckets().get(99).copied(), Some(2));
        assert_eq!(hist.total(), 4);
        Ok(())
    }

    #[test]
    fn test_reset_and_display() -> Result<(), HistogramError> {
        let mut hist = Histogram::new(4, 1_000)?;
        assert_eq!(hist.to_string(), "-");
        hist.record(1_500);
        hist.record(3_999);
        assert_eq!(hist.to_string(), "1000:1 3000:1");
        hist.reset();
        assert_eq!(hist.total(), 0);
        assert_eq!(hist.len(), 4);
        Ok(())
    }
}
