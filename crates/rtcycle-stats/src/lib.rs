//! # rtcycle-stats
//!
//! Statistics primitives for fixed-period real-time loops.
//!
//! Everything in this crate is sized at construction time, so the tick path
//! never allocates:
//!
//! - [`running`] - incremental min/max/mean/mean-of-squares over a window
//! - [`histogram`] - bounded fixed-width bucket histograms
//! - [`snapshot`] - single-slot hand-off of a snapshot from the RT thread to a reader
//! - [`monitor`] - atomic peak gauges read and reset from another thread
//!
//! ## Usage
//!
//! ```rust
//! use rtcycle_stats::{Histogram, RunningStats, SnapshotCell};
//!
//! let mut stats = RunningStats::new();
//! let mut hist = Histogram::new(100, 10_000)?;
//!
//! for sample in [12_000_i64, 48_000, 3_000] {
//!     stats.update(sample);
//!     hist.record(sample.unsigned_abs());
//! }
//!
//! let cell = SnapshotCell::new();
//! assert!(cell.publish(stats.summary()).is_ok());
//! // A second publish is refused until the reader takes the first one.
//! assert!(cell.publish(stats.summary()).is_err());
//! assert_eq!(cell.take().map(|s| s.count), Some(3));
//! # Ok::<(), rtcycle_stats::HistogramError>(())
//! ```

#![deny(
    unsafe_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]

pub mod histogram;
pub mod monitor;
pub mod running;
pub mod snapshot;

pub mod prelude;

pub use histogram::{Histogram, HistogramError, MAX_HISTOGRAM_BUCKETS};
pub use monitor::{MaxGauge, MinGauge};
pub use running::{RunningStats, StatsSummary};
pub use snapshot::SnapshotCell;

/// Nanoseconds per second.
pub const NSEC_PER_SEC: u64 = 1_000_000_000;
