//! Common imports.
//!
//! ```rust
//! use rtcycle_stats::prelude::*;
//! ```

pub use crate::histogram::{Histogram, HistogramError, MAX_HISTOGRAM_BUCKETS};
pub use crate::monitor::{MaxGauge, MinGauge};
pub use crate::running::{RunningStats, StatsSummary};
pub use crate::snapshot::SnapshotCell;
