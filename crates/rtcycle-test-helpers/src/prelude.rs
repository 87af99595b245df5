//! Common imports for test files.

pub use crate::clock::ManualClock;
pub use crate::must::{must, must_err, must_some, must_with};
pub use crate::wait::wait_until;

#[cfg(feature = "mock")]
pub use crate::mock::{MockTransport, frame};

/// Result type for tests that use `?`.
pub type TestResult = Result<(), Box<dyn std::error::Error>>;
