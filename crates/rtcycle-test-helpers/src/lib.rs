//! Shared test utilities for rtcycle.
//!
//! # Modules
//!
//! - [`mod@must`] - unwrap helpers with `#[track_caller]` and readable panics
//! - [`clock`] - a [`ManualClock`] tests move by hand
//! - [`wait`] - polling for state changed by pool threads
//! - [`mock`] - in-memory transport for cyclic tasks
//! - [`prelude`] - convenience re-exports
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! rtcycle-test-helpers = { workspace = true }
//! ```
//!
//! ```rust,ignore
//! use rtcycle_test_helpers::prelude::*;
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::unwrap_used, clippy::panic)]

pub mod clock;
pub mod must;
pub mod prelude;
pub mod wait;

#[cfg(feature = "mock")]
pub mod mock;

pub use clock::ManualClock;
pub use must::*;
pub use wait::wait_until;
