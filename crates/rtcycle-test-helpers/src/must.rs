//! Unwrap helpers for tests.
//!
//! Workspace lints forbid `unwrap()` and `expect()`; these helpers take their
//! place in test code and report the caller's location on failure.

use std::fmt::Debug;

/// Unwrap a `Result`, panicking with the error on `Err`.
///
/// ```rust
/// use rtcycle_test_helpers::must;
///
/// let value = must(Ok::<_, &str>(7));
/// assert_eq!(value, 7);
/// ```
///
/// # Panics
///
/// On `Err`.
#[track_caller]
pub fn must<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("must: unexpected Err: {e:?}"),
    }
}

/// Unwrap a `Result`, naming what was attempted on failure.
///
/// # Panics
///
/// On `Err`.
#[track_caller]
pub fn must_with<T, E: Debug>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("must_with: {context}: {e:?}"),
    }
}

/// Unwrap an `Option`.
///
/// ```rust
/// use rtcycle_test_helpers::must_some;
///
/// assert_eq!(must_some(Some(3), "a value"), 3);
/// ```
///
/// # Panics
///
/// On `None`, with `msg`.
#[track_caller]
pub fn must_some<T>(option: Option<T>, msg: &str) -> T {
    match option {
        Some(v) => v,
        None => panic!("must_some: {msg}"),
    }
}

/// Assert that a `Result` failed and return the error.
///
/// # Panics
///
/// On `Ok`.
#[track_caller]
pub fn must_err<T: Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("must_err: unexpected Ok: {v:?}"),
        Err(e) => e,
    }
}
