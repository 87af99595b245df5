//! Polling helpers for state owned by pool threads.

use std::time::{Duration, Instant};

/// Poll `condition` every millisecond until it holds or `timeout` passes.
///
/// Returns whether the condition held.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_until_true_and_timeout() {
        let mut calls = 0;
        assert!(wait_until(Duration::from_secs(1), || {
            calls += 1;
            calls >= 3
        }));
        assert!(!wait_until(Duration::from_millis(5), || false));
    }
}
