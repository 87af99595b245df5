//! Real-time setup applied by each pool thread before it enters its loop.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ThreadError;
use crate::platform;

/// How strictly a thread's real-time settings are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RtPolicy {
    /// Failing to switch to `SCHED_FIFO` ends the thread.
    #[default]
    Required,
    /// Failures are logged and the thread runs with whatever it got.
    BestEffort,
    /// Leave scheduling policy and affinity untouched.
    Disabled,
}

/// Real-time parameters for one thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtSetup {
    /// `SCHED_FIFO` priority, `None` to keep the inherited policy.
    pub priority: Option<i32>,
    /// Core to pin to, `None` for no affinity.
    pub cpu: Option<usize>,
    /// Lock current and future pages (process-wide).
    pub lock_memory: bool,
    /// Enforcement of the settings above.
    pub policy: RtPolicy,
}

impl Default for RtSetup {
    fn default() -> Self {
        Self {
            priority: Some(60),
            cpu: None,
            lock_memory: false,
            policy: RtPolicy::Required,
        }
    }
}

impl RtSetup {
    /// Default setup: FIFO priority 60, required.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// No real-time settings at all.
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            priority: None,
            cpu: None,
            lock_memory: false,
            policy: RtPolicy::Disabled,
        }
    }

    /// Try everything, tolerate failure; for unprivileged test runs.
    #[must_use]
    pub fn testing() -> Self {
        Self {
            policy: RtPolicy::BestEffort,
            ..Self::default()
        }
    }

    /// Set the FIFO priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Option<i32>) -> Self {
        self.priority = priority;
        self
    }

    /// Pin to `cpu`.
    #[must_use]
    pub const fn with_cpu(mut self, cpu: Option<usize>) -> Self {
        self.cpu = cpu;
        self
    }

    /// Lock memory.
    #[must_use]
    pub const fn with_lock_memory(mut self, enabled: bool) -> Self {
        self.lock_memory = enabled;
        self
    }

    /// Set the enforcement policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RtPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// True if applying this setup would change anything.
    #[must_use]
    pub const fn has_rt_features(&self) -> bool {
        !matches!(self.policy, RtPolicy::Disabled)
            && (self.priority.is_some() || self.cpu.is_some() || self.lock_memory)
    }

    /// Apply to the calling thread.
    ///
    /// Affinity and memory locking failures are only logged; a priority
    /// failure is fatal under [`RtPolicy::Required`].
    ///
    /// # Errors
    ///
    /// [`ThreadError::Priority`] when `SCHED_FIFO` cannot be set and the
    /// policy is [`RtPolicy::Required`].
    pub fn apply(&self, thread: usize) -> Result<(), ThreadError> {
        if self.policy == RtPolicy::Disabled {
            return Ok(());
        }

        if let Some(priority) = self.priority {
            match platform::set_fifo_priority(priority) {
                Ok(()) => debug!(thread, priority, "SCHED_FIFO set"),
                Err(source) if self.policy == RtPolicy::Required => {
                    return Err(ThreadError::Priority {
                        thread,
                        priority,
                        source,
                    });
                }
                Err(err) => warn!(thread, priority, %err, "running without SCHED_FIFO"),
            }
        }

        if let Some(cpu) = self.cpu {
            match platform::pin_to_cpu(cpu) {
                Ok(()) => debug!(thread, cpu, "pinned"),
                Err(err) => warn!(thread, cpu, %err, "cannot set CPU affinity"),
            }
        }

        if self.lock_memory
            && let Err(err) = platform::lock_memory()
        {
            warn!(thread, %err, "mlockall failed");
        }

        Ok(())
    }
}
