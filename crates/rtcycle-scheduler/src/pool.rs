//! The process-wide thread pool.
//!
//! Slot assignment, enabling, disabling and release all run under one
//! registry lock. Steady-state dispatch only takes the lock of the slot being
//! dispatched, which nobody else contends outside (de)registration.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::MAX_THREADS;
use crate::error::{PoolError, ThreadError};
use crate::rt_setup::RtPolicy;
use crate::slot::{Registration, SlotEntry, SlotHandle, Source};
use crate::thread::{ThreadConfig, ThreadStatsSnapshot, WakeMode, Worker, default_threads};

/// Shared pool state referenced by every [`SlotHandle`].
pub(crate) struct PoolInner {
    registry: Mutex<()>,
    workers: Vec<Arc<Worker>>,
}

impl PoolInner {
    fn worker(&self, thread: usize) -> Option<&Arc<Worker>> {
        self.workers.get(thread)
    }

    fn fd_in_use(&self, fd: i32) -> bool {
        self.workers
            .iter()
            .flat_map(|w| w.slots.iter())
            .any(|slot| {
                let entry = slot.lock();
                entry.used && entry.fd() == Some(fd)
            })
    }

    fn register(self: &Arc<Self>, registration: Registration) -> Result<SlotHandle, PoolError> {
        let _registry = self.registry.lock();
        let Registration {
            capabilities,
            source,
            handler,
            timeout,
        } = registration;

        if let Source::Fd { fd, .. } = &source
            && self.fd_in_use(*fd)
        {
            return Err(PoolError::DuplicateFd(*fd));
        }

        let wanted = match &source {
            Source::Fd { .. } => WakeMode::Readiness,
            Source::Deadline(wake) => WakeMode::Deadline(wake.domain()),
        };

        for worker in &self.workers {
            if !worker.config.capabilities.contains(capabilities) {
                continue;
            }
            if worker.active() > 0 && worker.mode() != Some(wanted) {
                continue;
            }
            let Some(slot) = worker.free_slot() else {
                continue;
            };
            let Some(cell) = worker.slots.get(slot) else {
                continue;
            };

            if let Source::Fd { fd, interest } = &source {
                let token = u64::try_from(slot).unwrap_or(u64::MAX);
                worker
                    .epoll
                    .add(*fd, *interest, token)
                    .map_err(|source| PoolError::Multiplexer {
                        op: "add",
                        thread: worker.index,
                        source,
                    })?;
            }

            let generation = {
                let mut entry = cell.lock();
                *entry = SlotEntry {
                    used: true,
                    enabled: true,
                    generation: entry.generation,
                    source: Some(source),
                    handler: Some(handler),
                    timeout_budget_ns: timeout.map(|t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX)),
                    idle_ns: 0,
                    timeouts: 0,
                };
                entry.generation
            };
            worker.active.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
            worker.set_mode(Some(wanted));
            debug!(thread = worker.index, slot, %capabilities, ?wanted, "slot registered");

            return Ok(SlotHandle {
                pool: Arc::clone(self),
                thread: worker.index,
                slot,
                generation,
                released: false,
            });
        }

        Err(PoolError::NoCapableThread(capabilities))
    }

    pub(crate) fn set_enabled(&self, handle: &SlotHandle, enable: bool) -> Result<(), PoolError> {
        let _registry = self.registry.lock();
        let stale = PoolError::StaleSlot {
            thread: handle.thread,
            slot: handle.slot,
        };
        let Some(worker) = self.worker(handle.thread) else {
            return Err(stale);
        };
        let Some(cell) = worker.slots.get(handle.slot) else {
            return Err(stale);
        };
        let mut entry = cell.lock();
        if !entry.used || entry.generation != handle.generation {
            return Err(stale);
        }
        if entry.enabled == enable {
            return Ok(());
        }

        if let Some(Source::Fd { fd, interest }) = &entry.source {
            let result = if enable {
                let token = u64::try_from(handle.slot).unwrap_or(u64::MAX);
                worker.epoll.add(*fd, *interest, token)
            } else {
                worker.epoll.delete(*fd)
            };
            result.map_err(|source| PoolError::Multiplexer {
                op: if enable { "add" } else { "delete" },
                thread: worker.index,
                source,
            })?;
        }
        entry.enabled = enable;
        Ok(())
    }

    pub(crate) fn is_enabled(&self, handle: &SlotHandle) -> bool {
        self.entry_field(handle, |e| e.enabled).unwrap_or(false)
    }

    pub(crate) fn timeouts(&self, handle: &SlotHandle) -> u64 {
        self.entry_field(handle, |e| e.timeouts).unwrap_or(0)
    }

    fn entry_field<T>(&self, handle: &SlotHandle, f: impl FnOnce(&SlotEntry) -> T) -> Option<T> {
        let cell = self.worker(handle.thread)?.slots.get(handle.slot)?;
        let entry = cell.lock();
        (entry.used && entry.generation == handle.generation).then(|| f(&entry))
    }

    pub(crate) fn release(&self, handle: &SlotHandle) -> Result<(), PoolError> {
        let stale = PoolError::StaleSlot {
            thread: handle.thread,
            slot: handle.slot,
        };
        let handler = {
            let _registry = self.registry.lock();
            let Some(worker) = self.worker(handle.thread) else {
                return Err(stale);
            };
            let Some(cell) = worker.slots.get(handle.slot) else {
                return Err(stale);
            };
            let mut entry = cell.lock();
            if !entry.used || entry.generation != handle.generation {
                return Err(stale);
            }

            if entry.enabled
                && let Some(fd) = entry.fd()
                && let Err(err) = worker.epoll.delete(fd)
            {
                warn!(thread = worker.index, slot = handle.slot, fd, %err, "multiplexer delete failed on release");
            }
            if let Some(wake) = entry.wake() {
                wake.disarm();
            }
            let handler = entry.vacate();

            let previous = worker.active.fetch_sub(1, std::sync::atomic::Ordering::AcqRel);
            if previous <= 1 {
                worker.set_mode(None);
            }
            debug!(thread = worker.index, slot = handle.slot, "slot released");
            handler
        };
        // Dropped outside every lock: a handler may own the last reference to
        // something that releases another slot.
        drop(handler);
        Ok(())
    }
}

/// Fixed pool of real-time threads.
pub struct ThreadPool {
    inner: Arc<PoolInner>,
    handles: Mutex<Vec<(usize, JoinHandle<Result<(), ThreadError>>)>>,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("threads", &self.inner.workers.len())
            .finish_non_exhaustive()
    }
}

impl ThreadPool {
    /// Create one thread per configuration and start them.
    ///
    /// # Errors
    ///
    /// [`PoolError::TooManyThreads`] above [`MAX_THREADS`] configurations,
    /// [`PoolError::Spawn`] if a multiplexer or OS thread cannot be created;
    /// threads started before the failure are stopped again.
    pub fn start(configs: Vec<ThreadConfig>, policy: RtPolicy) -> Result<Self, PoolError> {
        if configs.len() > MAX_THREADS {
            return Err(PoolError::TooManyThreads(configs.len()));
        }

        let workers = configs
            .into_iter()
            .enumerate()
            .map(|(index, config)| {
                Worker::new(index, config, policy)
                    .map(Arc::new)
                    .map_err(|source| PoolError::Spawn {
                        thread: index,
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pool = Self {
            inner: Arc::new(PoolInner {
                registry: Mutex::new(()),
                workers,
            }),
            handles: Mutex::new(Vec::new()),
        };

        for worker in &pool.inner.workers {
            let body = Arc::clone(worker);
            let spawned = thread::Builder::new()
                .name(format!("rtcycle-{}", worker.index))
                .spawn(move || {
                    let result = body.run();
                    if let Err(err) = &result {
                        error!(thread = body.index, %err, "thread loop failed");
                    }
                    result
                });
            match spawned {
                Ok(handle) => pool.handles.lock().push((worker.index, handle)),
                Err(source) => {
                    let _ = pool.shutdown();
                    return Err(PoolError::Spawn {
                        thread: worker.index,
                        source,
                    });
                }
            }
        }

        info!(threads = pool.inner.workers.len(), ?policy, "thread pool started");
        Ok(pool)
    }

    /// Start the stock thread table.
    ///
    /// # Errors
    ///
    /// See [`ThreadPool::start`].
    pub fn with_default_threads(policy: RtPolicy) -> Result<Self, PoolError> {
        Self::start(default_threads(), policy)
    }

    /// Claim a slot on the first capable thread.
    ///
    /// # Errors
    ///
    /// [`PoolError::DuplicateFd`], [`PoolError::NoCapableThread`] or
    /// [`PoolError::Multiplexer`]; on any error nothing was claimed.
    pub fn register(&self, registration: Registration) -> Result<SlotHandle, PoolError> {
        self.inner.register(registration)
    }

    /// Number of threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.inner.workers.len()
    }

    /// Occupied slots of `thread`.
    #[must_use]
    pub fn active_slots(&self, thread: usize) -> Option<usize> {
        self.inner.worker(thread).map(|w| w.active())
    }

    /// Current wake mode of `thread`; `None` while it has no slots.
    #[must_use]
    pub fn wake_mode(&self, thread: usize) -> Option<WakeMode> {
        self.inner.worker(thread).and_then(|w| w.mode())
    }

    /// True while `thread` is inside its dispatch loop.
    #[must_use]
    pub fn is_looping(&self, thread: usize) -> bool {
        self.inner.worker(thread).is_some_and(|w| w.is_looping())
    }

    /// Take the pending statistics snapshot of every thread that has one.
    #[must_use]
    pub fn take_thread_stats(&self) -> Vec<ThreadStatsSnapshot> {
        self.inner
            .workers
            .iter()
            .filter_map(|w| w.take_stats())
            .collect()
    }

    /// Signal every thread to exit and join them.
    ///
    /// Returns the fatal errors threads ended with. Calling it again returns
    /// an empty list.
    pub fn shutdown(&self) -> Vec<ThreadError> {
        for worker in &self.inner.workers {
            worker.request_exit();
        }
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        let mut failures = Vec::new();
        for (index, handle) in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => failures.push(err),
                Err(_) => {
                    error!(thread = index, "RT thread panicked");
                    failures.push(ThreadError::Panicked(index));
                }
            }
        }
        if !failures.is_empty() {
            warn!(count = failures.len(), "threads ended with errors");
        }
        failures
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
