//! rtcycle - reference cyclic deployment
//!
//! Runs the controller and the first IO device of the default task table on
//! one real-time pool, exchanging frames over loopback UDP, and logs thread
//! and task statistics once per second until interrupted.

#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod handlers;
mod reporter;

use std::sync::Arc;

use anyhow::{Context, Result};
use rtcycle_cyclic::{CyclicTask, DEFAULT_BASE_PORT, TaskRole, UdpTransport, default_table, loopback_streams};
use rtcycle_scheduler::{Clock, RtPolicy, SystemClock, ThreadPool};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::handlers::{Controller, IoDevice};
use crate::reporter::Reporter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtcycle=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let pool = Arc::new(ThreadPool::with_default_threads(RtPolicy::BestEffort).context("starting thread pool")?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::monotonic());
    let mut transport = UdpTransport::new(loopback_streams(DEFAULT_BASE_PORT), Arc::clone(&clock));

    let mut tasks = Vec::new();
    for descriptor in default_table() {
        let task = match descriptor.role {
            TaskRole::Controller => {
                CyclicTask::register(&pool, &descriptor, &mut transport, Arc::clone(&clock), Controller::default())
            }
            TaskRole::IoDevice0 => {
                CyclicTask::register(&pool, &descriptor, &mut transport, Arc::clone(&clock), IoDevice::default())
            }
            // Both devices listen on the controller's stream; one per host.
            TaskRole::IoDevice1 => continue,
        }
        .with_context(|| format!("registering {:?}", descriptor.role))?;
        tasks.push(Arc::new(task));
    }

    for task in &tasks {
        task.start().with_context(|| format!("starting task {}", task.id()))?;
    }
    let reporter = Reporter::spawn(&pool, tasks.clone()).context("starting statistics reporter")?;
    info!(tasks = tasks.len(), "cyclic tasks running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutting down");

    if let Err(err) = reporter.exit() {
        warn!(%err, "stopping reporter failed");
    }
    for task in &tasks {
        if let Err(err) = task.stop() {
            warn!(task = task.id(), %err, "stop failed");
        }
    }
    // Dropping the last reference deregisters each task.
    drop(tasks);

    for err in pool.shutdown() {
        warn!(%err, "thread ended with error");
    }
    Ok(())
}
