//! Controller and IO device exchanging frames over loopback UDP.

use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rtcycle_cyclic::{
    Cycle, CyclicHandler, CyclicTask, RxMessage, StreamTable, TaskRole, Transport, UdpTransport, default_table,
};
use rtcycle_scheduler::{Capabilities, Clock, RtPolicy, SystemClock, ThreadConfig, ThreadPool};
use rtcycle_test_helpers::prelude::*;

/// Counts accepted frames and answers every cycle.
struct Echo {
    accepted: Arc<AtomicU64>,
    last_latency: Arc<AtomicU64>,
    tx_errors: u64,
}

impl CyclicHandler for Echo {
    fn on_receive(&mut self, msg: &RxMessage<'_>) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.last_latency.store(msg.latency_ns.unsigned_abs(), Ordering::Relaxed);
    }

    fn on_cycle(&mut self, cycle: &mut Cycle<'_>) {
        if cycle.transmit(1, b"state").is_err() {
            self.tx_errors += 1;
        }
    }
}

/// Loopback table on ports the OS just handed out.
fn free_streams() -> Result<StreamTable, std::io::Error> {
    let probes = (0..3)
        .map(|_| UdpSocket::bind("127.0.0.1:0"))
        .collect::<Result<Vec<_>, _>>()?;
    let mut table = StreamTable::new();
    for (stream, probe) in (0_u16..).zip(&probes) {
        table = table.with_stream(stream, probe.local_addr()?);
    }
    Ok(table)
}

#[test]
fn test_unknown_stream_is_reported() -> TestResult {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::monotonic());
    let mut transport = UdpTransport::new(StreamTable::new(), clock);
    assert!(matches!(
        transport.open_rx(9),
        Err(rtcycle_cyclic::NetError::UnknownStream(9))
    ));
    Ok(())
}

#[test]
fn test_controller_and_device_exchange_frames() -> TestResult {
    let pool = ThreadPool::start(
        vec![ThreadConfig::new(Capabilities::TSN_LOOP | Capabilities::TIMER, 4)],
        RtPolicy::Disabled,
    )?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::monotonic());
    let mut transport = UdpTransport::new(free_streams()?, Arc::clone(&clock));

    let mut descriptors = default_table().into_iter();
    let controller_desc = must_some(descriptors.next(), "controller");
    let device_desc = must_some(descriptors.next(), "io device 0");
    assert_eq!(device_desc.role, TaskRole::IoDevice0);

    let at_controller = Arc::new(AtomicU64::new(0));
    let at_device = Arc::new(AtomicU64::new(0));
    let controller = CyclicTask::register(
        &pool,
        &controller_desc,
        &mut transport,
        Arc::clone(&clock),
        Echo {
            accepted: Arc::clone(&at_controller),
            last_latency: Arc::new(AtomicU64::new(0)),
            tx_errors: 0,
        },
    )?;
    let device_latency = Arc::new(AtomicU64::new(0));
    let device = CyclicTask::register(
        &pool,
        &device_desc,
        &mut transport,
        Arc::clone(&clock),
        Echo {
            accepted: Arc::clone(&at_device),
            last_latency: Arc::clone(&device_latency),
            tx_errors: 0,
        },
    )?;

    controller.start()?;
    device.start()?;
    assert!(wait_until(Duration::from_secs(6), || {
        at_controller.load(Ordering::Relaxed) >= 10 && at_device.load(Ordering::Relaxed) >= 10
    }));
    assert!(device_latency.load(Ordering::Relaxed) > 0);
    assert_eq!(controller.state(), rtcycle_cyclic::TaskState::Running);

    device.deregister()?;
    controller.deregister()?;
    Ok(())
}
