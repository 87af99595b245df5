//! Static task table.
//!
//! Tasks are described up front by [`TaskDescriptor`]s and a [`StreamTable`]
//! mapping stream ids to socket addresses. [`default_table`] reproduces the
//! reference deployment: one controller talking to two IO devices on a 2 ms
//! period, the devices running half a period behind the controller.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use rtcycle_scheduler::{Capabilities, ClockDomain, TimerKind, TimerOptions};
use rtcycle_stats::NSEC_PER_SEC;
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Peers a task can receive from.
pub const MAX_PEERS: usize = 2;

/// Default task period.
pub const DEFAULT_PERIOD_NS: u64 = 2_000_000;

/// Default send and receive buffer size.
pub const DEFAULT_PACKET_SIZE: usize = 128;

/// Schedule error above which a tick counts as late.
pub const SCHEDULE_LATENCY_THRESHOLD_NS: u64 = 250_000;

/// Seconds between two statistics reports.
pub const DEFAULT_STATS_PERIOD_SEC: u64 = 10;

/// Time without a tick after which a running task reports a timeout.
pub const DEFAULT_TICK_TIMEOUT: Duration = Duration::from_secs(1);

/// First UDP port of the default stream table.
pub const DEFAULT_BASE_PORT: u16 = 47_800;

/// True when `period_ns` is non-zero and divides one second.
#[must_use]
pub const fn is_valid_period(period_ns: u64) -> bool {
    period_ns != 0 && NSEC_PER_SEC % period_ns == 0
}

/// Part a task plays in the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRole {
    /// Sends commands, runs at phase zero.
    Controller,
    /// First IO device.
    IoDevice0,
    /// Second IO device.
    IoDevice1,
}

impl TaskRole {
    /// Phase offset of the role for a given transfer time.
    #[must_use]
    pub const fn offset_ns(self, transfer_time_ns: u64) -> u64 {
        match self {
            Self::Controller => 0,
            Self::IoDevice0 | Self::IoDevice1 => transfer_time_ns,
        }
    }

    /// Task id used in frame headers.
    #[must_use]
    pub const fn id(self) -> u16 {
        match self {
            Self::Controller => 0,
            Self::IoDevice0 => 1,
            Self::IoDevice1 => 2,
        }
    }
}

/// Timing and resource parameters of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskParams {
    /// Period; must divide one second.
    pub period_ns: u64,
    /// Phase within the period.
    pub offset_ns: u64,
    /// Budget between a peer's send and this task's receive.
    pub transfer_time_ns: u64,
    /// Clock the timer and timestamps run on.
    pub clock: ClockDomain,
    /// Timer backend.
    pub timer: TimerKind,
    /// Adaptive timer tunables.
    pub timer_options: TimerOptions,
    /// Thread capabilities the tick slot needs.
    pub capabilities: Capabilities,
    /// Send and receive buffer size.
    pub packet_size: usize,
    /// Schedule error above which a tick counts as late.
    pub late_threshold_ns: u64,
    /// Seconds between statistics reports.
    pub stats_period_sec: u64,
    /// Silence after which a running task counts a timeout.
    pub tick_timeout: Option<Duration>,
}

impl TaskParams {
    /// Parameters for `role` at `period_ns`, transfer time half a period.
    #[must_use]
    pub const fn for_role(role: TaskRole, period_ns: u64) -> Self {
        let transfer_time_ns = period_ns / 2;
        Self {
            period_ns,
            offset_ns: role.offset_ns(transfer_time_ns),
            transfer_time_ns,
            clock: ClockDomain::Monotonic,
            timer: TimerKind::Adaptive,
            timer_options: TimerOptions {
                max_catchup: rtcycle_scheduler::DEFAULT_MAX_CATCHUP,
                early_tolerance: None,
            },
            capabilities: Capabilities::TSN_LOOP,
            packet_size: DEFAULT_PACKET_SIZE,
            late_threshold_ns: SCHEDULE_LATENCY_THRESHOLD_NS,
            stats_period_sec: DEFAULT_STATS_PERIOD_SEC,
            tick_timeout: Some(DEFAULT_TICK_TIMEOUT),
        }
    }

    /// Scheduled periods between two statistics reports.
    #[must_use]
    pub const fn report_interval(&self) -> u64 {
        if self.period_ns == 0 {
            return 0;
        }
        self.stats_period_sec.saturating_mul(NSEC_PER_SEC / self.period_ns)
    }
}

/// One peer a task receives from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerBinding {
    /// Task id expected in the frames' source field.
    pub peer_id: u16,
    /// Stream the peer sends on.
    pub stream: u16,
}

/// Static description of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Role in the deployment.
    pub role: TaskRole,
    /// Task id written into transmitted headers.
    pub id: u16,
    /// Timing and resources.
    pub params: TaskParams,
    /// Configured peers, in receive order.
    pub peers: Vec<PeerBinding>,
    /// Peers actually opened, a prefix of `peers`.
    pub num_peers: usize,
    /// Stream this task transmits on, if any.
    pub tx_stream: Option<u16>,
}

impl TaskDescriptor {
    /// Descriptor for `role` with the role's default id and no sockets.
    #[must_use]
    pub const fn new(role: TaskRole, period_ns: u64) -> Self {
        Self {
            role,
            id: role.id(),
            params: TaskParams::for_role(role, period_ns),
            peers: Vec::new(),
            num_peers: 0,
            tx_stream: None,
        }
    }

    /// Append a peer and open it.
    #[must_use]
    pub fn with_peer(mut self, peer_id: u16, stream: u16) -> Self {
        self.peers.push(PeerBinding { peer_id, stream });
        self.num_peers = self.peers.len();
        self
    }

    /// Transmit on `stream`.
    #[must_use]
    pub fn with_tx_stream(mut self, stream: u16) -> Self {
        self.tx_stream = Some(stream);
        self
    }

    /// Replace the parameters.
    #[must_use]
    pub fn with_params(mut self, params: TaskParams) -> Self {
        self.params = params;
        self
    }

    /// Change the period, recomputing transfer time and role offset.
    ///
    /// Only meaningful before the task is registered.
    pub const fn set_period(&mut self, period_ns: u64) {
        let transfer_time_ns = period_ns / 2;
        self.params.period_ns = period_ns;
        self.params.transfer_time_ns = transfer_time_ns;
        self.params.offset_ns = self.role.offset_ns(transfer_time_ns);
    }

    /// Open only the first `num_peers` peers.
    ///
    /// # Errors
    ///
    /// [`TaskError::TooManyPeers`] above [`MAX_PEERS`] or the configured peers.
    pub fn set_num_peers(&mut self, num_peers: usize) -> Result<(), TaskError> {
        let max = self.peers.len().min(MAX_PEERS);
        if num_peers > max {
            return Err(TaskError::TooManyPeers {
                requested: num_peers,
                max,
            });
        }
        self.num_peers = num_peers;
        Ok(())
    }

    /// Peers that will be opened.
    #[must_use]
    pub fn active_peers(&self) -> &[PeerBinding] {
        self.peers.get(..self.num_peers).unwrap_or(&self.peers)
    }

    /// Check peer bounds before registration.
    ///
    /// # Errors
    ///
    /// [`TaskError::TooManyPeers`].
    pub fn validate(&self) -> Result<(), TaskError> {
        let max = self.peers.len().min(MAX_PEERS);
        if self.num_peers > max {
            return Err(TaskError::TooManyPeers {
                requested: self.num_peers,
                max,
            });
        }
        Ok(())
    }
}

/// Stream id to socket address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamTable {
    streams: BTreeMap<u16, SocketAddr>,
}

impl StreamTable {
    /// Empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            streams: BTreeMap::new(),
        }
    }

    /// Add or replace a stream.
    #[must_use]
    pub fn with_stream(mut self, stream: u16, addr: SocketAddr) -> Self {
        self.streams.insert(stream, addr);
        self
    }

    /// Address of `stream`.
    #[must_use]
    pub fn get(&self, stream: u16) -> Option<SocketAddr> {
        self.streams.get(&stream).copied()
    }

    /// Configured streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// True without streams.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

/// Loopback streams 0..=2 on consecutive ports from `base_port`.
#[must_use]
pub fn loopback_streams(base_port: u16) -> StreamTable {
    (0..3_u16).fold(StreamTable::new(), |table, stream| {
        let port = base_port.saturating_add(stream);
        table.with_stream(stream, SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    })
}

/// The reference deployment.
///
/// The controller sends on stream 0 and listens to the devices on streams 1
/// and 2 (only the first one opened by default); each device listens to the
/// controller on stream 0 and answers on its own stream.
#[must_use]
pub fn default_table() -> Vec<TaskDescriptor> {
    let controller_id = TaskRole::Controller.id();
    let io0 = TaskRole::IoDevice0.id();
    let io1 = TaskRole::IoDevice1.id();

    let mut controller = TaskDescriptor::new(TaskRole::Controller, DEFAULT_PERIOD_NS)
        .with_peer(io0, 1)
        .with_peer(io1, 2)
        .with_tx_stream(0);
    controller.num_peers = 1;

    vec![
        controller,
        TaskDescriptor::new(TaskRole::IoDevice0, DEFAULT_PERIOD_NS)
            .with_peer(controller_id, 0)
            .with_tx_stream(1),
        TaskDescriptor::new(TaskRole::IoDevice1, DEFAULT_PERIOD_NS)
            .with_peer(controller_id, 0)
            .with_tx_stream(2),
    ]
}
