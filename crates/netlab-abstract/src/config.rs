use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::congestion::CongestionAlgorithm;
use crate::units::{DataRate, SimTime};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid data rate '{0}' (expected e.g. 1Mbps, 300Kbps)")]
    InvalidDataRate(String),
    #[error("unknown congestion control '{0}'; expected one of: {names}", names = CongestionAlgorithm::names().join(", "))]
    UnknownProtocol(String),
    #[error("error rate {0} is outside [0, 1]")]
    ErrorRateOutOfRange(f64),
    #[error("{0} must be non-zero")]
    Zero(&'static str),
    #[error("flow {flow}: window [{start}, {stop}] must satisfy start < stop <= horizon ({horizon})")]
    InvalidWindow {
        flow: u32,
        start: SimTime,
        stop: SimTime,
        horizon: SimTime,
    },
    #[error("flow {flow}: sink activates at {sink_start}, after the source starts at {start}")]
    SinkActivatedLate {
        flow: u32,
        sink_start: SimTime,
        start: SimTime,
    },
    #[error("flow {flow}: port {base} + {offset} is past 65535")]
    PortOutOfRange { flow: u32, base: u16, offset: usize },
}

/// How the receive error model interprets `error_rate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorUnit {
    /// Probability that a packet is corrupted.
    #[default]
    Packet,
    /// Probability that a byte is corrupted; a packet survives only if every byte does.
    Byte,
}

/// The bottleneck point-to-point link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub data_rate: DataRate,
    pub delay: SimTime,
    /// DropTail capacity of each transmit queue, in packets.
    pub queue_capacity: usize,
    /// Receive error rate on the sink-side device.
    pub error_rate: f64,
    pub error_unit: ErrorUnit,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            data_rate: DataRate::from_mbps(1),
            delay: SimTime::from_millis(10),
            queue_capacity: 25,
            error_rate: 1e-6,
            error_unit: ErrorUnit::Packet,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpConfig {
    pub congestion: CongestionAlgorithm,
    /// Maximum payload bytes per segment.
    pub segment_size: u32,
    /// Receiver advertised window in bytes.
    pub receive_window: u32,
    pub initial_cwnd_segments: u32,
    pub initial_ssthresh: u32,
    pub initial_rto: SimTime,
    pub min_rto: SimTime,
    pub max_rto: SimTime,
    pub dupack_threshold: u32,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            congestion: CongestionAlgorithm::default(),
            segment_size: 536,
            receive_window: 8192,
            initial_cwnd_segments: 1,
            initial_ssthresh: 65535,
            initial_rto: SimTime::from_secs(1),
            min_rto: SimTime::from_secs(1),
            max_rto: SimTime::from_secs(60),
            dupack_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    pub seed: u64,
    /// Run horizon; events scheduled after it never execute.
    pub horizon: SimTime,
    pub link: LinkConfig,
    pub tcp: TcpConfig,
    /// Record enqueue/dequeue/receive/drop events for the ASCII link trace.
    pub link_tracing: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            horizon: SimTime::from_millis(1800),
            link: LinkConfig::default(),
            tcp: TcpConfig::default(),
            link_tracing: false,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.link.error_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::ErrorRateOutOfRange(rate));
        }
        if self.link.data_rate.bps() == 0 {
            return Err(ConfigError::Zero("link data rate"));
        }
        if self.link.queue_capacity == 0 {
            return Err(ConfigError::Zero("queue capacity"));
        }
        if self.tcp.segment_size == 0 {
            return Err(ConfigError::Zero("segment size"));
        }
        if self.tcp.receive_window < self.tcp.segment_size {
            return Err(ConfigError::Zero("receive window (in segments)"));
        }
        if self.tcp.initial_cwnd_segments == 0 {
            return Err(ConfigError::Zero("initial congestion window"));
        }
        if self.horizon == SimTime::ZERO {
            return Err(ConfigError::Zero("horizon"));
        }
        Ok(())
    }
}
