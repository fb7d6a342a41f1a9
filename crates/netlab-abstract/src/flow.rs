use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use crate::config::ConfigError;
use crate::units::{DataRate, SimTime};

/// Identifier the flow classifier assigns, starting at 1 in order of first packet.
pub type FlowId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Classifier key: (source, destination, protocol, ports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FiveTuple {
    pub source: Endpoint,
    pub destination: Endpoint,
    pub protocol: Protocol,
}

impl FiveTuple {
    pub fn reversed(&self) -> FiveTuple {
        FiveTuple {
            source: self.destination,
            destination: self.source,
            protocol: self.protocol,
        }
    }
}

impl fmt::Display for FiveTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proto = match self.protocol {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        };
        write!(f, "{} > {} {proto}", self.source, self.destination)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowKind {
    /// Greedy TCP sender; `max_bytes == 0` means unlimited.
    TcpBulk { max_bytes: u64 },
    /// UDP on/off source that is always "on".
    UdpCbr { packet_size: u32, rate: DataRate },
}

/// One source/sink pair handed to the engine before the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSpec {
    pub id: u32,
    pub kind: FlowKind,
    pub source: Endpoint,
    pub sink: Endpoint,
    pub start: SimTime,
    pub stop: SimTime,
    pub sink_start: SimTime,
    pub sink_stop: SimTime,
}

impl FlowSpec {
    pub fn protocol(&self) -> Protocol {
        match self.kind {
            FlowKind::TcpBulk { .. } => Protocol::Tcp,
            FlowKind::UdpCbr { .. } => Protocol::Udp,
        }
    }

    pub fn five_tuple(&self) -> FiveTuple {
        FiveTuple {
            source: self.source,
            destination: self.sink,
            protocol: self.protocol(),
        }
    }

    pub fn is_active_at(&self, t: SimTime) -> bool {
        self.start <= t && t < self.stop
    }

    pub fn validate(&self, horizon: SimTime) -> Result<(), ConfigError> {
        if self.start >= self.stop || self.stop > horizon {
            return Err(ConfigError::InvalidWindow {
                flow: self.id,
                start: self.start,
                stop: self.stop,
                horizon,
            });
        }
        if self.sink_start > self.start {
            return Err(ConfigError::SinkActivatedLate {
                flow: self.id,
                sink_start: self.sink_start,
                start: self.start,
            });
        }
        if let FlowKind::UdpCbr { packet_size, rate } = self.kind {
            if packet_size == 0 {
                return Err(ConfigError::Zero("CBR packet size"));
            }
            if rate.bps() == 0 {
                return Err(ConfigError::Zero("CBR data rate"));
            }
        }
        Ok(())
    }
}

/// Per-reason drop counts of a flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCounts {
    pub queue_overflow: u64,
    pub receive_error: u64,
}

impl DropCounts {
    pub fn total(&self) -> u64 {
        self.queue_overflow + self.receive_error
    }
}

/// Per-flow counters produced by the classifier, snapshot after the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowStatsRecord {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub time_first_tx: Option<SimTime>,
    pub time_last_tx: Option<SimTime>,
    pub time_first_rx: Option<SimTime>,
    pub time_last_rx: Option<SimTime>,
    pub delay_sum: SimTime,
    pub jitter_sum: SimTime,
    pub dropped: DropCounts,
}

impl FlowStatsRecord {
    /// Packets that left the source but were neither received nor are still in flight.
    pub fn lost_packets(&self) -> u64 {
        self.dropped.total()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEntry {
    pub flow_id: FlowId,
    pub tuple: FiveTuple,
    pub stats: FlowStatsRecord,
}

pub type FlowTable = BTreeMap<FlowId, FlowEntry>;

#[cfg(test)]
mod tests {
    use super::*;

    fn cbr(start_ms: u64, stop_ms: u64) -> FlowSpec {
        FlowSpec {
            id: 3,
            kind: FlowKind::UdpCbr {
                packet_size: 1024,
                rate: DataRate::from_kbps(300),
            },
            source: Endpoint::new(Ipv4Addr::new(10, 1, 1, 1), 49155),
            sink: Endpoint::new(Ipv4Addr::new(10, 1, 1, 2), 12346),
            start: SimTime::from_millis(start_ms),
            stop: SimTime::from_millis(stop_ms),
            sink_start: SimTime::ZERO,
            sink_stop: SimTime::from_millis(1800),
        }
    }

    #[test]
    fn window_must_fit_the_horizon() {
        let horizon = SimTime::from_millis(1800);
        assert!(cbr(200, 1800).validate(horizon).is_ok());
        assert!(matches!(
            cbr(200, 1900).validate(horizon),
            Err(ConfigError::InvalidWindow { flow: 3, .. })
        ));
        assert!(cbr(600, 600).validate(horizon).is_err());
    }

    #[test]
    fn sink_must_be_active_before_start() {
        let mut spec = cbr(200, 1200);
        spec.sink_start = SimTime::from_millis(300);
        assert!(matches!(
            spec.validate(SimTime::from_millis(1800)),
            Err(ConfigError::SinkActivatedLate { .. })
        ));
    }

    #[test]
    fn five_tuple_follows_the_spec() {
        let spec = cbr(200, 1200);
        let tuple = spec.five_tuple();
        assert_eq!(tuple.protocol, Protocol::Udp);
        assert_eq!(tuple.destination.port, 12346);
        assert_eq!(tuple.reversed().source, tuple.destination);
        assert_eq!(tuple.to_string(), "10.1.1.1:49155 > 10.1.1.2:12346 udp");
    }

    #[test]
    fn activity_window_is_half_open() {
        let spec = cbr(600, 1200);
        assert!(!spec.is_active_at(SimTime::from_millis(599)));
        assert!(spec.is_active_at(SimTime::from_millis(600)));
        assert!(!spec.is_active_at(SimTime::from_millis(1200)));
    }
}
