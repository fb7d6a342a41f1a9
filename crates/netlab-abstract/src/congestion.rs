use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

/// Congestion-control algorithm requested for the TCP bulk flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CongestionAlgorithm {
    TcpNewReno,
    TcpHybla,
    TcpHighSpeed,
    TcpHtcp,
    TcpVegas,
    TcpScalable,
    TcpVeno,
    TcpBic,
    TcpYeah,
    TcpIllinois,
    #[default]
    TcpWestwood,
    TcpWestwoodPlus,
}

/// Additive-increase / multiplicative-decrease parameters an engine applies
/// in place of the named algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AimdProfile {
    /// Congestion-avoidance growth, in segments per round trip.
    pub increase_segments: f64,
    /// Window multiplier applied on loss.
    pub decrease_factor: f64,
}

impl CongestionAlgorithm {
    pub const ALL: [CongestionAlgorithm; 12] = [
        CongestionAlgorithm::TcpNewReno,
        CongestionAlgorithm::TcpHybla,
        CongestionAlgorithm::TcpHighSpeed,
        CongestionAlgorithm::TcpHtcp,
        CongestionAlgorithm::TcpVegas,
        CongestionAlgorithm::TcpScalable,
        CongestionAlgorithm::TcpVeno,
        CongestionAlgorithm::TcpBic,
        CongestionAlgorithm::TcpYeah,
        CongestionAlgorithm::TcpIllinois,
        CongestionAlgorithm::TcpWestwood,
        CongestionAlgorithm::TcpWestwoodPlus,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CongestionAlgorithm::TcpNewReno => "TcpNewReno",
            CongestionAlgorithm::TcpHybla => "TcpHybla",
            CongestionAlgorithm::TcpHighSpeed => "TcpHighSpeed",
            CongestionAlgorithm::TcpHtcp => "TcpHtcp",
            CongestionAlgorithm::TcpVegas => "TcpVegas",
            CongestionAlgorithm::TcpScalable => "TcpScalable",
            CongestionAlgorithm::TcpVeno => "TcpVeno",
            CongestionAlgorithm::TcpBic => "TcpBic",
            CongestionAlgorithm::TcpYeah => "TcpYeah",
            CongestionAlgorithm::TcpIllinois => "TcpIllinois",
            CongestionAlgorithm::TcpWestwood => "TcpWestwood",
            CongestionAlgorithm::TcpWestwoodPlus => "TcpWestwoodPlus",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|algo| algo.name()).collect()
    }

    pub fn profile(self) -> AimdProfile {
        let (increase_segments, decrease_factor) = match self {
            CongestionAlgorithm::TcpNewReno => (1.0, 0.5),
            CongestionAlgorithm::TcpHybla => (2.0, 0.5),
            CongestionAlgorithm::TcpHighSpeed => (2.0, 0.7),
            CongestionAlgorithm::TcpHtcp => (1.5, 0.6),
            CongestionAlgorithm::TcpVegas => (1.0, 0.75),
            CongestionAlgorithm::TcpScalable => (1.5, 0.875),
            CongestionAlgorithm::TcpVeno => (1.0, 0.8),
            CongestionAlgorithm::TcpBic => (2.0, 0.8),
            CongestionAlgorithm::TcpYeah => (1.5, 0.875),
            CongestionAlgorithm::TcpIllinois => (1.5, 0.7),
            CongestionAlgorithm::TcpWestwood | CongestionAlgorithm::TcpWestwoodPlus => (1.0, 0.5),
        };
        AimdProfile {
            increase_segments,
            decrease_factor,
        }
    }
}

impl FromStr for CongestionAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|algo| algo.name() == s)
            .ok_or_else(|| ConfigError::UnknownProtocol(s.to_string()))
    }
}

impl fmt::Display for CongestionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_name_round_trips() {
        for algo in CongestionAlgorithm::ALL {
            assert_eq!(algo.name().parse::<CongestionAlgorithm>().unwrap(), algo);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "TcpCubic".parse::<CongestionAlgorithm>().unwrap_err();
        assert_eq!(err, ConfigError::UnknownProtocol("TcpCubic".into()));
        assert!(err.to_string().contains("TcpWestwoodPlus"));
        // Names are case-sensitive.
        assert!("tcpnewreno".parse::<CongestionAlgorithm>().is_err());
    }

    #[test]
    fn profiles_shrink_the_window_on_loss() {
        for algo in CongestionAlgorithm::ALL {
            let profile = algo.profile();
            assert!(profile.decrease_factor > 0.0 && profile.decrease_factor < 1.0);
            assert!(profile.increase_segments >= 1.0);
        }
    }
}
