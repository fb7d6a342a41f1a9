use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use crate::config::ConfigError;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Simulation time in integer nanoseconds.
///
/// Serialized as floating-point seconds so experiment files can say
/// `delay = 0.01` and reports stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    pub const MAX: SimTime = SimTime(u64::MAX);

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros.saturating_mul(1_000))
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(NANOS_PER_SEC))
    }

    /// Negative and NaN inputs clamp to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * NANOS_PER_SEC as f64).round() as u64)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    pub const fn saturating_add(self, other: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(other.0))
    }

    pub const fn saturating_sub(self, other: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(other.0))
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        self.saturating_add(rhs)
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        self.saturating_sub(rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_secs_f64())
    }
}

impl Serialize for SimTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_secs_f64())
    }
}

impl<'de> Deserialize<'de> for SimTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "time must be a finite, non-negative number of seconds (got {secs})"
            )));
        }
        Ok(SimTime::from_secs_f64(secs))
    }
}

/// A link or application data rate in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataRate {
    bits_per_sec: u64,
}

impl DataRate {
    pub const fn from_bps(bits_per_sec: u64) -> Self {
        Self { bits_per_sec }
    }

    pub const fn from_kbps(kbps: u64) -> Self {
        Self::from_bps(kbps * 1_000)
    }

    pub const fn from_mbps(mbps: u64) -> Self {
        Self::from_bps(mbps * 1_000_000)
    }

    pub const fn bps(self) -> u64 {
        self.bits_per_sec
    }

    pub fn mbps(self) -> f64 {
        self.bits_per_sec as f64 / 1e6
    }

    /// Serialization time of `bytes` at this rate. A zero rate never finishes.
    pub fn tx_time(self, bytes: u64) -> SimTime {
        if self.bits_per_sec == 0 {
            return SimTime::MAX;
        }
        let nanos = (bytes as u128 * 8 * NANOS_PER_SEC as u128).div_ceil(self.bits_per_sec as u128);
        SimTime::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl Add for DataRate {
    type Output = DataRate;

    fn add(self, rhs: DataRate) -> DataRate {
        DataRate::from_bps(self.bits_per_sec.saturating_add(rhs.bits_per_sec))
    }
}

impl std::iter::Sum for DataRate {
    fn sum<I: Iterator<Item = DataRate>>(iter: I) -> DataRate {
        iter.fold(DataRate::from_bps(0), |acc, rate| acc + rate)
    }
}

impl FromStr for DataRate {
    type Err = ConfigError;

    /// Accepts `"1Mbps"`, `"300Kbps"`, `"2.5Gbps"`, `"64000bps"` or a bare number of bits/s.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidDataRate(s.to_string());
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        let body = lower.strip_suffix("bps").unwrap_or(&lower);
        let (number, multiplier) = match body.chars().last() {
            Some('k') => (&body[..body.len() - 1], 1e3),
            Some('m') => (&body[..body.len() - 1], 1e6),
            Some('g') => (&body[..body.len() - 1], 1e9),
            _ => (body, 1.0),
        };
        let value: f64 = number.trim().parse().map_err(|_| invalid())?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid());
        }
        Ok(DataRate::from_bps((value * multiplier).round() as u64))
    }
}

impl TryFrom<String> for DataRate {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataRate> for String {
    fn from(rate: DataRate) -> Self {
        rate.to_string()
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bps = self.bits_per_sec;
        if bps != 0 && bps % 1_000_000_000 == 0 {
            write!(f, "{}Gbps", bps / 1_000_000_000)
        } else if bps != 0 && bps % 1_000_000 == 0 {
            write!(f, "{}Mbps", bps / 1_000_000)
        } else if bps != 0 && bps % 1_000 == 0 {
            write!(f, "{}Kbps", bps / 1_000)
        } else {
            write!(f, "{bps}bps")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ns3_style_rates() {
        assert_eq!("1Mbps".parse::<DataRate>().unwrap(), DataRate::from_mbps(1));
        assert_eq!("300Kbps".parse::<DataRate>().unwrap(), DataRate::from_kbps(300));
        assert_eq!("300kbps".parse::<DataRate>().unwrap(), DataRate::from_kbps(300));
        assert_eq!("2.5Mbps".parse::<DataRate>().unwrap(), DataRate::from_bps(2_500_000));
        assert_eq!("9600".parse::<DataRate>().unwrap(), DataRate::from_bps(9600));
        assert!("fast".parse::<DataRate>().is_err());
        assert!("-3Mbps".parse::<DataRate>().is_err());
    }

    #[test]
    fn display_picks_largest_exact_unit() {
        assert_eq!(DataRate::from_mbps(1).to_string(), "1Mbps");
        assert_eq!(DataRate::from_kbps(300).to_string(), "300Kbps");
        assert_eq!(DataRate::from_bps(1500).to_string(), "1500bps");
    }

    #[test]
    fn tx_time_of_a_cbr_packet() {
        // 1054 wire bytes at 1 Mbps.
        let t = DataRate::from_mbps(1).tx_time(1054);
        assert_eq!(t, SimTime::from_nanos(8_432_000));
        assert_eq!(DataRate::from_bps(0).tx_time(1), SimTime::MAX);
    }

    #[test]
    fn sim_time_conversions() {
        assert_eq!(SimTime::from_secs_f64(1.8), SimTime::from_millis(1800));
        assert_eq!(SimTime::from_secs_f64(-1.0), SimTime::ZERO);
        assert_eq!(SimTime::from_micros(10).as_secs_f64(), 0.00001);
        assert_eq!(SimTime::from_millis(5) - SimTime::from_millis(7), SimTime::ZERO);
    }

    #[test]
    fn sim_time_serializes_as_seconds() {
        let json = serde_json::to_string(&SimTime::from_millis(250)).unwrap();
        assert_eq!(json, "0.25");
        let back: SimTime = serde_json::from_str("0.25").unwrap();
        assert_eq!(back, SimTime::from_millis(250));
        assert!(serde_json::from_str::<SimTime>("-1.0").is_err());
    }
}
