use serde::{Deserialize, Serialize};

use crate::units::SimTime;

/// A point of a collected time series, written as `"<seconds> <value>"`.
pub trait SeriesPoint {
    fn time(&self) -> SimTime;

    fn value(&self) -> u64;

    fn dat_line(&self) -> String {
        format!("{} {}", self.time(), self.value())
    }
}

/// Sum of the in-scope sinks' received bytes at one sampling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteSample {
    pub time: SimTime,
    pub total_bytes: u64,
}

/// Cumulative drop count after a drop observed at `time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropRecord {
    pub time: SimTime,
    pub cumulative: u64,
}

impl DropRecord {
    pub const ANCHOR: DropRecord = DropRecord {
        time: SimTime::ZERO,
        cumulative: 0,
    };
}

/// Congestion window after a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CwndSample {
    pub time: SimTime,
    pub cwnd_bytes: u32,
}

impl SeriesPoint for ByteSample {
    fn time(&self) -> SimTime {
        self.time
    }

    fn value(&self) -> u64 {
        self.total_bytes
    }
}

impl SeriesPoint for DropRecord {
    fn time(&self) -> SimTime {
        self.time
    }

    fn value(&self) -> u64 {
        self.cumulative
    }
}

impl SeriesPoint for CwndSample {
    fn time(&self) -> SimTime {
        self.time
    }

    fn value(&self) -> u64 {
        self.cwnd_bytes as u64
    }
}
