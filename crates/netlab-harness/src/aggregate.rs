use std::fmt;

use netlab_abstract::{FiveTuple, FlowEntry, FlowId, FlowTable, SimTime, SummaryFlow};
use serde::{Serialize, Serializer};

use crate::error::HarnessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    NoPacketsReceived,
    SinglePacketReceived,
    EmptyTransmitWindow,
    EmptyReceiveWindow,
}

impl fmt::Display for UndefinedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UndefinedReason::NoPacketsReceived => "no packets received",
            UndefinedReason::SinglePacketReceived => "only one packet received",
            UndefinedReason::EmptyTransmitWindow => "first and last transmission coincide",
            UndefinedReason::EmptyReceiveWindow => "first and last reception coincide",
        };
        f.write_str(text)
    }
}

/// A derived figure that is either a finite number or explicitly undefined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Statistic {
    Defined(f64),
    Undefined(UndefinedReason),
}

impl Statistic {
    pub fn value(&self) -> Option<f64> {
        match self {
            Statistic::Defined(v) => Some(*v),
            Statistic::Undefined(_) => None,
        }
    }

    fn ratio(numerator: f64, denominator: f64, reason: UndefinedReason) -> Self {
        let value = numerator / denominator;
        if denominator > 0.0 && value.is_finite() {
            Statistic::Defined(value)
        } else {
            Statistic::Undefined(reason)
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Defined(v) => write!(f, "{v}"),
            Statistic::Undefined(reason) => write!(f, "undefined ({reason})"),
        }
    }
}

impl Serialize for Statistic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Statistic::Defined(v) => serializer.serialize_f64(*v),
            Statistic::Undefined(_) => serializer.serialize_none(),
        }
    }
}

/// Derived statistics of the selected flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSummary {
    pub flow_id: FlowId,
    pub tuple: FiveTuple,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub offered_load_mbps: Statistic,
    pub throughput_mbps: Statistic,
    pub mean_delay_sec: Statistic,
    pub mean_jitter_sec: Statistic,
}

impl AggregateSummary {
    /// Human-readable block printed after the run.
    pub fn render(&self) -> String {
        let mut out = String::from("*** Flow monitor statistics ***\n");
        out.push_str(&format!("  Tx Packets:   {}\n", self.tx_packets));
        out.push_str(&format!("  Tx Bytes:   {}\n", self.tx_bytes));
        out.push_str(&format!("  Offered Load: {}\n", mbps(&self.offered_load_mbps)));
        out.push_str(&format!("  Rx Packets:   {}\n", self.rx_packets));
        out.push_str(&format!("  Rx Bytes:   {}\n", self.rx_bytes));
        out.push_str(&format!("  Throughput: {}\n", mbps(&self.throughput_mbps)));
        out.push_str(&format!("  Mean delay:   {}\n", self.mean_delay_sec));
        out.push_str(&format!("  Mean jitter:   {}\n", self.mean_jitter_sec));
        out
    }
}

fn mbps(stat: &Statistic) -> String {
    match stat {
        Statistic::Defined(_) => format!("{stat} Mbps"),
        Statistic::Undefined(_) => stat.to_string(),
    }
}

fn window(first: Option<SimTime>, last: Option<SimTime>) -> f64 {
    match (first, last) {
        (Some(first), Some(last)) => last.saturating_sub(first).as_secs_f64(),
        _ => 0.0,
    }
}

/// Reduces the classifier table to the summary of one flow.
#[derive(Debug, Clone)]
pub struct FlowStatisticsAggregator {
    selection: SummaryFlow,
}

impl FlowStatisticsAggregator {
    pub fn new(selection: SummaryFlow) -> Self {
        Self { selection }
    }

    /// The entry the summary describes. `bulk` is the bulk flow's five-tuple.
    pub fn select<'a>(
        &self,
        table: &'a FlowTable,
        bulk: &FiveTuple,
    ) -> Result<&'a FlowEntry, HarnessError> {
        match self.selection {
            SummaryFlow::Bulk => table
                .values()
                .find(|e| e.tuple == *bulk)
                .ok_or_else(|| HarnessError::FlowNotFound(bulk.to_string())),
            SummaryFlow::Id(id) => table
                .get(&id)
                .ok_or_else(|| HarnessError::FlowNotFound(format!("flow id {id}"))),
        }
    }

    pub fn summarize(entry: &FlowEntry) -> AggregateSummary {
        let s = &entry.stats;
        let rx_packets = s.rx_packets as f64;
        let mean_jitter_sec = match s.rx_packets {
            0 => Statistic::Undefined(UndefinedReason::NoPacketsReceived),
            1 => Statistic::Undefined(UndefinedReason::SinglePacketReceived),
            n => Statistic::Defined(s.jitter_sum.as_secs_f64() / (n - 1) as f64),
        };
        AggregateSummary {
            flow_id: entry.flow_id,
            tuple: entry.tuple,
            tx_packets: s.tx_packets,
            tx_bytes: s.tx_bytes,
            rx_packets: s.rx_packets,
            rx_bytes: s.rx_bytes,
            offered_load_mbps: Statistic::ratio(
                s.tx_bytes as f64 * 8.0 / 1e6,
                window(s.time_first_tx, s.time_last_tx),
                UndefinedReason::EmptyTransmitWindow,
            ),
            throughput_mbps: Statistic::ratio(
                s.rx_bytes as f64 * 8.0 / 1e6,
                window(s.time_first_rx, s.time_last_rx),
                UndefinedReason::EmptyReceiveWindow,
            ),
            mean_delay_sec: Statistic::ratio(
                s.delay_sum.as_secs_f64(),
                rx_packets,
                UndefinedReason::NoPacketsReceived,
            ),
            mean_jitter_sec,
        }
    }

    pub fn aggregate(
        &self,
        table: &FlowTable,
        bulk: &FiveTuple,
    ) -> Result<AggregateSummary, HarnessError> {
        self.select(table, bulk).map(Self::summarize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlab_abstract::{Endpoint, FlowStatsRecord, Protocol};
    use std::net::Ipv4Addr;

    fn tuple(port: u16, protocol: Protocol) -> FiveTuple {
        FiveTuple {
            source: Endpoint::new(Ipv4Addr::new(10, 1, 1, 1), 49153),
            destination: Endpoint::new(Ipv4Addr::new(10, 1, 1, 2), port),
            protocol,
        }
    }

    fn entry(flow_id: FlowId, tuple: FiveTuple, stats: FlowStatsRecord) -> FlowEntry {
        FlowEntry {
            flow_id,
            tuple,
            stats,
        }
    }

    fn busy_stats() -> FlowStatsRecord {
        FlowStatsRecord {
            tx_packets: 100,
            tx_bytes: 125_000,
            rx_packets: 98,
            rx_bytes: 122_500,
            time_first_tx: Some(SimTime::ZERO),
            time_last_tx: Some(SimTime::from_secs(1)),
            time_first_rx: Some(SimTime::from_millis(20)),
            time_last_rx: Some(SimTime::from_millis(1020)),
            delay_sum: SimTime::from_millis(98 * 30),
            jitter_sum: SimTime::from_millis(97 * 2),
            ..FlowStatsRecord::default()
        }
    }

    #[test]
    fn computes_rates_delay_and_jitter() {
        let summary = FlowStatisticsAggregator::summarize(&entry(
            1,
            tuple(12344, Protocol::Tcp),
            busy_stats(),
        ));
        assert_eq!(summary.offered_load_mbps, Statistic::Defined(1.0));
        assert_eq!(summary.throughput_mbps, Statistic::Defined(0.98));
        let delay = summary.mean_delay_sec.value().unwrap();
        assert!((delay - 0.03).abs() < 1e-12);
        let jitter = summary.mean_jitter_sec.value().unwrap();
        assert!((jitter - 0.002).abs() < 1e-12);
    }

    #[test]
    fn degenerate_counters_are_undefined() {
        let stats = FlowStatsRecord {
            tx_packets: 1,
            tx_bytes: 576,
            rx_packets: 1,
            rx_bytes: 576,
            time_first_tx: Some(SimTime::ZERO),
            time_last_tx: Some(SimTime::ZERO),
            time_first_rx: Some(SimTime::from_millis(15)),
            time_last_rx: Some(SimTime::from_millis(15)),
            delay_sum: SimTime::from_millis(15),
            ..FlowStatsRecord::default()
        };
        let summary =
            FlowStatisticsAggregator::summarize(&entry(1, tuple(12344, Protocol::Tcp), stats));
        assert_eq!(
            summary.offered_load_mbps,
            Statistic::Undefined(UndefinedReason::EmptyTransmitWindow)
        );
        assert_eq!(
            summary.throughput_mbps,
            Statistic::Undefined(UndefinedReason::EmptyReceiveWindow)
        );
        assert_eq!(summary.mean_delay_sec, Statistic::Defined(0.015));
        assert_eq!(
            summary.mean_jitter_sec,
            Statistic::Undefined(UndefinedReason::SinglePacketReceived)
        );

        let silent = FlowStatisticsAggregator::summarize(&entry(
            2,
            tuple(12345, Protocol::Udp),
            FlowStatsRecord::default(),
        ));
        assert_eq!(
            silent.mean_delay_sec,
            Statistic::Undefined(UndefinedReason::NoPacketsReceived)
        );
        assert!(silent.render().contains("Mean delay:   undefined (no packets received)"));
    }

    #[test]
    fn bulk_selection_ignores_enumeration_order() {
        let bulk = tuple(12344, Protocol::Tcp);
        let mut table = FlowTable::new();
        table.insert(1, entry(1, tuple(12345, Protocol::Udp), FlowStatsRecord::default()));
        table.insert(2, entry(2, bulk, busy_stats()));
        let by_tuple = FlowStatisticsAggregator::new(SummaryFlow::Bulk);
        assert_eq!(by_tuple.aggregate(&table, &bulk).unwrap().flow_id, 2);
        let by_id = FlowStatisticsAggregator::new(SummaryFlow::Id(1));
        assert_eq!(by_id.aggregate(&table, &bulk).unwrap().flow_id, 1);
        let missing = FlowStatisticsAggregator::new(SummaryFlow::Id(7));
        assert!(matches!(
            missing.aggregate(&table, &bulk),
            Err(HarnessError::FlowNotFound(_))
        ));
    }

    #[test]
    fn summary_renders_eight_figures_and_serializes_undefined_as_null() {
        let summary = FlowStatisticsAggregator::summarize(&entry(
            1,
            tuple(12344, Protocol::Tcp),
            busy_stats(),
        ));
        let text = summary.render();
        assert!(text.starts_with("*** Flow monitor statistics ***"));
        assert_eq!(text.lines().count(), 9);
        assert!(text.contains("Offered Load: 1 Mbps"));

        let json = serde_json::to_value(Statistic::Undefined(UndefinedReason::NoPacketsReceived))
            .unwrap();
        assert!(json.is_null());
    }
}
