use serde::{Deserialize, Serialize};

use crate::config::{ErrorUnit, SimConfig};
use crate::congestion::CongestionAlgorithm;
use crate::interface::DropKind;
use crate::units::{DataRate, SimTime};

pub const DEFAULT_BULK_PORT: u16 = 12344;
pub const DEFAULT_CBR_BASE_PORT: u16 = 12345;
pub const DEFAULT_CBR_PACKET_SIZE: u32 = 1024;

fn default_cbr_packet_size() -> u32 {
    DEFAULT_CBR_PACKET_SIZE
}

/// One UDP constant-bit-rate stream of the staggered load ramp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CbrStream {
    pub rate: DataRate,
    pub start: SimTime,
    pub stop: SimTime,
    #[serde(default = "default_cbr_packet_size")]
    pub packet_size: u32,
}

impl CbrStream {
    pub fn new(rate: DataRate, start: SimTime, stop: SimTime) -> Self {
        Self {
            rate,
            start,
            stop,
            packet_size: DEFAULT_CBR_PACKET_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkTransfer {
    pub port: u16,
    /// Zero means unlimited.
    pub max_bytes: u64,
    pub start: SimTime,
    pub stop: SimTime,
}

/// The flow set of one experiment: one TCP bulk transfer plus `k` CBR streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficPlan {
    pub bulk: BulkTransfer,
    pub cbr_base_port: u16,
    pub cbr: Vec<CbrStream>,
    pub sink_start: SimTime,
    /// Defaults to the horizon.
    pub sink_stop: Option<SimTime>,
}

impl TrafficPlan {
    /// A lone bulk transfer over `[0, horizon]`.
    pub fn bulk_only(horizon: SimTime) -> Self {
        Self {
            bulk: BulkTransfer {
                port: DEFAULT_BULK_PORT,
                max_bytes: 0,
                start: SimTime::ZERO,
                stop: horizon,
            },
            cbr_base_port: DEFAULT_CBR_BASE_PORT,
            cbr: Vec::new(),
            sink_start: SimTime::ZERO,
            sink_stop: None,
        }
    }

    /// The bulk transfer competing with five 300 Kbps streams whose
    /// aggregate load rises above the link rate and falls again. Streams
    /// starting at or after `horizon` are left out.
    pub fn five_stream(horizon: SimTime) -> Self {
        let windows = [
            (200, 1800),
            (400, 1800),
            (600, 1200),
            (800, 1400),
            (1000, 1600),
        ];
        let cbr = windows
            .into_iter()
            .filter(|(start, _)| SimTime::from_millis(*start) < horizon)
            .map(|(start, stop)| {
                CbrStream::new(
                    DataRate::from_kbps(300),
                    SimTime::from_millis(start),
                    SimTime::from_millis(stop).min(horizon),
                )
            })
            .collect();
        Self {
            cbr,
            ..Self::bulk_only(horizon)
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.bulk.max_bytes = max_bytes;
        self
    }
}

/// Which sinks feed the aggregate byte-counter series.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "scope", content = "flows", rename_all = "snake_case")]
pub enum ByteCounterScope {
    #[default]
    All,
    BulkOnly,
    /// Explicit list of `FlowSpec` ids (0 is the bulk flow, CBR streams follow).
    Flows(Vec<u32>),
}

/// Which classifier entry the summary statistics describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "select", content = "id", rename_all = "snake_case")]
pub enum SummaryFlow {
    /// The entry whose five-tuple matches the bulk flow's source and sink.
    #[default]
    Bulk,
    /// A fixed classifier flow id.
    Id(u32),
}

/// Collector settings of one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPlan {
    pub first_sample_at: SimTime,
    pub sample_period: SimTime,
    /// Sampling stops re-arming after this time; defaults to the horizon.
    pub sample_until: Option<SimTime>,
    /// Deferral before the congestion-window subscription is attached.
    pub cwnd_attach_at: SimTime,
    /// Every collector detaches at this time; `None` collects until the run ends.
    pub collect_until: Option<SimTime>,
    pub byte_scope: ByteCounterScope,
    pub summary_flow: SummaryFlow,
    /// Drop reasons the drop series counts. Receive errors only by default;
    /// adding `QueueOverflow` can repeat a timestamp when one burst overflows
    /// the queue.
    pub drop_kinds: Vec<DropKind>,
}

impl Default for MeasurementPlan {
    fn default() -> Self {
        Self {
            first_sample_at: SimTime::from_micros(10),
            sample_period: SimTime::from_micros(100),
            sample_until: None,
            cwnd_attach_at: SimTime::from_micros(10),
            collect_until: None,
            byte_scope: ByteCounterScope::All,
            summary_flow: SummaryFlow::Bulk,
            drop_kinds: vec![DropKind::ReceiveError],
        }
    }
}

/// An experiment description loaded from TOML. Every field is optional and
/// overrides the built-in five-stream experiment.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ExperimentScenario {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub config: SimConfigOverride,
    #[serde(default)]
    pub traffic: TrafficOverride,
    #[serde(default)]
    pub measurement: MeasurementOverride,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub seed: Option<u64>,
    pub horizon: Option<SimTime>,
    pub data_rate: Option<DataRate>,
    pub delay: Option<SimTime>,
    pub queue_capacity: Option<usize>,
    pub error_rate: Option<f64>,
    pub error_unit: Option<ErrorUnit>,
    pub congestion: Option<CongestionAlgorithm>,
    pub segment_size: Option<u32>,
    pub receive_window: Option<u32>,
    pub min_rto: Option<SimTime>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.horizon {
            config.horizon = v;
        }
        if let Some(v) = self.data_rate {
            config.link.data_rate = v;
        }
        if let Some(v) = self.delay {
            config.link.delay = v;
        }
        if let Some(v) = self.queue_capacity {
            config.link.queue_capacity = v;
        }
        if let Some(v) = self.error_rate {
            config.link.error_rate = v;
        }
        if let Some(v) = self.error_unit {
            config.link.error_unit = v;
        }
        if let Some(v) = self.congestion {
            config.tcp.congestion = v;
        }
        if let Some(v) = self.segment_size {
            config.tcp.segment_size = v;
        }
        if let Some(v) = self.receive_window {
            config.tcp.receive_window = v;
        }
        if let Some(v) = self.min_rto {
            config.tcp.min_rto = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct TrafficOverride {
    pub bulk_port: Option<u16>,
    pub max_bytes: Option<u64>,
    pub bulk_start: Option<SimTime>,
    pub bulk_stop: Option<SimTime>,
    pub cbr_base_port: Option<u16>,
    pub cbr: Option<Vec<CbrStream>>,
    pub sink_start: Option<SimTime>,
    pub sink_stop: Option<SimTime>,
}

impl TrafficOverride {
    pub fn apply_to(&self, plan: &mut TrafficPlan) {
        if let Some(v) = self.bulk_port {
            plan.bulk.port = v;
        }
        if let Some(v) = self.max_bytes {
            plan.bulk.max_bytes = v;
        }
        if let Some(v) = self.bulk_start {
            plan.bulk.start = v;
        }
        if let Some(v) = self.bulk_stop {
            plan.bulk.stop = v;
        }
        if let Some(v) = self.cbr_base_port {
            plan.cbr_base_port = v;
        }
        if let Some(v) = &self.cbr {
            plan.cbr = v.clone();
        }
        if let Some(v) = self.sink_start {
            plan.sink_start = v;
        }
        if let Some(v) = self.sink_stop {
            plan.sink_stop = Some(v);
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct MeasurementOverride {
    pub first_sample_at: Option<SimTime>,
    pub sample_period: Option<SimTime>,
    pub sample_until: Option<SimTime>,
    pub cwnd_attach_at: Option<SimTime>,
    pub collect_until: Option<SimTime>,
    pub byte_scope: Option<ByteCounterScope>,
    pub summary_flow: Option<SummaryFlow>,
    pub drop_kinds: Option<Vec<DropKind>>,
}

impl MeasurementOverride {
    pub fn apply_to(&self, plan: &mut MeasurementPlan) {
        if let Some(v) = self.first_sample_at {
            plan.first_sample_at = v;
        }
        if let Some(v) = self.sample_period {
            plan.sample_period = v;
        }
        if let Some(v) = self.sample_until {
            plan.sample_until = Some(v);
        }
        if let Some(v) = self.cwnd_attach_at {
            plan.cwnd_attach_at = v;
        }
        if let Some(v) = self.collect_until {
            plan.collect_until = Some(v);
        }
        if let Some(v) = &self.byte_scope {
            plan.byte_scope = v.clone();
        }
        if let Some(v) = self.summary_flow {
            plan.summary_flow = v;
        }
        if let Some(v) = &self.drop_kinds {
            plan.drop_kinds = v.clone();
        }
    }
}
