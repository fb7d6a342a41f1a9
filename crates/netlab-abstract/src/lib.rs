pub mod config;
pub mod congestion;
pub mod flow;
pub mod interface;
pub mod scenario;
pub mod series;
pub mod units;

pub use config::{ConfigError, ErrorUnit, LinkConfig, SimConfig, TcpConfig};
pub use congestion::{AimdProfile, CongestionAlgorithm};
pub use flow::{
    DropCounts, Endpoint, FiveTuple, FlowEntry, FlowId, FlowKind, FlowSpec, FlowStatsRecord,
    FlowTable, Protocol,
};
pub use interface::{
    DropEvent, DropKind, EngineError, FlowBinding, HostContext, Observer, SimulationHost,
    SinkId, SinkState, SocketId, SubscriptionId, TimerId,
};
pub use scenario::{
    BulkTransfer, ByteCounterScope, CbrStream, ExperimentScenario, MeasurementOverride,
    MeasurementPlan, SimConfigOverride, SummaryFlow, TrafficOverride, TrafficPlan,
};
pub use series::{ByteSample, CwndSample, DropRecord, SeriesPoint};
pub use units::{DataRate, SimTime};
