pub mod aggregate;
pub mod collector;
pub mod cwnd;
pub mod drops;
pub mod error;
pub mod experiment;
pub mod periodic;
pub mod results;
pub mod sampler;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use aggregate::{AggregateSummary, FlowStatisticsAggregator, Statistic, UndefinedReason};
pub use collector::{CWND_ATTACH_TIMER, CollectedSeries, MetricsCollector, SAMPLER_TIMER};
pub use cwnd::CongestionWindowTracer;
pub use drops::DropCounter;
pub use error::HarnessError;
pub use experiment::{Experiment, ExperimentConfig, ExperimentOutcome};
pub use periodic::PeriodicTask;
pub use results::ResultSink;
pub use sampler::ByteCounterSampler;
pub use scheduler::{InstalledTraffic, TrafficScheduler};
