use netlab_abstract::{
    ExperimentScenario, FlowTable, MeasurementPlan, SimConfig, SimTime, SimulationHost, SinkState,
    TrafficPlan,
};
use serde::Serialize;
use tracing::info;

use crate::aggregate::{AggregateSummary, FlowStatisticsAggregator};
use crate::collector::{CollectedSeries, MetricsCollector};
use crate::error::HarnessError;
use crate::results::ResultSink;
use crate::scheduler::{InstalledTraffic, TrafficScheduler};

/// Everything one run needs besides the engine itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentConfig {
    pub sim: SimConfig,
    pub traffic: TrafficPlan,
    pub measurement: MeasurementPlan,
}

impl ExperimentConfig {
    /// The five-stream experiment over `sim`.
    pub fn five_stream(sim: SimConfig) -> Self {
        let traffic = TrafficPlan::five_stream(sim.horizon);
        Self {
            sim,
            traffic,
            measurement: MeasurementPlan::default(),
        }
    }

    /// Apply the traffic and measurement parts of a scenario. The engine part
    /// is expected to be applied to `sim` already.
    pub fn with_scenario(mut self, scenario: &ExperimentScenario) -> Self {
        scenario.traffic.apply_to(&mut self.traffic);
        scenario.measurement.apply_to(&mut self.measurement);
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.traffic.bulk.max_bytes = max_bytes;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentOutcome {
    pub stop_time: SimTime,
    #[serde(skip)]
    pub traffic: InstalledTraffic,
    pub sinks: Vec<SinkState>,
    pub series: CollectedSeries,
    pub flow_table: FlowTable,
    pub summary: AggregateSummary,
}

impl ExperimentOutcome {
    /// Sum of the terminal totals of every sink.
    pub fn total_sink_bytes(&self) -> u64 {
        self.sinks.iter().map(|s| s.cumulative_bytes).sum()
    }

    pub fn write(&self, sink: &ResultSink) -> Result<(), HarnessError> {
        sink.write_all(&self.series, &self.flow_table)?;
        Ok(())
    }
}

/// Drives one run: install traffic, attach collectors, run, reduce.
#[derive(Debug, Clone)]
pub struct Experiment {
    config: ExperimentConfig,
}

impl Experiment {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn scheduler(&self, horizon: SimTime) -> TrafficScheduler {
        TrafficScheduler::new(self.config.traffic.clone(), horizon)
    }

    /// `host` must be fresh and built from `config().sim`.
    pub fn run(&self, host: &mut dyn SimulationHost) -> Result<ExperimentOutcome, HarnessError> {
        let horizon = host.horizon();
        let traffic = self.scheduler(horizon).install(host)?;

        let mut collector = MetricsCollector::new(&self.config.measurement, horizon, &traffic);
        collector.install(host);

        let stop_time = host.run(&mut collector)?;
        info!(
            "run finished at {}s with {} drops observed",
            stop_time,
            collector.drop_count()
        );
        let series = collector.finish(host, stop_time);

        let flow_table = host.flow_table();
        let summary = FlowStatisticsAggregator::new(self.config.measurement.summary_flow)
            .aggregate(&flow_table, &traffic.bulk.tuple)?;

        Ok(ExperimentOutcome {
            stop_time,
            sinks: host.sinks(),
            traffic,
            series,
            flow_table,
            summary,
        })
    }
}
