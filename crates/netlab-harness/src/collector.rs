use netlab_abstract::{
    ByteSample, CwndSample, DropEvent, DropRecord, HostContext, MeasurementPlan, Observer,
    SimTime, SimulationHost, SocketId, SubscriptionId, TimerId,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::cwnd::CongestionWindowTracer;
use crate::drops::DropCounter;
use crate::periodic::PeriodicTask;
use crate::sampler::ByteCounterSampler;
use crate::scheduler::InstalledTraffic;

pub const SAMPLER_TIMER: TimerId = TimerId(1);
pub const CWND_ATTACH_TIMER: TimerId = TimerId(2);
pub const COLLECT_STOP_TIMER: TimerId = TimerId(3);

/// Time series gathered during one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectedSeries {
    pub bytes: Vec<ByteSample>,
    pub drops: Vec<DropRecord>,
    pub cwnd: Vec<CwndSample>,
}

/// Owns every collector of a run and receives the engine's callbacks.
#[derive(Debug)]
pub struct MetricsCollector {
    sampler: ByteCounterSampler,
    drops: DropCounter,
    cwnd: CongestionWindowTracer,
    stop_at: Option<SimTime>,
}

impl MetricsCollector {
    pub fn new(plan: &MeasurementPlan, horizon: SimTime, traffic: &InstalledTraffic) -> Self {
        let until = plan.sample_until.unwrap_or(horizon).min(horizon);
        let task = PeriodicTask::new(SAMPLER_TIMER, plan.sample_period, until);
        let sinks = traffic.sinks_in_scope(&plan.byte_scope);
        Self {
            sampler: ByteCounterSampler::new(task, plan.first_sample_at, sinks),
            drops: DropCounter::new(plan.drop_kinds.clone()),
            cwnd: CongestionWindowTracer::new(
                CWND_ATTACH_TIMER,
                plan.cwnd_attach_at,
                traffic.bulk.socket,
            ),
            stop_at: plan.collect_until.filter(|t| *t < horizon),
        }
    }

    /// Register timers and subscriptions before the run starts.
    pub fn install(&mut self, host: &mut dyn SimulationHost) {
        self.sampler.install(host);
        self.drops.install(host);
        self.cwnd.install(host);
        if let Some(at) = self.stop_at {
            host.schedule(at, COLLECT_STOP_TIMER);
        }
    }

    /// Cancel the sampler and drop every subscription. Series gathered so far are kept.
    pub fn stop(&mut self, ctx: &mut dyn HostContext) {
        info!("collection stopped at {}s", ctx.now());
        self.sampler.cancel(ctx);
        self.drops.detach(ctx);
        self.cwnd.detach(ctx);
    }

    pub fn drop_count(&self) -> u64 {
        self.drops.count()
    }

    /// Close the byte series at the stop time and hand back all series.
    pub fn finish(mut self, host: &dyn SimulationHost, stop_time: SimTime) -> CollectedSeries {
        self.sampler.finish(host, stop_time);
        let series = CollectedSeries {
            bytes: self.sampler.into_series(),
            drops: self.drops.into_series(),
            cwnd: self.cwnd.into_series(),
        };
        info!(
            "collected {} byte samples, {} drop records, {} cwnd samples",
            series.bytes.len(),
            series.drops.len(),
            series.cwnd.len()
        );
        series
    }
}

impl Observer for MetricsCollector {
    fn on_timer(&mut self, ctx: &mut dyn HostContext, timer: TimerId) {
        if timer == self.sampler.timer() {
            self.sampler.on_tick(ctx);
        } else if timer == self.cwnd.timer() {
            self.cwnd.attach(ctx);
        } else if timer == COLLECT_STOP_TIMER {
            self.stop(ctx);
        } else {
            debug!("ignoring unknown timer {:?}", timer);
        }
    }

    fn on_drop(&mut self, ctx: &mut dyn HostContext, subscription: SubscriptionId, event: &DropEvent) {
        self.drops.on_drop(ctx, subscription, event);
    }

    fn on_cwnd_change(
        &mut self,
        ctx: &mut dyn HostContext,
        subscription: SubscriptionId,
        _socket: SocketId,
        _old: u32,
        new: u32,
    ) {
        self.cwnd.on_change(ctx, subscription, new);
    }
}
