use netlab_abstract::{ByteSample, HostContext, SimTime, SimulationHost, SinkId};
use tracing::debug;

use crate::periodic::PeriodicTask;

/// Polls the in-scope sinks every period and records their summed totals.
#[derive(Debug)]
pub struct ByteCounterSampler {
    task: PeriodicTask,
    first_at: SimTime,
    sinks: Vec<SinkId>,
    series: Vec<ByteSample>,
}

impl ByteCounterSampler {
    pub fn new(task: PeriodicTask, first_at: SimTime, sinks: Vec<SinkId>) -> Self {
        Self {
            task,
            first_at,
            sinks,
            series: Vec::new(),
        }
    }

    pub fn timer(&self) -> netlab_abstract::TimerId {
        self.task.timer()
    }

    pub fn install(&self, host: &mut dyn SimulationHost) {
        if !self.task.start(host, self.first_at) {
            debug!("byte sampler not started: first tick past its lifetime");
        }
    }

    fn total(&self, read: impl Fn(SinkId) -> Option<u64>) -> u64 {
        self.sinks.iter().filter_map(|s| read(*s)).sum()
    }

    pub fn on_tick(&mut self, ctx: &mut dyn HostContext) {
        let total_bytes = self.total(|s| ctx.sink_total_rx(s));
        self.series.push(ByteSample {
            time: ctx.now(),
            total_bytes,
        });
        self.task.rearm(ctx);
    }

    pub fn cancel(&mut self, ctx: &mut dyn HostContext) {
        self.task.cancel(ctx);
    }

    /// Append the terminal totals at `stop_time` unless a tick already landed
    /// there or sampling was cancelled.
    pub fn finish(&mut self, host: &dyn SimulationHost, stop_time: SimTime) {
        if self.task.is_cancelled() || self.series.last().is_some_and(|s| s.time >= stop_time) {
            return;
        }
        let total_bytes = self.total(|s| host.sink_total_rx(s));
        self.series.push(ByteSample {
            time: stop_time,
            total_bytes,
        });
    }

    pub fn series(&self) -> &[ByteSample] {
        &self.series
    }

    pub fn into_series(self) -> Vec<ByteSample> {
        self.series
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeContext;
    use netlab_abstract::TimerId;

    #[test]
    fn tick_sums_sinks_and_rearms() {
        let task = PeriodicTask::new(TimerId(1), SimTime::from_micros(100), SimTime::from_millis(1));
        let mut sampler = ByteCounterSampler::new(task, SimTime::from_micros(10), vec![SinkId(0), SinkId(2)]);
        let mut ctx = FakeContext::at(SimTime::from_micros(10));
        ctx.sinks = vec![100, 5, 20];
        sampler.on_tick(&mut ctx);
        assert_eq!(
            sampler.series(),
            &[ByteSample {
                time: SimTime::from_micros(10),
                total_bytes: 120
            }]
        );
        assert_eq!(ctx.scheduled, vec![(SimTime::from_micros(110), TimerId(1))]);
    }

    #[test]
    fn cancelled_sampler_stops() {
        let task = PeriodicTask::new(TimerId(1), SimTime::from_micros(100), SimTime::from_millis(1));
        let mut sampler = ByteCounterSampler::new(task, SimTime::ZERO, vec![SinkId(0)]);
        let mut ctx = FakeContext::at(SimTime::from_micros(10));
        ctx.sinks = vec![1];
        sampler.cancel(&mut ctx);
        sampler.on_tick(&mut ctx);
        assert!(ctx.scheduled.is_empty());
        assert_eq!(ctx.cancelled, vec![TimerId(1)]);
    }
}
