use netlab_abstract::{
    CwndSample, HostContext, SimTime, SimulationHost, SocketId, SubscriptionId, TimerId,
};
use tracing::{debug, warn};

/// Records the bulk socket's congestion window on every change.
///
/// The subscription is attached from a timer at `attach_at`, so changes
/// before that instant are not observed.
#[derive(Debug)]
pub struct CongestionWindowTracer {
    timer: TimerId,
    attach_at: SimTime,
    socket: Option<SocketId>,
    subscription: Option<SubscriptionId>,
    series: Vec<CwndSample>,
}

impl CongestionWindowTracer {
    pub fn new(timer: TimerId, attach_at: SimTime, socket: Option<SocketId>) -> Self {
        Self {
            timer,
            attach_at,
            socket,
            subscription: None,
            series: Vec::new(),
        }
    }

    pub fn timer(&self) -> TimerId {
        self.timer
    }

    pub fn install(&self, host: &mut dyn SimulationHost) {
        match self.socket {
            Some(_) => host.schedule(self.attach_at, self.timer),
            None => warn!("no TCP socket to trace; congestion window series stays empty"),
        }
    }

    pub fn attach(&mut self, ctx: &mut dyn HostContext) {
        if self.subscription.is_some() {
            return;
        }
        if let Some(socket) = self.socket {
            debug!("tracing cwnd of socket {:?} from {}", socket, ctx.now());
            self.subscription = Some(ctx.subscribe_cwnd(socket));
        }
    }

    /// Drop the subscription, or the pending attachment if it has not fired.
    pub fn detach(&mut self, ctx: &mut dyn HostContext) {
        match self.subscription.take() {
            Some(subscription) => ctx.unsubscribe(subscription),
            None => ctx.cancel(self.timer),
        }
        self.socket = None;
    }

    pub fn on_change(&mut self, ctx: &dyn HostContext, subscription: SubscriptionId, new: u32) {
        if self.subscription == Some(subscription) {
            self.series.push(CwndSample {
                time: ctx.now(),
                cwnd_bytes: new,
            });
        }
    }

    pub fn series(&self) -> &[CwndSample] {
        &self.series
    }

    pub fn into_series(self) -> Vec<CwndSample> {
        self.series
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeContext;

    #[test]
    fn records_only_after_attaching() {
        let mut tracer = CongestionWindowTracer::new(TimerId(2), SimTime::from_micros(10), Some(SocketId(0)));
        let mut ctx = FakeContext::at(SimTime::from_micros(10));
        tracer.on_change(&ctx, SubscriptionId(1), 1072);
        assert!(tracer.series().is_empty());

        tracer.attach(&mut ctx);
        let subscription = ctx.cwnd_subscriptions[0].0;
        assert_eq!(ctx.cwnd_subscriptions[0].1, SocketId(0));
        ctx.now = SimTime::from_millis(40);
        tracer.on_change(&ctx, subscription, 1072);
        assert_eq!(
            tracer.series(),
            &[CwndSample {
                time: SimTime::from_millis(40),
                cwnd_bytes: 1072
            }]
        );

        tracer.detach(&mut ctx);
        tracer.on_change(&ctx, subscription, 1608);
        assert_eq!(tracer.series().len(), 1);
        assert_eq!(ctx.unsubscribed, vec![subscription]);
    }
}
