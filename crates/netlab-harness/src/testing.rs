use std::net::Ipv4Addr;

use netlab_abstract::{
    DropEvent, DropKind, Endpoint, FiveTuple, HostContext, Protocol, SimTime, SinkId, SocketId,
    SubscriptionId, TimerId,
};

/// Records every request an observer makes.
#[derive(Debug, Default)]
pub struct FakeContext {
    pub now: SimTime,
    pub horizon: SimTime,
    pub sinks: Vec<u64>,
    pub scheduled: Vec<(SimTime, TimerId)>,
    pub cancelled: Vec<TimerId>,
    pub cwnd_subscriptions: Vec<(SubscriptionId, SocketId)>,
    pub unsubscribed: Vec<SubscriptionId>,
}

impl FakeContext {
    pub fn at(now: SimTime) -> Self {
        Self {
            now,
            horizon: SimTime::from_millis(1800),
            ..Self::default()
        }
    }
}

impl HostContext for FakeContext {
    fn now(&self) -> SimTime {
        self.now
    }

    fn horizon(&self) -> SimTime {
        self.horizon
    }

    fn sink_total_rx(&self, sink: SinkId) -> Option<u64> {
        self.sinks.get(sink.0 as usize).copied()
    }

    fn schedule(&mut self, at: SimTime, timer: TimerId) {
        self.scheduled.push((at, timer));
    }

    fn cancel(&mut self, timer: TimerId) {
        self.cancelled.push(timer);
    }

    fn subscribe_cwnd(&mut self, socket: SocketId) -> SubscriptionId {
        let id = SubscriptionId(100 + self.cwnd_subscriptions.len() as u64);
        self.cwnd_subscriptions.push((id, socket));
        id
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) {
        self.unsubscribed.push(subscription);
    }
}

pub fn drop_event(kind: DropKind) -> DropEvent {
    DropEvent {
        time: SimTime::ZERO,
        kind,
        tuple: FiveTuple {
            source: Endpoint::new(Ipv4Addr::new(10, 1, 1, 1), 49154),
            destination: Endpoint::new(Ipv4Addr::new(10, 1, 1, 2), 12345),
            protocol: Protocol::Udp,
        },
        size: 1054,
    }
}
