use netlab_abstract::{DropEvent, DropKind, DropRecord, HostContext, SimulationHost, SubscriptionId};

/// Event-driven cumulative drop count, anchored at `(0, 0)` on the first drop.
#[derive(Debug)]
pub struct DropCounter {
    kinds: Vec<DropKind>,
    subscription: Option<SubscriptionId>,
    count: u64,
    anchored: bool,
    series: Vec<DropRecord>,
}

impl DropCounter {
    pub fn new(kinds: Vec<DropKind>) -> Self {
        Self {
            kinds,
            subscription: None,
            count: 0,
            anchored: false,
            series: Vec::new(),
        }
    }

    pub fn install(&mut self, host: &mut dyn SimulationHost) {
        self.subscription = Some(host.subscribe_drops());
    }

    pub fn detach(&mut self, ctx: &mut dyn HostContext) {
        if let Some(subscription) = self.subscription.take() {
            ctx.unsubscribe(subscription);
        }
    }

    pub fn on_drop(&mut self, ctx: &dyn HostContext, subscription: SubscriptionId, event: &DropEvent) {
        if self.subscription != Some(subscription) || !self.kinds.contains(&event.kind) {
            return;
        }
        if !self.anchored {
            self.anchored = true;
            self.series.push(DropRecord::ANCHOR);
        }
        self.count += 1;
        self.series.push(DropRecord {
            time: ctx.now(),
            cumulative: self.count,
        });
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn series(&self) -> &[DropRecord] {
        &self.series
    }

    pub fn into_series(self) -> Vec<DropRecord> {
        self.series
    }
}
