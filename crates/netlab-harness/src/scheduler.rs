use std::net::Ipv4Addr;

use netlab_abstract::{
    ByteCounterScope, ConfigError, DataRate, Endpoint, FlowBinding, FlowKind, FlowSpec, SimTime,
    SimulationHost, SinkId, TrafficPlan,
};
use tracing::info;

use crate::error::HarnessError;

/// Source port of the bulk flow; CBR stream `i` uses the following ports.
pub const BULK_SOURCE_PORT: u16 = 49153;

/// Turns a `TrafficPlan` into the flow set of one run: flow 0 is the TCP bulk
/// transfer, flows `1..=k` are the CBR streams in plan order.
#[derive(Debug, Clone)]
pub struct TrafficScheduler {
    plan: TrafficPlan,
    horizon: SimTime,
}

/// Bindings the engine returned, in the same order as the specs.
#[derive(Debug, Clone)]
pub struct InstalledTraffic {
    pub bulk: FlowBinding,
    pub cbr: Vec<FlowBinding>,
}

impl InstalledTraffic {
    pub fn all(&self) -> impl Iterator<Item = &FlowBinding> {
        std::iter::once(&self.bulk).chain(self.cbr.iter())
    }

    /// Sinks whose totals feed the byte-counter series.
    pub fn sinks_in_scope(&self, scope: &ByteCounterScope) -> Vec<SinkId> {
        match scope {
            ByteCounterScope::All => self.all().map(|b| b.sink).collect(),
            ByteCounterScope::BulkOnly => vec![self.bulk.sink],
            ByteCounterScope::Flows(ids) => self
                .all()
                .filter(|b| ids.contains(&b.spec_id))
                .map(|b| b.sink)
                .collect(),
        }
    }
}

impl TrafficScheduler {
    pub fn new(plan: TrafficPlan, horizon: SimTime) -> Self {
        Self { plan, horizon }
    }

    fn sink_window(&self) -> (SimTime, SimTime) {
        (
            self.plan.sink_start,
            self.plan.sink_stop.unwrap_or(self.horizon),
        )
    }

    /// Build and validate every flow spec.
    pub fn flow_specs(
        &self,
        sender: Ipv4Addr,
        receiver: Ipv4Addr,
    ) -> Result<Vec<FlowSpec>, HarnessError> {
        let (sink_start, sink_stop) = self.sink_window();
        let bulk = &self.plan.bulk;
        let mut specs = vec![FlowSpec {
            id: 0,
            kind: FlowKind::TcpBulk {
                max_bytes: bulk.max_bytes,
            },
            source: Endpoint::new(sender, BULK_SOURCE_PORT),
            sink: Endpoint::new(receiver, bulk.port),
            start: bulk.start,
            stop: bulk.stop,
            sink_start,
            sink_stop,
        }];
        for (i, stream) in self.plan.cbr.iter().enumerate() {
            let id = u32::try_from(i + 1).unwrap_or(u32::MAX);
            specs.push(FlowSpec {
                id,
                kind: FlowKind::UdpCbr {
                    packet_size: stream.packet_size,
                    rate: stream.rate,
                },
                source: Endpoint::new(sender, port_at(id, BULK_SOURCE_PORT, i + 1)?),
                sink: Endpoint::new(receiver, port_at(id, self.plan.cbr_base_port, i)?),
                start: stream.start,
                stop: stream.stop,
                sink_start,
                sink_stop,
            });
        }
        for spec in &specs {
            spec.validate(self.horizon)?;
        }
        Ok(specs)
    }

    /// Install every flow on `host`. Nothing changes after this returns.
    pub fn install(&self, host: &mut dyn SimulationHost) -> Result<InstalledTraffic, HarnessError> {
        let specs = self.flow_specs(host.sender_address(), host.receiver_address())?;
        let mut bindings = Vec::with_capacity(specs.len());
        for spec in &specs {
            bindings.push(host.install_flow(spec)?);
        }
        let mut bindings = bindings.into_iter();
        let Some(bulk) = bindings.next() else {
            return Err(HarnessError::FlowNotFound("bulk".into()));
        };
        info!(
            "installed bulk flow {} and {} CBR streams",
            bulk.tuple,
            self.plan.cbr.len()
        );
        Ok(InstalledTraffic {
            bulk,
            cbr: bindings.collect(),
        })
    }

    /// Aggregate CBR rate of the streams active at `t`.
    pub fn offered_cbr_load_at(&self, t: SimTime) -> DataRate {
        self.plan
            .cbr
            .iter()
            .filter(|s| s.start <= t && t < s.stop)
            .map(|s| s.rate)
            .sum()
    }
}

/// `base + offset` as a port, or the error naming `flow`.
fn port_at(flow: u32, base: u16, offset: usize) -> Result<u16, HarnessError> {
    u16::try_from(offset)
        .ok()
        .and_then(|o| base.checked_add(o))
        .ok_or(HarnessError::Config(ConfigError::PortOutOfRange { flow, base, offset }))
}
