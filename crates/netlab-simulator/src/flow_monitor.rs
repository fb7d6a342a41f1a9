use std::collections::HashMap;

use netlab_abstract::{DropKind, FiveTuple, FlowEntry, FlowId, FlowStatsRecord, FlowTable, SimTime};

#[derive(Debug)]
struct Tracked {
    entry: FlowEntry,
    last_delay: Option<SimTime>,
}

/// Per-flow IP-level accounting.
///
/// Packets are classified by five-tuple; every distinct tuple gets the next
/// flow id in order of first transmission. Transmissions are counted when the
/// packet is handed to the device, receptions when it reaches the destination
/// node.
#[derive(Debug, Default)]
pub struct FlowMonitor {
    ids: HashMap<FiveTuple, FlowId>,
    flows: Vec<Tracked>,
}

impl FlowMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&mut self, tuple: &FiveTuple) -> FlowId {
        if let Some(id) = self.ids.get(tuple) {
            return *id;
        }
        let id = self.flows.len() as FlowId + 1;
        self.ids.insert(*tuple, id);
        self.flows.push(Tracked {
            entry: FlowEntry {
                flow_id: id,
                tuple: *tuple,
                stats: FlowStatsRecord::default(),
            },
            last_delay: None,
        });
        id
    }

    fn stats_mut(&mut self, tuple: &FiveTuple) -> (&mut FlowStatsRecord, &mut Option<SimTime>) {
        let id = self.classify(tuple);
        let tracked = &mut self.flows[(id - 1) as usize];
        (&mut tracked.entry.stats, &mut tracked.last_delay)
    }

    pub fn record_tx(&mut self, now: SimTime, tuple: &FiveTuple, ip_size: u32) {
        let (stats, _) = self.stats_mut(tuple);
        stats.tx_packets += 1;
        stats.tx_bytes += ip_size as u64;
        stats.time_first_tx.get_or_insert(now);
        stats.time_last_tx = Some(now);
    }

    pub fn record_rx(&mut self, now: SimTime, tuple: &FiveTuple, ip_size: u32, sent_at: SimTime) {
        let (stats, last_delay) = self.stats_mut(tuple);
        let delay = now.saturating_sub(sent_at);
        stats.delay_sum = stats.delay_sum + delay;
        if let Some(previous) = *last_delay {
            if stats.rx_packets > 0 {
                let diff = if delay > previous {
                    delay - previous
                } else {
                    previous - delay
                };
                stats.jitter_sum = stats.jitter_sum + diff;
            }
        }
        *last_delay = Some(delay);
        stats.rx_packets += 1;
        stats.rx_bytes += ip_size as u64;
        stats.time_first_rx.get_or_insert(now);
        stats.time_last_rx = Some(now);
    }

    pub fn record_drop(&mut self, tuple: &FiveTuple, kind: DropKind) {
        let (stats, _) = self.stats_mut(tuple);
        match kind {
            DropKind::QueueOverflow => stats.dropped.queue_overflow += 1,
            DropKind::ReceiveError => stats.dropped.receive_error += 1,
        }
    }

    pub fn flow_id(&self, tuple: &FiveTuple) -> Option<FlowId> {
        self.ids.get(tuple).copied()
    }

    pub fn table(&self) -> FlowTable {
        self.flows
            .iter()
            .map(|t| (t.entry.flow_id, t.entry.clone()))
            .collect()
    }
}
