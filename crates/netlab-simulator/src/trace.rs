use serde::Serialize;

use netlab_abstract::{FlowTable, SimConfig, SimTime, SinkState, SocketId};

use crate::engine::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkEventKind {
    Enqueue,
    Dequeue,
    Receive,
    Drop,
}

impl LinkEventKind {
    pub fn symbol(self) -> char {
        match self {
            LinkEventKind::Enqueue => '+',
            LinkEventKind::Dequeue => '-',
            LinkEventKind::Receive => 'r',
            LinkEventKind::Drop => 'd',
        }
    }
}

/// One device-level event of the bottleneck link.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEvent {
    pub time: SimTime,
    pub kind: LinkEventKind,
    /// Node owning the device the event happened on.
    pub node: NodeId,
    pub description: String,
}

impl LinkEvent {
    /// Line of the ASCII `.tr` trace.
    pub fn ascii_line(&self) -> String {
        format!(
            "{} {:.9} /NodeList/{}/DeviceList/0 {}",
            self.kind.symbol(),
            self.time.as_secs_f64(),
            self.node.index(),
            self.description
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TcpSocketReport {
    pub socket: SocketId,
    pub spec_id: u32,
    pub bytes_sent: u64,
    pub bytes_acked: u64,
    pub final_cwnd: u32,
    pub timeouts: u32,
    pub fast_retransmits: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub stop_time: SimTime,
    pub sinks: Vec<SinkState>,
    pub sockets: Vec<TcpSocketReport>,
    pub flows: FlowTable,
    /// Peak queue occupancy, sender device first.
    pub max_queue_len: [usize; 2],
    pub link_events: Vec<LinkEvent>,
}
