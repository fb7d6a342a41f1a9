pub mod cbr;
pub mod engine;
pub mod flow_monitor;
pub mod link;
pub mod packet;
pub mod tcp;
pub mod trace;

pub use engine::{NodeId, RECEIVER_ADDRESS, SENDER_ADDRESS, Simulator};
pub use trace::{LinkEvent, LinkEventKind, SimulationReport, TcpSocketReport};
