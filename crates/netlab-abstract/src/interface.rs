use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use thiserror::Error;

use crate::config::ConfigError;
use crate::flow::{FiveTuple, FlowSpec, FlowTable};
use crate::units::SimTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SinkId(pub u32);

/// Handle of a TCP socket, returned when its flow is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SocketId(pub u32);

/// Observer-chosen identifier of a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

/// What the engine hands back for every installed FlowSpec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowBinding {
    /// `FlowSpec::id` this binding was created for.
    pub spec_id: u32,
    pub tuple: FiveTuple,
    pub sink: SinkId,
    /// Present for TCP flows only.
    pub socket: Option<SocketId>,
}

/// Cumulative application bytes a sink has received. Owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkState {
    pub sink: SinkId,
    pub spec_id: u32,
    pub cumulative_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropKind {
    /// The DropTail transmit queue was full.
    QueueOverflow,
    /// The receive error model corrupted the packet.
    ReceiveError,
}

/// A link-layer packet drop, as delivered to drop subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropEvent {
    pub time: SimTime,
    pub kind: DropKind,
    pub tuple: FiveTuple,
    pub size: u32,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("address {0} is not attached to the bottleneck link")]
    UnknownAddress(Ipv4Addr),
    #[error("port {port} on {address} is already bound")]
    PortInUse { address: Ipv4Addr, port: u16 },
    #[error("flows cannot be installed once the run has started")]
    AlreadyRunning,
    #[error("the engine has already run to its horizon")]
    AlreadyRan,
}

/// The capability an engine gives an observer during a callback.
///
/// Requests made through the context take effect once the callback returns,
/// at the same simulated instant.
pub trait HostContext {
    fn now(&self) -> SimTime;

    fn horizon(&self) -> SimTime;

    /// Cumulative bytes received by a sink, or `None` for an unknown handle.
    fn sink_total_rx(&self, sink: SinkId) -> Option<u64>;

    /// Ask for `Observer::on_timer(timer)` at `at`. Times in the past run at `now`.
    fn schedule(&mut self, at: SimTime, timer: TimerId);

    /// Cancel every pending expiry of `timer`.
    fn cancel(&mut self, timer: TimerId);

    /// Start receiving congestion-window changes of `socket`.
    fn subscribe_cwnd(&mut self, socket: SocketId) -> SubscriptionId;

    fn unsubscribe(&mut self, subscription: SubscriptionId);
}

/// Receives engine callbacks, strictly in non-decreasing time order with
/// FIFO tie-breaking, on the engine's single thread.
pub trait Observer {
    fn on_timer(&mut self, ctx: &mut dyn HostContext, timer: TimerId);

    fn on_drop(
        &mut self,
        _ctx: &mut dyn HostContext,
        _subscription: SubscriptionId,
        _event: &DropEvent,
    ) {
    }

    fn on_cwnd_change(
        &mut self,
        _ctx: &mut dyn HostContext,
        _subscription: SubscriptionId,
        _socket: SocketId,
        _old: u32,
        _new: u32,
    ) {
    }
}

/// Setup and teardown surface of a simulation engine.
pub trait SimulationHost {
    fn horizon(&self) -> SimTime;

    /// Address of the node hosting every source.
    fn sender_address(&self) -> Ipv4Addr;

    /// Address of the node hosting every sink.
    fn receiver_address(&self) -> Ipv4Addr;

    fn install_flow(&mut self, spec: &FlowSpec) -> Result<FlowBinding, EngineError>;

    fn schedule(&mut self, at: SimTime, timer: TimerId);

    fn subscribe_drops(&mut self) -> SubscriptionId;

    fn subscribe_cwnd(&mut self, socket: SocketId) -> SubscriptionId;

    fn unsubscribe(&mut self, subscription: SubscriptionId);

    /// Run until the horizon, dispatching callbacks to `observer`. Returns the stop time.
    fn run(&mut self, observer: &mut dyn Observer) -> Result<SimTime, EngineError>;

    fn sink_total_rx(&self, sink: SinkId) -> Option<u64>;

    fn sinks(&self) -> Vec<SinkState>;

    /// Classifier output; meaningful once `run` has returned.
    fn flow_table(&self) -> FlowTable;
}
