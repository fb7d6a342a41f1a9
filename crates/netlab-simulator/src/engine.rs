use crate::cbr::CbrSource;
use crate::flow_monitor::FlowMonitor;
use crate::link::{EnqueueOutcome, LinkDirection, RateErrorModel};
use crate::packet::{Packet, Transport};
use crate::tcp::{BulkSender, TcpActions, TcpReceiver};
use crate::trace::{LinkEvent, LinkEventKind, SimulationReport, TcpSocketReport};
use netlab_abstract::{
    DropEvent, DropKind, Endpoint, EngineError, FiveTuple, FlowBinding, FlowKind, FlowSpec,
    FlowTable, HostContext, Observer, Protocol, SimConfig, SimTime, SimulationHost, SinkId,
    SinkState, SocketId, SubscriptionId, TimerId,
};
use rand::SeedableRng;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::net::Ipv4Addr;
use tracing::{debug, info};

pub const SENDER_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 1);
pub const RECEIVER_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 2);

/// The two ends of the bottleneck link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeId {
    Sender,
    Receiver,
}

impl NodeId {
    pub fn peer(&self) -> Self {
        match self {
            NodeId::Sender => NodeId::Receiver,
            NodeId::Receiver => NodeId::Sender,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            NodeId::Sender => 0,
            NodeId::Receiver => 1,
        }
    }

    pub fn address(&self) -> Ipv4Addr {
        match self {
            NodeId::Sender => SENDER_ADDRESS,
            NodeId::Receiver => RECEIVER_ADDRESS,
        }
    }
}

#[derive(Debug)]
enum EventType {
    AppStart { app: usize },
    AppStop { app: usize },
    CbrSend { app: usize },
    TcpTimeout { app: usize, generation: u64 },
    TransmitComplete { from: NodeId },
    PacketArrival { to: NodeId, packet: Packet },
    SinkStart { sink: usize },
    SinkStop { sink: usize },
    ObserverTimer { timer: TimerId, generation: u64 },
}

#[derive(Debug)]
struct Event {
    time: SimTime,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[derive(Debug)]
struct BulkApp {
    spec_id: u32,
    tuple: FiveTuple,
    socket: SocketId,
    sender: BulkSender,
    rto_generation: u64,
}

#[derive(Debug)]
struct CbrApp {
    tuple: FiveTuple,
    source: CbrSource,
}

#[derive(Debug)]
enum Application {
    Bulk(BulkApp),
    Cbr(CbrApp),
}

#[derive(Debug)]
struct Sink {
    spec_id: u32,
    active: bool,
    cumulative_bytes: u64,
    receiver: Option<TcpReceiver>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subscription {
    Drops,
    Cwnd(SocketId),
}

#[derive(Debug)]
enum Notification {
    Drop(DropEvent),
    Cwnd { socket: SocketId, old: u32, new: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Setup,
    Running,
    Finished,
}

/// Requests buffered during an observer callback
#[derive(Default)]
struct ActionBuffer {
    timers_start: Vec<(SimTime, TimerId)>,
    timers_cancel: Vec<TimerId>,
    cwnd_subscriptions: Vec<(SubscriptionId, SocketId)>,
    unsubscriptions: Vec<SubscriptionId>,
}

/// Context implementation passed to the observer
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    now: SimTime,
    horizon: SimTime,
    sinks: &'a [Sink],
    next_subscription: &'a mut u64,
}

impl HostContext for ScopedContext<'_> {
    fn now(&self) -> SimTime {
        self.now
    }

    fn horizon(&self) -> SimTime {
        self.horizon
    }

    fn sink_total_rx(&self, sink: SinkId) -> Option<u64> {
        self.sinks
            .get(sink.0 as usize)
            .map(|s| s.cumulative_bytes)
    }

    fn schedule(&mut self, at: SimTime, timer: TimerId) {
        self.buffer.timers_start.push((at.max(self.now), timer));
    }

    fn cancel(&mut self, timer: TimerId) {
        self.buffer.timers_cancel.push(timer);
    }

    fn subscribe_cwnd(&mut self, socket: SocketId) -> SubscriptionId {
        let id = SubscriptionId(*self.next_subscription);
        *self.next_subscription += 1;
        self.buffer.cwnd_subscriptions.push((id, socket));
        id
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) {
        self.buffer.unsubscriptions.push(subscription);
    }
}

/// Discrete-event model of two nodes joined by one point-to-point link.
///
/// Every source lives on the sender node and every sink on the receiver node.
/// Each direction has its own DropTail queue; the receiver's device applies
/// the rate error model to arriving packets.
pub struct Simulator {
    time: SimTime,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,
    state: RunState,

    config: SimConfig,
    rng: rand::rngs::StdRng,
    error_model: RateErrorModel,

    links: [LinkDirection; 2],
    apps: Vec<Application>,
    sinks: Vec<Sink>,
    /// (protocol, local endpoint) -> sink index, on the receiver node.
    sink_ports: HashMap<(Protocol, Endpoint), usize>,
    /// Data five-tuple -> bulk app index, for routing ACKs back.
    connections: HashMap<FiveTuple, usize>,
    bound: HashSet<(Protocol, Endpoint)>,
    next_socket: u32,
    next_packet_uid: u64,

    monitor: FlowMonitor,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    next_subscription: u64,
    pending: Vec<Notification>,

    /// Timer generations to handle cancellation.
    timer_generations: HashMap<TimerId, u64>,

    pub link_events: Vec<LinkEvent>,
}

impl Simulator {
    pub fn new(config: SimConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);
        let error_model = RateErrorModel::new(config.link.error_rate, config.link.error_unit);
        let links = [
            LinkDirection::new(&config.link),
            LinkDirection::new(&config.link),
        ];

        Ok(Self {
            time: SimTime::ZERO,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            state: RunState::Setup,
            config,
            rng,
            error_model,
            links,
            apps: Vec::new(),
            sinks: Vec::new(),
            sink_ports: HashMap::new(),
            connections: HashMap::new(),
            bound: HashSet::new(),
            next_socket: 0,
            next_packet_uid: 0,
            monitor: FlowMonitor::new(),
            subscriptions: BTreeMap::new(),
            next_subscription: 1,
            pending: Vec::new(),
            timer_generations: HashMap::new(),
            link_events: Vec::new(),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn remaining_events(&self) -> usize {
        self.event_queue.len()
    }

    fn push_event(&mut self, time: SimTime, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    fn next_uid(&mut self) -> u64 {
        self.next_packet_uid += 1;
        self.next_packet_uid
    }

    fn ensure_setup(&self) -> Result<(), EngineError> {
        match self.state {
            RunState::Setup => Ok(()),
            RunState::Running => Err(EngineError::AlreadyRunning),
            RunState::Finished => Err(EngineError::AlreadyRan),
        }
    }

    fn bind(&mut self, protocol: Protocol, endpoint: Endpoint) -> Result<(), EngineError> {
        if !self.bound.insert((protocol, endpoint)) {
            return Err(EngineError::PortInUse {
                address: endpoint.address,
                port: endpoint.port,
            });
        }
        Ok(())
    }

    fn schedule_timer(&mut self, at: SimTime, timer: TimerId) {
        let generation = *self.timer_generations.entry(timer).or_insert(0);
        let at = at.max(self.time);
        self.push_event(at, EventType::ObserverTimer { timer, generation });
    }

    fn trace(&mut self, kind: LinkEventKind, node: NodeId, packet: &Packet) {
        if self.config.link_tracing {
            self.link_events.push(LinkEvent {
                time: self.time,
                kind,
                node,
                description: packet.describe(),
            });
        }
    }

    fn drop_packet(&mut self, node: NodeId, packet: &Packet, kind: DropKind) {
        debug!("[{:?}] drop ({:?}) {}", node, kind, packet.describe());
        self.trace(LinkEventKind::Drop, node, packet);
        self.monitor.record_drop(&packet.tuple, kind);
        self.pending.push(Notification::Drop(DropEvent {
            time: self.time,
            kind,
            tuple: packet.tuple,
            size: packet.wire_size(),
        }));
    }

    /// Hand a packet to the device of `from`.
    fn send_from(&mut self, from: NodeId, packet: Packet) {
        self.monitor
            .record_tx(self.time, &packet.tuple, packet.ip_size());
        let description = self.config.link_tracing.then(|| packet.describe());
        match self.links[from.index()].enqueue(self.time, packet) {
            EnqueueOutcome::Transmitting {
                packet,
                tx_done,
                arrival,
            } => {
                self.trace(LinkEventKind::Enqueue, from, &packet);
                self.trace(LinkEventKind::Dequeue, from, &packet);
                self.push_event(tx_done, EventType::TransmitComplete { from });
                self.push_event(
                    arrival,
                    EventType::PacketArrival {
                        to: from.peer(),
                        packet,
                    },
                );
            }
            EnqueueOutcome::Queued => {
                if let Some(description) = description {
                    self.link_events.push(LinkEvent {
                        time: self.time,
                        kind: LinkEventKind::Enqueue,
                        node: from,
                        description,
                    });
                }
            }
            EnqueueOutcome::Dropped(packet) => {
                self.drop_packet(from, &packet, DropKind::QueueOverflow);
            }
        }
    }

    fn apply_tcp_actions(&mut self, app: usize, actions: TcpActions) {
        let Some(Application::Bulk(bulk)) = self.apps.get_mut(app) else {
            return;
        };
        let tuple = bulk.tuple;
        let socket = bulk.socket;
        if actions.cancel_rto {
            bulk.rto_generation += 1;
        }
        let mut timeout = None;
        if let Some(rto) = actions.arm_rto {
            bulk.rto_generation += 1;
            timeout = Some((self.time + rto, bulk.rto_generation));
        }
        if let Some((old, new)) = actions.cwnd_change {
            self.pending.push(Notification::Cwnd { socket, old, new });
        }
        if let Some((at, generation)) = timeout {
            self.push_event(at, EventType::TcpTimeout { app, generation });
        }
        for segment in actions.segments {
            let uid = self.next_uid();
            let packet = Packet::data_segment(uid, tuple, segment.seq, segment.len, self.time);
            self.send_from(NodeId::Sender, packet);
        }
    }

    fn on_arrival(&mut self, to: NodeId, packet: Packet) {
        if to == NodeId::Receiver
            && self
                .error_model
                .is_corrupt(&mut self.rng, packet.wire_size())
        {
            self.drop_packet(to, &packet, DropKind::ReceiveError);
            return;
        }
        self.trace(LinkEventKind::Receive, to, &packet);
        self.monitor.record_rx(
            self.time,
            &packet.tuple,
            packet.ip_size(),
            packet.created_at,
        );

        match (to, &packet.transport) {
            (NodeId::Receiver, Transport::Udp) => {
                let key = (Protocol::Udp, packet.tuple.destination);
                if let Some(&idx) = self.sink_ports.get(&key) {
                    let sink = &mut self.sinks[idx];
                    if sink.active {
                        sink.cumulative_bytes += packet.payload_len as u64;
                    }
                }
            }
            (NodeId::Receiver, Transport::Tcp(header)) => {
                let key = (Protocol::Tcp, packet.tuple.destination);
                let Some(&idx) = self.sink_ports.get(&key) else {
                    return;
                };
                let sink = &mut self.sinks[idx];
                let Some(receiver) = sink.receiver.as_mut() else {
                    return;
                };
                let delivered = receiver.on_segment(header.seq_num, packet.payload_len);
                let ack_num = receiver.rcv_nxt();
                if sink.active {
                    sink.cumulative_bytes += delivered;
                }
                let uid = self.next_uid();
                let ack = Packet::ack(
                    uid,
                    packet.tuple.reversed(),
                    ack_num,
                    self.config.tcp.receive_window,
                    self.time,
                );
                self.send_from(NodeId::Receiver, ack);
            }
            (NodeId::Sender, Transport::Tcp(header)) if header.is_ack() => {
                let Some(&app) = self.connections.get(&packet.tuple.reversed()) else {
                    return;
                };
                let mut actions = TcpActions::default();
                if let Some(Application::Bulk(bulk)) = self.apps.get_mut(app) {
                    bulk.sender
                        .on_ack(self.time, header.ack_num, header.window_size, &mut actions);
                }
                self.apply_tcp_actions(app, actions);
            }
            _ => {}
        }
    }

    fn handle(&mut self, event_type: EventType) {
        match event_type {
            EventType::AppStart { app } => match self.apps.get_mut(app) {
                Some(Application::Bulk(bulk)) => {
                    info!("bulk flow {} starts at {}", bulk.spec_id, self.time);
                    let mut actions = TcpActions::default();
                    bulk.sender.start(self.time, &mut actions);
                    self.apply_tcp_actions(app, actions);
                }
                Some(Application::Cbr(cbr)) => {
                    if let Some(first) = cbr.source.first_send(self.time) {
                        self.push_event(first, EventType::CbrSend { app });
                    }
                }
                None => {}
            },
            EventType::AppStop { app } => {
                if let Some(Application::Bulk(bulk)) = self.apps.get_mut(app) {
                    bulk.sender.stop();
                }
            }
            EventType::CbrSend { app } => {
                let Some(Application::Cbr(cbr)) = self.apps.get_mut(app) else {
                    return;
                };
                let tuple = cbr.tuple;
                let size = cbr.source.packet_size;
                let next = cbr.source.on_send(self.time);
                let uid = self.next_uid();
                let packet = Packet::datagram(uid, tuple, size, self.time);
                self.send_from(NodeId::Sender, packet);
                if let Some(next) = next {
                    self.push_event(next, EventType::CbrSend { app });
                }
            }
            EventType::TcpTimeout { app, generation } => {
                let mut actions = TcpActions::default();
                match self.apps.get_mut(app) {
                    Some(Application::Bulk(bulk)) if bulk.rto_generation == generation => {
                        bulk.sender.on_timeout(self.time, &mut actions);
                    }
                    _ => {
                        debug!("Skipping cancelled retransmission timer of app {}", app);
                        return;
                    }
                }
                self.apply_tcp_actions(app, actions);
            }
            EventType::TransmitComplete { from } => {
                if let Some((packet, tx_done, arrival)) =
                    self.links[from.index()].transmit_complete(self.time)
                {
                    self.trace(LinkEventKind::Dequeue, from, &packet);
                    self.push_event(tx_done, EventType::TransmitComplete { from });
                    self.push_event(
                        arrival,
                        EventType::PacketArrival {
                            to: from.peer(),
                            packet,
                        },
                    );
                }
            }
            EventType::PacketArrival { to, packet } => self.on_arrival(to, packet),
            EventType::SinkStart { sink } => {
                if let Some(sink) = self.sinks.get_mut(sink) {
                    sink.active = true;
                }
            }
            EventType::SinkStop { sink } => {
                if let Some(sink) = self.sinks.get_mut(sink) {
                    sink.active = false;
                }
            }
            // Observer timers are dispatched by `run`.
            EventType::ObserverTimer { .. } => {}
        }
    }

    fn call_observer<F>(&mut self, observer: &mut dyn Observer, callback: F)
    where
        F: FnOnce(&mut dyn Observer, &mut dyn HostContext),
    {
        let mut buffer = ActionBuffer::default();
        {
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                now: self.time,
                horizon: self.config.horizon,
                sinks: &self.sinks,
                next_subscription: &mut self.next_subscription,
            };
            callback(observer, &mut ctx);
        }
        self.process_actions(buffer);
    }

    fn process_actions(&mut self, buffer: ActionBuffer) {
        // Handle timer cancellations by incrementing the generation counter
        for timer in buffer.timers_cancel {
            *self.timer_generations.entry(timer).or_insert(0) += 1;
        }
        for (at, timer) in buffer.timers_start {
            self.schedule_timer(at, timer);
        }
        for (id, socket) in buffer.cwnd_subscriptions {
            self.subscriptions.insert(id, Subscription::Cwnd(socket));
        }
        for id in buffer.unsubscriptions {
            self.subscriptions.remove(&id);
        }
    }

    /// Deliver the notifications raised by the last event, at its timestamp.
    fn dispatch_notifications(&mut self, observer: &mut dyn Observer) {
        let pending = std::mem::take(&mut self.pending);
        for notification in pending {
            let targets: Vec<SubscriptionId> = self
                .subscriptions
                .iter()
                .filter(|(_, sub)| match (&notification, sub) {
                    (Notification::Drop(_), Subscription::Drops) => true,
                    (Notification::Cwnd { socket, .. }, Subscription::Cwnd(s)) => socket == s,
                    _ => false,
                })
                .map(|(id, _)| *id)
                .collect();
            for id in targets {
                // An earlier callback may have unsubscribed this one.
                if !self.subscriptions.contains_key(&id) {
                    continue;
                }
                match &notification {
                    Notification::Drop(event) => {
                        self.call_observer(observer, |o, ctx| o.on_drop(ctx, id, event));
                    }
                    Notification::Cwnd { socket, old, new } => {
                        let (socket, old, new) = (*socket, *old, *new);
                        self.call_observer(observer, |o, ctx| {
                            o.on_cwnd_change(ctx, id, socket, old, new)
                        });
                    }
                }
            }
        }
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        let sockets = self
            .apps
            .iter()
            .filter_map(|app| match app {
                Application::Bulk(bulk) => Some(TcpSocketReport {
                    socket: bulk.socket,
                    spec_id: bulk.spec_id,
                    bytes_sent: bulk.sender.bytes_sent(),
                    bytes_acked: bulk.sender.bytes_acked(),
                    final_cwnd: bulk.sender.cwnd(),
                    timeouts: bulk.sender.timeouts,
                    fast_retransmits: bulk.sender.fast_retransmits,
                }),
                Application::Cbr(_) => None,
            })
            .collect();
        SimulationReport {
            config: self.config.clone(),
            stop_time: self.time,
            sinks: self.sinks(),
            sockets,
            flows: self.monitor.table(),
            max_queue_len: [self.links[0].max_queue_len, self.links[1].max_queue_len],
            link_events: self.link_events.clone(),
        }
    }
}

impl SimulationHost for Simulator {
    fn horizon(&self) -> SimTime {
        self.config.horizon
    }

    fn sender_address(&self) -> Ipv4Addr {
        SENDER_ADDRESS
    }

    fn receiver_address(&self) -> Ipv4Addr {
        RECEIVER_ADDRESS
    }

    fn install_flow(&mut self, spec: &FlowSpec) -> Result<FlowBinding, EngineError> {
        self.ensure_setup()?;
        spec.validate(self.config.horizon)?;
        if spec.source.address != SENDER_ADDRESS {
            return Err(EngineError::UnknownAddress(spec.source.address));
        }
        if spec.sink.address != RECEIVER_ADDRESS {
            return Err(EngineError::UnknownAddress(spec.sink.address));
        }
        let protocol = spec.protocol();
        if self.bound.contains(&(protocol, spec.sink)) {
            return Err(EngineError::PortInUse {
                address: spec.sink.address,
                port: spec.sink.port,
            });
        }
        self.bind(protocol, spec.source)?;
        self.bind(protocol, spec.sink)?;

        let tuple = spec.five_tuple();
        let sink_index = self.sinks.len();
        self.sinks.push(Sink {
            spec_id: spec.id,
            active: false,
            cumulative_bytes: 0,
            receiver: (protocol == Protocol::Tcp).then(TcpReceiver::default),
        });
        self.sink_ports.insert((protocol, spec.sink), sink_index);
        self.push_event(spec.sink_start, EventType::SinkStart { sink: sink_index });
        self.push_event(spec.sink_stop, EventType::SinkStop { sink: sink_index });

        let app = self.apps.len();
        let socket = match spec.kind {
            FlowKind::TcpBulk { max_bytes } => {
                let socket = SocketId(self.next_socket);
                self.next_socket += 1;
                self.apps.push(Application::Bulk(BulkApp {
                    spec_id: spec.id,
                    tuple,
                    socket,
                    sender: BulkSender::new(&self.config.tcp, max_bytes),
                    rto_generation: 0,
                }));
                self.connections.insert(tuple, app);
                self.push_event(spec.stop, EventType::AppStop { app });
                Some(socket)
            }
            FlowKind::UdpCbr { packet_size, rate } => {
                self.apps.push(Application::Cbr(CbrApp {
                    tuple,
                    source: CbrSource::new(packet_size, rate, spec.stop),
                }));
                None
            }
        };
        self.push_event(spec.start, EventType::AppStart { app });
        debug!("installed flow {} as {}", spec.id, tuple);

        Ok(FlowBinding {
            spec_id: spec.id,
            tuple,
            sink: SinkId(sink_index as u32),
            socket,
        })
    }

    fn schedule(&mut self, at: SimTime, timer: TimerId) {
        self.schedule_timer(at, timer);
    }

    fn subscribe_drops(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscriptions.insert(id, Subscription::Drops);
        id
    }

    fn subscribe_cwnd(&mut self, socket: SocketId) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscriptions.insert(id, Subscription::Cwnd(socket));
        id
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) {
        self.subscriptions.remove(&subscription);
    }

    fn run(&mut self, observer: &mut dyn Observer) -> Result<SimTime, EngineError> {
        self.ensure_setup()?;
        self.state = RunState::Running;
        let horizon = self.config.horizon;
        info!(
            "running {} flows until {}s ({} / {:?})",
            self.apps.len(),
            horizon,
            self.config.link.data_rate,
            self.config.tcp.congestion
        );

        while let Some(event) = self.event_queue.peek() {
            if event.time > horizon {
                break;
            }
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.time = event.time;

            match event.event_type {
                EventType::ObserverTimer { timer, generation } => {
                    if self.timer_generations.get(&timer) != Some(&generation) {
                        debug!("Skipping cancelled observer timer {:?}", timer);
                        continue;
                    }
                    self.call_observer(observer, |o, ctx| o.on_timer(ctx, timer));
                }
                other => self.handle(other),
            }
            self.dispatch_notifications(observer);
        }

        let discarded = self.event_queue.len();
        self.event_queue.clear();
        self.time = horizon;
        self.state = RunState::Finished;
        info!(
            "simulation stopped at {}s ({} pending events discarded)",
            horizon, discarded
        );
        Ok(horizon)
    }

    fn sink_total_rx(&self, sink: SinkId) -> Option<u64> {
        self.sinks.get(sink.0 as usize).map(|s| s.cumulative_bytes)
    }

    fn sinks(&self) -> Vec<SinkState> {
        self.sinks
            .iter()
            .enumerate()
            .map(|(i, s)| SinkState {
                sink: SinkId(i as u32),
                spec_id: s.spec_id,
                cumulative_bytes: s.cumulative_bytes,
            })
            .collect()
    }

    fn flow_table(&self) -> FlowTable {
        self.monitor.table()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlab_abstract::{DataRate, LinkConfig};

    #[derive(Default)]
    struct Recorder {
        timers: Vec<(SimTime, TimerId)>,
        drops: Vec<(SimTime, DropKind)>,
        cwnd: Vec<(SimTime, u32, u32)>,
        subscribe_on: Option<SocketId>,
    }

    impl Observer for Recorder {
        fn on_timer(&mut self, ctx: &mut dyn HostContext, timer: TimerId) {
            self.timers.push((ctx.now(), timer));
            match timer.0 {
                // Cancels timer 0 before it fires.
                1 => ctx.cancel(TimerId(0)),
                2 => {
                    if let Some(socket) = self.subscribe_on {
                        ctx.subscribe_cwnd(socket);
                    }
                }
                _ => {}
            }
        }

        fn on_drop(&mut self, ctx: &mut dyn HostContext, _sub: SubscriptionId, event: &DropEvent) {
            self.drops.push((ctx.now(), event.kind));
        }

        fn on_cwnd_change(
            &mut self,
            ctx: &mut dyn HostContext,
            _sub: SubscriptionId,
            _socket: SocketId,
            old: u32,
            new: u32,
        ) {
            self.cwnd.push((ctx.now(), old, new));
        }
    }

    fn lossless() -> SimConfig {
        SimConfig {
            link: LinkConfig {
                error_rate: 0.0,
                ..LinkConfig::default()
            },
            ..SimConfig::default()
        }
    }

    fn endpoint(node: NodeId, port: u16) -> Endpoint {
        Endpoint::new(node.address(), port)
    }

    fn cbr_spec(id: u32, port: u16, rate: DataRate, start_ms: u64, stop_ms: u64) -> FlowSpec {
        FlowSpec {
            id,
            kind: FlowKind::UdpCbr {
                packet_size: 1024,
                rate,
            },
            source: endpoint(NodeId::Sender, 49154 + id as u16),
            sink: endpoint(NodeId::Receiver, port),
            start: SimTime::from_millis(start_ms),
            stop: SimTime::from_millis(stop_ms),
            sink_start: SimTime::ZERO,
            sink_stop: SimTime::from_millis(1800),
        }
    }

    fn bulk_spec(max_bytes: u64) -> FlowSpec {
        FlowSpec {
            id: 0,
            kind: FlowKind::TcpBulk { max_bytes },
            source: endpoint(NodeId::Sender, 49153),
            sink: endpoint(NodeId::Receiver, 12344),
            start: SimTime::ZERO,
            stop: SimTime::from_millis(1800),
            sink_start: SimTime::ZERO,
            sink_stop: SimTime::from_millis(1800),
        }
    }

    #[test]
    fn test_cancel_timer() {
        let mut sim = Simulator::new(lossless()).unwrap();
        sim.schedule(SimTime::from_millis(10), TimerId(0));
        sim.schedule(SimTime::from_millis(5), TimerId(1));
        let mut recorder = Recorder::default();
        sim.run(&mut recorder).unwrap();
        assert_eq!(recorder.timers, vec![(SimTime::from_millis(5), TimerId(1))]);
    }

    #[test]
    fn events_beyond_the_horizon_never_run() {
        let mut sim = Simulator::new(lossless()).unwrap();
        sim.schedule(SimTime::from_millis(1800), TimerId(3));
        sim.schedule(SimTime::from_millis(1801), TimerId(4));
        let mut recorder = Recorder::default();
        assert_eq!(sim.run(&mut recorder).unwrap(), SimTime::from_millis(1800));
        assert_eq!(recorder.timers.len(), 1);
        assert_eq!(sim.remaining_events(), 0);
        assert!(matches!(
            sim.run(&mut recorder),
            Err(EngineError::AlreadyRan)
        ));
    }

    #[test]
    fn cbr_sink_counts_every_datagram() {
        let mut sim = Simulator::new(lossless()).unwrap();
        let binding = sim
            .install_flow(&cbr_spec(1, 12345, DataRate::from_kbps(300), 200, 1800))
            .unwrap();
        assert_eq!(binding.socket, None);
        sim.run(&mut Recorder::default()).unwrap();
        let sent = sim.flow_table()[&1].stats.tx_packets;
        // One packet every 27.3 ms from 0.2 s; the last few are still in flight.
        assert!(sent >= 57, "sent {sent}");
        let received = sim.sink_total_rx(binding.sink).unwrap();
        assert_eq!(received % 1024, 0);
        assert!(received >= (sent - 1) * 1024);
    }

    #[test]
    fn queue_overflow_is_reported_to_drop_subscribers() {
        let mut sim = Simulator::new(lossless()).unwrap();
        sim.install_flow(&cbr_spec(1, 12345, DataRate::from_mbps(2), 0, 500))
            .unwrap();
        sim.subscribe_drops();
        let mut recorder = Recorder::default();
        sim.run(&mut recorder).unwrap();
        assert!(!recorder.drops.is_empty());
        assert!(
            recorder
                .drops
                .iter()
                .all(|(_, kind)| *kind == DropKind::QueueOverflow)
        );
        assert!(recorder.drops.windows(2).all(|w| w[0].0 <= w[1].0));
        let stats = &sim.flow_table()[&1].stats;
        assert_eq!(stats.dropped.queue_overflow, recorder.drops.len() as u64);
    }

    #[test]
    fn bulk_transfer_completes_on_a_clean_link() {
        let mut config = lossless();
        config.horizon = SimTime::from_secs(3);
        let mut sim = Simulator::new(config).unwrap();
        let mut spec = bulk_spec(50_000);
        spec.stop = SimTime::from_secs(3);
        spec.sink_stop = SimTime::from_secs(3);
        let binding = sim.install_flow(&spec).unwrap();
        let socket = binding.socket.unwrap();
        let mut recorder = Recorder {
            subscribe_on: Some(socket),
            ..Recorder::default()
        };
        sim.schedule(SimTime::from_micros(10), TimerId(2));
        sim.run(&mut recorder).unwrap();

        assert_eq!(sim.sink_total_rx(binding.sink), Some(50_000));
        assert!(!recorder.cwnd.is_empty());
        assert!(recorder.cwnd.iter().all(|(t, _, _)| *t > SimTime::ZERO));
        let table = sim.flow_table();
        // Data flow first, ACK flow second.
        assert_eq!(table[&1].tuple, binding.tuple);
        assert_eq!(table[&2].tuple, binding.tuple.reversed());
        assert_eq!(table[&1].stats.dropped.total(), 0);
        let report = sim.export_report();
        assert_eq!(report.sockets[0].bytes_acked, 50_000);
    }

    #[test]
    fn rejects_foreign_addresses_and_port_reuse() {
        let mut sim = Simulator::new(lossless()).unwrap();
        let mut spec = cbr_spec(1, 12345, DataRate::from_kbps(300), 200, 1800);
        spec.sink.address = Ipv4Addr::new(10, 1, 1, 9);
        assert!(matches!(
            sim.install_flow(&spec),
            Err(EngineError::UnknownAddress(_))
        ));
        sim.install_flow(&cbr_spec(1, 12345, DataRate::from_kbps(300), 200, 1800))
            .unwrap();
        assert!(matches!(
            sim.install_flow(&cbr_spec(2, 12345, DataRate::from_kbps(300), 200, 1800)),
            Err(EngineError::PortInUse { port: 12345, .. })
        ));
    }

    #[test]
    fn same_seed_gives_the_same_table() {
        let run = || {
            let mut config = SimConfig::default();
            config.link.error_rate = 0.01;
            let mut sim = Simulator::new(config).unwrap();
            sim.install_flow(&bulk_spec(0)).unwrap();
            sim.run(&mut Recorder::default()).unwrap();
            sim.flow_table()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn link_trace_records_device_events() {
        let mut config = lossless();
        config.link_tracing = true;
        let mut sim = Simulator::new(config).unwrap();
        sim.install_flow(&cbr_spec(1, 12345, DataRate::from_kbps(300), 200, 400))
            .unwrap();
        sim.run(&mut Recorder::default()).unwrap();
        let report = sim.export_report();
        let symbols: HashSet<char> = report.link_events.iter().map(|e| e.kind.symbol()).collect();
        assert!(symbols.contains(&'+'));
        assert!(symbols.contains(&'-'));
        assert!(symbols.contains(&'r'));
    }
}
