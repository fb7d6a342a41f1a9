use rand::Rng;
use std::collections::VecDeque;

use netlab_abstract::{DataRate, ErrorUnit, LinkConfig, SimTime};

use crate::packet::Packet;

/// Receive-side corruption model of a device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateErrorModel {
    pub rate: f64,
    pub unit: ErrorUnit,
}

impl RateErrorModel {
    pub fn new(rate: f64, unit: ErrorUnit) -> Self {
        Self { rate, unit }
    }

    /// Probability that a packet of `bytes` is corrupted.
    pub fn packet_error_probability(&self, bytes: u32) -> f64 {
        match self.unit {
            ErrorUnit::Packet => self.rate,
            ErrorUnit::Byte => 1.0 - (1.0 - self.rate).powi(bytes as i32),
        }
    }

    pub fn is_corrupt<R: Rng>(&self, rng: &mut R, bytes: u32) -> bool {
        if self.rate <= 0.0 {
            return false;
        }
        rng.random::<f64>() < self.packet_error_probability(bytes)
    }
}

/// What happened when a packet was offered to a transmit queue.
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// The transmitter was idle; the packet is on the wire until `tx_done`.
    Transmitting {
        packet: Packet,
        tx_done: SimTime,
        arrival: SimTime,
    },
    Queued,
    /// The queue was full; the packet is handed back.
    Dropped(Packet),
}

/// One direction of the point-to-point link: a DropTail queue feeding a
/// transmitter of fixed rate, followed by a fixed propagation delay.
#[derive(Debug)]
pub struct LinkDirection {
    rate: DataRate,
    delay: SimTime,
    capacity: usize,
    queue: VecDeque<Packet>,
    busy: bool,
    pub max_queue_len: usize,
}

impl LinkDirection {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            rate: config.data_rate,
            delay: config.delay,
            capacity: config.queue_capacity,
            queue: VecDeque::new(),
            busy: false,
            max_queue_len: 0,
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    fn start_transmission(&mut self, now: SimTime, packet: &Packet) -> (SimTime, SimTime) {
        self.busy = true;
        let tx_done = now + self.rate.tx_time(packet.wire_size() as u64);
        (tx_done, tx_done + self.delay)
    }

    /// Offer a packet at `now`. When it starts transmitting immediately the
    /// caller schedules its completion and arrival.
    pub fn enqueue(&mut self, now: SimTime, packet: Packet) -> EnqueueOutcome {
        if !self.busy {
            let (tx_done, arrival) = self.start_transmission(now, &packet);
            return EnqueueOutcome::Transmitting {
                packet,
                tx_done,
                arrival,
            };
        }
        if self.queue.len() >= self.capacity {
            return EnqueueOutcome::Dropped(packet);
        }
        self.queue.push_back(packet);
        self.max_queue_len = self.max_queue_len.max(self.queue.len());
        EnqueueOutcome::Queued
    }

    /// The transmitter finished at `now`; start the next queued packet, if any.
    /// Returns the packet together with its completion and arrival times.
    pub fn transmit_complete(&mut self, now: SimTime) -> Option<(Packet, SimTime, SimTime)> {
        self.busy = false;
        let packet = self.queue.pop_front()?;
        let (tx_done, arrival) = self.start_transmission(now, &packet);
        Some((packet, tx_done, arrival))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use netlab_abstract::{Endpoint, FiveTuple, Protocol};
    use rand::SeedableRng;
    use std::net::Ipv4Addr;

    fn datagram(uid: u64) -> Packet {
        let tuple = FiveTuple {
            source: Endpoint::new(Ipv4Addr::new(10, 1, 1, 1), 49154),
            destination: Endpoint::new(Ipv4Addr::new(10, 1, 1, 2), 12345),
            protocol: Protocol::Udp,
        };
        Packet::datagram(uid, tuple, 1024, SimTime::ZERO)
    }

    fn link(capacity: usize) -> LinkDirection {
        LinkDirection::new(&LinkConfig {
            queue_capacity: capacity,
            ..LinkConfig::default()
        })
    }

    #[test]
    fn idle_link_transmits_immediately() {
        let mut dir = link(2);
        match dir.enqueue(SimTime::ZERO, datagram(1)) {
            EnqueueOutcome::Transmitting {
                packet,
                tx_done,
                arrival,
            } => {
                // 1054 bytes at 1 Mbps, then 10 ms of propagation.
                assert_eq!(packet.uid, 1);
                assert_eq!(tx_done, SimTime::from_nanos(8_432_000));
                assert_eq!(arrival, SimTime::from_nanos(18_432_000));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(dir.is_busy());
    }

    #[test]
    fn drop_tail_rejects_when_full() {
        let mut dir = link(2);
        dir.enqueue(SimTime::ZERO, datagram(1));
        assert!(matches!(dir.enqueue(SimTime::ZERO, datagram(2)), EnqueueOutcome::Queued));
        assert!(matches!(dir.enqueue(SimTime::ZERO, datagram(3)), EnqueueOutcome::Queued));
        match dir.enqueue(SimTime::ZERO, datagram(4)) {
            EnqueueOutcome::Dropped(p) => assert_eq!(p.uid, 4),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(dir.max_queue_len, 2);
    }

    #[test]
    fn queue_drains_in_fifo_order() {
        let mut dir = link(4);
        dir.enqueue(SimTime::ZERO, datagram(1));
        dir.enqueue(SimTime::ZERO, datagram(2));
        dir.enqueue(SimTime::ZERO, datagram(3));
        let t = SimTime::from_nanos(8_432_000);
        let (next, tx_done, _) = dir.transmit_complete(t).unwrap();
        assert_eq!(next.uid, 2);
        assert_eq!(tx_done, SimTime::from_nanos(16_864_000));
        assert_eq!(dir.transmit_complete(tx_done).unwrap().0.uid, 3);
        assert!(dir.transmit_complete(tx_done).is_none());
        assert!(!dir.is_busy());
    }

    #[test]
    fn error_model_extremes() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let never = RateErrorModel::new(0.0, ErrorUnit::Packet);
        let always = RateErrorModel::new(1.0, ErrorUnit::Packet);
        for _ in 0..100 {
            assert!(!never.is_corrupt(&mut rng, 1000));
            assert!(always.is_corrupt(&mut rng, 1000));
        }
        let per_byte = RateErrorModel::new(1e-3, ErrorUnit::Byte);
        let p = per_byte.packet_error_probability(1000);
        assert!(p > 0.6 && p < 0.65);
    }
}
