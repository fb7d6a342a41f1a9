use netlab_abstract::{DataRate, SimTime};

/// Constant-bit-rate source: one `packet_size` datagram every
/// `packet_size * 8 / rate`, the first one a full interval after start.
#[derive(Debug, Clone)]
pub struct CbrSource {
    pub packet_size: u32,
    interval: SimTime,
    stop: SimTime,
    pub packets_sent: u64,
}

impl CbrSource {
    pub fn new(packet_size: u32, rate: DataRate, stop: SimTime) -> Self {
        Self {
            packet_size,
            interval: rate.tx_time(packet_size as u64),
            stop,
            packets_sent: 0,
        }
    }

    pub fn interval(&self) -> SimTime {
        self.interval
    }

    /// Time of the first send for an application started at `start`.
    pub fn first_send(&self, start: SimTime) -> Option<SimTime> {
        self.next_after(start)
    }

    /// Record a send at `now` and return when the next one is due, if before stop.
    pub fn on_send(&mut self, now: SimTime) -> Option<SimTime> {
        self.packets_sent += 1;
        self.next_after(now)
    }

    fn next_after(&self, t: SimTime) -> Option<SimTime> {
        let next = t.saturating_add(self.interval);
        (next < self.stop).then_some(next)
    }
}
