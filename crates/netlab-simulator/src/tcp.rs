use std::collections::BTreeMap;

use netlab_abstract::{AimdProfile, SimTime, TcpConfig};
use tracing::debug;

/// A segment the sender wants on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub seq: u64,
    pub len: u32,
    pub retransmission: bool,
}

/// Side effects of one sender callback, applied by the engine afterwards.
#[derive(Debug, Default)]
pub struct TcpActions {
    pub segments: Vec<Segment>,
    /// Re-arm the retransmission timer with this timeout.
    pub arm_rto: Option<SimTime>,
    pub cancel_rto: bool,
    /// (old, new) congestion window in bytes.
    pub cwnd_change: Option<(u32, u32)>,
}

/// RFC 6298 retransmission timeout estimation.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    srtt: Option<f64>,
    rttvar: f64,
    min_rto: SimTime,
    max_rto: SimTime,
    rto: SimTime,
}

impl RttEstimator {
    pub fn new(initial_rto: SimTime, min_rto: SimTime, max_rto: SimTime) -> Self {
        Self {
            srtt: None,
            rttvar: 0.0,
            min_rto,
            max_rto,
            rto: initial_rto,
        }
    }

    pub fn rto(&self) -> SimTime {
        self.rto
    }

    pub fn sample(&mut self, rtt: SimTime) {
        let r = rtt.as_secs_f64();
        let srtt = match self.srtt {
            None => {
                self.rttvar = r / 2.0;
                r
            }
            Some(srtt) => {
                self.rttvar = 0.75 * self.rttvar + 0.25 * (srtt - r).abs();
                0.875 * srtt + 0.125 * r
            }
        };
        self.srtt = Some(srtt);
        let rto = SimTime::from_secs_f64(srtt + (4.0 * self.rttvar).max(1e-3));
        self.rto = rto.max(self.min_rto).min(self.max_rto);
    }

    pub fn back_off(&mut self) {
        self.rto = self.rto.saturating_add(self.rto).min(self.max_rto);
    }
}

/// Greedy sender of a bulk transfer.
///
/// The connection is treated as established when `start` is called. The
/// window is `min(cwnd, peer window)`; loss recovery is NewReno-style fast
/// retransmit plus go-back-N on timeout, with growth and backoff taken from
/// the selected `AimdProfile`.
#[derive(Debug)]
pub struct BulkSender {
    mss: u32,
    profile: AimdProfile,
    dupack_threshold: u32,
    /// Zero means unlimited.
    max_bytes: u64,
    sending: bool,

    snd_una: u64,
    snd_nxt: u64,
    high_tx: u64,
    peer_window: u32,

    cwnd: u32,
    ssthresh: u32,
    ca_credit: f64,
    dupacks: u32,
    recover: Option<u64>,

    rtt: RttEstimator,
    /// (sequence that completes the timed segment, send time)
    timed: Option<(u64, SimTime)>,
    rto_armed: bool,
    pub timeouts: u32,
    pub fast_retransmits: u32,
}

impl BulkSender {
    pub fn new(config: &TcpConfig, max_bytes: u64) -> Self {
        Self {
            mss: config.segment_size,
            profile: config.congestion.profile(),
            dupack_threshold: config.dupack_threshold,
            max_bytes,
            sending: false,
            snd_una: 0,
            snd_nxt: 0,
            high_tx: 0,
            peer_window: config.receive_window,
            cwnd: config.segment_size.saturating_mul(config.initial_cwnd_segments),
            ssthresh: config.initial_ssthresh,
            ca_credit: 0.0,
            dupacks: 0,
            recover: None,
            rtt: RttEstimator::new(config.initial_rto, config.min_rto, config.max_rto),
            timed: None,
            rto_armed: false,
            timeouts: 0,
            fast_retransmits: 0,
        }
    }

    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    pub fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    pub fn bytes_acked(&self) -> u64 {
        self.snd_una
    }

    pub fn bytes_sent(&self) -> u64 {
        self.high_tx
    }

    pub fn in_flight(&self) -> u64 {
        self.snd_nxt - self.snd_una
    }

    fn limit(&self) -> u64 {
        if self.max_bytes == 0 {
            u64::MAX
        } else {
            self.max_bytes
        }
    }

    pub fn is_done(&self) -> bool {
        self.snd_una >= self.limit()
    }

    pub fn start(&mut self, now: SimTime, out: &mut TcpActions) {
        self.sending = true;
        self.fill_window(now, out);
    }

    /// Stop producing new data. Outstanding data is still recovered.
    pub fn stop(&mut self) {
        self.sending = false;
    }

    fn set_cwnd(&mut self, new: u32, out: &mut TcpActions) {
        if new == self.cwnd {
            return;
        }
        let old = match out.cwnd_change {
            Some((old, _)) => old,
            None => self.cwnd,
        };
        self.cwnd = new;
        out.cwnd_change = Some((old, new));
    }

    fn send_segment(&mut self, seq: u64, len: u32, now: SimTime, out: &mut TcpActions) {
        let retransmission = seq < self.high_tx;
        out.segments.push(Segment {
            seq,
            len,
            retransmission,
        });
        let end = seq + len as u64;
        if retransmission {
            // Karn: never time a retransmitted range.
            if matches!(self.timed, Some((timed_end, _)) if timed_end > seq) {
                self.timed = None;
            }
        } else if self.timed.is_none() {
            self.timed = Some((end, now));
        }
        self.high_tx = self.high_tx.max(end);
        if !self.rto_armed {
            self.rto_armed = true;
            out.arm_rto = Some(self.rtt.rto());
        }
    }

    fn fill_window(&mut self, now: SimTime, out: &mut TcpActions) {
        let window = self.cwnd.min(self.peer_window) as u64;
        loop {
            let limit = self.limit();
            // New data only while sending; data below high_tx is always resent.
            if self.snd_nxt >= limit || (!self.sending && self.snd_nxt >= self.high_tx) {
                break;
            }
            let len = (self.mss as u64).min(limit - self.snd_nxt) as u32;
            if self.in_flight() + len as u64 > window {
                break;
            }
            let seq = self.snd_nxt;
            self.send_segment(seq, len, now, out);
            self.snd_nxt += len as u64;
        }
    }

    pub fn on_ack(&mut self, now: SimTime, ack: u64, window: u32, out: &mut TcpActions) {
        self.peer_window = window.max(self.mss);
        if ack > self.snd_una {
            self.on_new_ack(now, ack, out);
        } else if ack == self.snd_una && self.snd_nxt > self.snd_una {
            self.on_duplicate_ack(now, out);
        }
    }

    fn on_new_ack(&mut self, now: SimTime, ack: u64, out: &mut TcpActions) {
        let acked = ack - self.snd_una;
        if let Some((timed_end, sent_at)) = self.timed {
            if ack >= timed_end {
                self.rtt.sample(now.saturating_sub(sent_at));
                self.timed = None;
            }
        }
        self.snd_una = ack;
        // Data buffered out of order at the receiver may move us past snd_nxt.
        self.snd_nxt = self.snd_nxt.max(ack);
        self.dupacks = 0;

        match self.recover {
            Some(recover) if ack >= recover => {
                self.recover = None;
                self.set_cwnd(self.ssthresh, out);
            }
            Some(_) => {
                // Partial ack: the next hole is lost as well.
                let len = self.retransmit_len();
                self.send_segment(self.snd_una, len, now, out);
                let deflated = self.cwnd.saturating_sub(acked as u32).saturating_add(self.mss);
                self.set_cwnd(deflated.max(self.mss), out);
            }
            None => self.grow_window(acked, out),
        }

        if self.snd_una == self.snd_nxt {
            self.rto_armed = false;
            out.cancel_rto = true;
        } else {
            self.rto_armed = true;
            out.arm_rto = Some(self.rtt.rto());
        }
        self.fill_window(now, out);
    }

    fn grow_window(&mut self, acked: u64, out: &mut TcpActions) {
        let mss = self.mss as f64;
        if self.cwnd < self.ssthresh {
            let grown = self.cwnd.saturating_add(acked.min(self.mss as u64) as u32);
            self.set_cwnd(grown, out);
            return;
        }
        self.ca_credit += self.profile.increase_segments * mss * mss / self.cwnd.max(1) as f64;
        if self.ca_credit >= 1.0 {
            let step = self.ca_credit.floor();
            self.ca_credit -= step;
            self.set_cwnd(self.cwnd.saturating_add(step as u32), out);
        }
    }

    fn retransmit_len(&self) -> u32 {
        (self.mss as u64).min(self.high_tx - self.snd_una).max(1) as u32
    }

    fn reduced_ssthresh(&self) -> u32 {
        let flight = self.in_flight() as f64 * self.profile.decrease_factor;
        (flight as u32).max(2 * self.mss)
    }

    fn on_duplicate_ack(&mut self, now: SimTime, out: &mut TcpActions) {
        self.dupacks += 1;
        if self.recover.is_some() {
            // Window inflation while the hole is being repaired.
            self.set_cwnd(self.cwnd.saturating_add(self.mss), out);
            self.fill_window(now, out);
            return;
        }
        if self.dupacks == self.dupack_threshold {
            self.fast_retransmits += 1;
            self.ssthresh = self.reduced_ssthresh();
            self.recover = Some(self.snd_nxt);
            debug!(
                "fast retransmit at seq {} (ssthresh={})",
                self.snd_una, self.ssthresh
            );
            let len = self.retransmit_len();
            self.send_segment(self.snd_una, len, now, out);
            self.set_cwnd(self.ssthresh + self.dupack_threshold * self.mss, out);
        }
    }

    pub fn on_timeout(&mut self, now: SimTime, out: &mut TcpActions) {
        self.rto_armed = false;
        if self.snd_una == self.snd_nxt {
            return;
        }
        self.timeouts += 1;
        self.ssthresh = self.reduced_ssthresh();
        self.set_cwnd(self.mss, out);
        self.recover = None;
        self.dupacks = 0;
        self.ca_credit = 0.0;
        self.timed = None;
        self.rtt.back_off();
        debug!(
            "retransmission timeout at seq {} (next rto {})",
            self.snd_una,
            self.rtt.rto()
        );
        self.snd_nxt = self.snd_una;
        self.fill_window(now, out);
    }
}

/// Cumulative-ACK receiver with out-of-order buffering.
#[derive(Debug, Default)]
pub struct TcpReceiver {
    rcv_nxt: u64,
    out_of_order: BTreeMap<u64, u32>,
}

impl TcpReceiver {
    pub fn rcv_nxt(&self) -> u64 {
        self.rcv_nxt
    }

    /// Accept a segment; returns the number of bytes newly delivered in order.
    pub fn on_segment(&mut self, seq: u64, len: u32) -> u64 {
        let before = self.rcv_nxt;
        let end = seq + len as u64;
        if end <= self.rcv_nxt {
            return 0;
        }
        if seq > self.rcv_nxt {
            let slot = self.out_of_order.entry(seq).or_insert(0);
            *slot = (*slot).max(len);
            return 0;
        }
        self.rcv_nxt = end;
        while let Some((&start, &seg_len)) = self.out_of_order.first_key_value() {
            if start > self.rcv_nxt {
                break;
            }
            self.out_of_order.remove(&start);
            self.rcv_nxt = self.rcv_nxt.max(start + seg_len as u64);
        }
        self.rcv_nxt - before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlab_abstract::CongestionAlgorithm;

    fn config() -> TcpConfig {
        TcpConfig {
            congestion: CongestionAlgorithm::TcpNewReno,
            segment_size: 100,
            receive_window: 100_000,
            initial_cwnd_segments: 1,
            initial_ssthresh: 400,
            ..TcpConfig::default()
        }
    }

    fn t(ms: u64) -> SimTime {
        SimTime::from_millis(ms)
    }

    #[test]
    fn starts_with_one_segment_and_slow_starts() {
        let mut sender = BulkSender::new(&config(), 0);
        let mut out = TcpActions::default();
        sender.start(t(0), &mut out);
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.arm_rto, Some(SimTime::from_secs(1)));

        let mut out = TcpActions::default();
        sender.on_ack(t(20), 100, 100_000, &mut out);
        assert_eq!(out.cwnd_change, Some((100, 200)));
        assert_eq!(out.segments.len(), 2);
        assert_eq!(out.segments[0].seq, 100);
        assert!(!out.segments[0].retransmission);
    }

    #[test]
    fn congestion_avoidance_adds_about_one_segment_per_window() {
        let mut sender = BulkSender::new(&config(), 0);
        let mut out = TcpActions::default();
        sender.start(t(0), &mut out);
        let mut ack = 100;
        let mut now = 20;
        // Slow start up to ssthresh.
        while sender.cwnd() < sender.ssthresh() {
            let mut out = TcpActions::default();
            sender.on_ack(t(now), ack, 100_000, &mut out);
            ack += 100;
            now += 1;
        }
        let start = sender.cwnd();
        for _ in 0..(start / 100) {
            let mut out = TcpActions::default();
            sender.on_ack(t(now), ack, 100_000, &mut out);
            ack += 100;
            now += 1;
        }
        let grown = sender.cwnd() - start;
        assert!((90..=110).contains(&grown), "grew by {grown}");
    }

    #[test]
    fn three_duplicate_acks_trigger_fast_retransmit() {
        let mut cfg = config();
        cfg.initial_cwnd_segments = 8;
        let mut sender = BulkSender::new(&cfg, 0);
        let mut out = TcpActions::default();
        sender.start(t(0), &mut out);
        assert_eq!(out.segments.len(), 8);

        let mut out = TcpActions::default();
        sender.on_ack(t(20), 100, 100_000, &mut out);
        for _ in 0..2 {
            let mut out = TcpActions::default();
            sender.on_ack(t(21), 100, 100_000, &mut out);
            assert!(out.segments.is_empty());
        }
        let mut out = TcpActions::default();
        sender.on_ack(t(22), 100, 100_000, &mut out);
        assert_eq!(sender.fast_retransmits, 1);
        assert_eq!(out.segments[0].seq, 100);
        assert!(out.segments[0].retransmission);
        // Eight segments were in flight, so ssthresh halves to 400.
        assert_eq!(sender.ssthresh(), 400);
        assert_eq!(sender.cwnd(), 700);
    }

    #[test]
    fn timeout_collapses_the_window_and_goes_back() {
        let mut cfg = config();
        cfg.initial_cwnd_segments = 4;
        let mut sender = BulkSender::new(&cfg, 0);
        let mut out = TcpActions::default();
        sender.start(t(0), &mut out);
        let mut out = TcpActions::default();
        sender.on_timeout(t(1000), &mut out);
        assert_eq!(sender.timeouts, 1);
        assert_eq!(sender.cwnd(), 100);
        assert_eq!(out.cwnd_change, Some((400, 100)));
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.segments[0].seq, 0);
        assert!(out.segments[0].retransmission);
        assert_eq!(out.arm_rto, Some(SimTime::from_secs(2)));
    }

    #[test]
    fn max_bytes_caps_the_transfer() {
        let mut cfg = config();
        cfg.initial_cwnd_segments = 10;
        let mut sender = BulkSender::new(&cfg, 250);
        let mut out = TcpActions::default();
        sender.start(t(0), &mut out);
        let lens: Vec<u32> = out.segments.iter().map(|s| s.len).collect();
        assert_eq!(lens, vec![100, 100, 50]);
        let mut out = TcpActions::default();
        sender.on_ack(t(20), 250, 100_000, &mut out);
        assert!(sender.is_done());
        assert!(out.cancel_rto);
        assert!(out.segments.is_empty());
    }

    #[test]
    fn stopped_sender_sends_no_new_data() {
        let mut sender = BulkSender::new(&config(), 0);
        let mut out = TcpActions::default();
        sender.start(t(0), &mut out);
        sender.stop();
        let mut out = TcpActions::default();
        sender.on_ack(t(20), 100, 100_000, &mut out);
        assert!(out.segments.is_empty());
    }

    #[test]
    fn receiver_reassembles_out_of_order_data() {
        let mut rx = TcpReceiver::default();
        assert_eq!(rx.on_segment(0, 100), 100);
        assert_eq!(rx.on_segment(200, 100), 0);
        assert_eq!(rx.on_segment(300, 100), 0);
        assert_eq!(rx.rcv_nxt(), 100);
        assert_eq!(rx.on_segment(100, 100), 300);
        assert_eq!(rx.rcv_nxt(), 400);
        // Duplicate of delivered data.
        assert_eq!(rx.on_segment(0, 100), 0);
    }

    #[test]
    fn rto_follows_rfc6298() {
        let mut est = RttEstimator::new(
            SimTime::from_secs(1),
            SimTime::from_millis(200),
            SimTime::from_secs(60),
        );
        est.sample(SimTime::from_millis(100));
        // srtt = 100ms, rttvar = 50ms -> rto = 300ms
        assert_eq!(est.rto(), SimTime::from_millis(300));
        est.back_off();
        assert_eq!(est.rto(), SimTime::from_millis(600));
    }
}
