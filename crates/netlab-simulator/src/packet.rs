use serde::Serialize;

use netlab_abstract::{FiveTuple, Protocol, SimTime};

pub const IPV4_HEADER_BYTES: u32 = 20;
pub const TCP_HEADER_BYTES: u32 = 20;
pub const UDP_HEADER_BYTES: u32 = 8;
/// Point-to-point framing added on the wire.
pub const PPP_HEADER_BYTES: u32 = 2;

/// TCP header flags
pub mod flags {
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct TcpHeader {
    /// Byte offset of the first payload byte.
    pub seq_num: u64,
    /// Next byte the receiver expects.
    pub ack_num: u64,
    pub flags: u8,
    /// Advertised receive window in bytes.
    pub window_size: u32,
}

impl TcpHeader {
    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum Transport {
    Tcp(TcpHeader),
    Udp,
}

#[derive(Debug, Clone, Serialize)]
pub struct Packet {
    /// Engine-wide unique id, used by the classifier to match tx and rx.
    pub uid: u64,
    pub tuple: FiveTuple,
    pub transport: Transport,
    pub payload_len: u32,
    pub created_at: SimTime,
}

impl Packet {
    pub fn data_segment(uid: u64, tuple: FiveTuple, seq: u64, len: u32, now: SimTime) -> Self {
        Self {
            uid,
            tuple,
            transport: Transport::Tcp(TcpHeader {
                seq_num: seq,
                ack_num: 0,
                flags: flags::ACK | flags::PSH,
                window_size: 0,
            }),
            payload_len: len,
            created_at: now,
        }
    }

    /// Create a pure ACK packet
    pub fn ack(uid: u64, tuple: FiveTuple, ack: u64, window: u32, now: SimTime) -> Self {
        Self {
            uid,
            tuple,
            transport: Transport::Tcp(TcpHeader {
                seq_num: 0,
                ack_num: ack,
                flags: flags::ACK,
                window_size: window,
            }),
            payload_len: 0,
            created_at: now,
        }
    }

    pub fn datagram(uid: u64, tuple: FiveTuple, len: u32, now: SimTime) -> Self {
        Self {
            uid,
            tuple,
            transport: Transport::Udp,
            payload_len: len,
            created_at: now,
        }
    }

    /// Size as seen by the IP layer and the classifier.
    pub fn ip_size(&self) -> u32 {
        let transport = match self.tuple.protocol {
            Protocol::Tcp => TCP_HEADER_BYTES,
            Protocol::Udp => UDP_HEADER_BYTES,
        };
        IPV4_HEADER_BYTES + transport + self.payload_len
    }

    /// Size on the point-to-point wire.
    pub fn wire_size(&self) -> u32 {
        self.ip_size() + PPP_HEADER_BYTES
    }

    pub fn describe(&self) -> String {
        match &self.transport {
            Transport::Tcp(h) if self.payload_len > 0 => {
                format!("{} seq={} len={}", self.tuple, h.seq_num, self.payload_len)
            }
            Transport::Tcp(h) => format!("{} ack={} win={}", self.tuple, h.ack_num, h.window_size),
            Transport::Udp => format!("{} len={}", self.tuple, self.payload_len),
        }
    }
}
