//! Bit-exact wire formats (spec.md §6). The teacher parses TCP/IP headers
//! with `etherparse`'s zero-copy `*HeaderSlice` types; RxRPC's header shapes
//! are small enough, and specific enough to this protocol, that there is no
//! equivalent off-the-shelf parser in the pack — so this module does the
//! same job by hand, the way the teacher's `ioutil.rs` hand-assembles
//! `TcpHeader`/`Ipv4Header` byte layouts, but for reading instead of
//! writing, and against RxRPC's big-endian fixed layout instead of TCP/IP's.

use crate::err::ProtocolAbort;

/// `rxrpc_header.type` values relevant to the receive engine (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Data,
    Ack,
    AckAll,
    Busy,
    Abort,
    Other(u8),
}

impl From<u8> for PacketType {
    fn from(v: u8) -> Self {
        match v {
            1 => PacketType::Data,
            2 => PacketType::Busy,
            3 => PacketType::Abort,
            4 => PacketType::AckAll,
            5 => PacketType::Ack,
            other => PacketType::Other(other),
        }
    }
}

bitflags::bitflags! {
    /// DATA packet flags (spec.md §6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PacketFlags: u8 {
        const LAST_PACKET = 0x01;
        const REQUEST_ACK = 0x02;
        const JUMBO_PACKET = 0x04;
    }
}

/// Decoded wire header, the read-only view spec.md §6 grants the receive
/// engine over an incoming packet (`{type, serial, seq, flags, securityIndex,
/// serviceId, _rsvd}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireHeader {
    pub packet_type: PacketType,
    pub serial: u32,
    pub seq: u32,
    pub flags: PacketFlags,
    pub security_index: u8,
    pub service_id: u16,
}

pub const WIRE_HEADER_SIZE: usize = 28;

impl WireHeader {
    /// Parses the fixed wire header. Returns `None` on a short buffer; the
    /// dispatch layer is expected to have validated datagram length before
    /// handing a packet to the call engine, so this is not itself a
    /// protocol-abort path (spec.md does not name a code for it).
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < WIRE_HEADER_SIZE {
            return None;
        }
        Some(WireHeader {
            serial: be32(buf, 8),
            seq: be32(buf, 12),
            packet_type: PacketType::from(buf[18]),
            flags: PacketFlags::from_bits_truncate(buf[19]),
            security_index: buf[20],
            service_id: be16(buf, 26),
        })
    }
}

/// The `jumbo_header` trailer following every jumbo subpacket but the last
/// (spec.md §6): `{flags:1, _rsvd:2}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumboHeader {
    pub flags: PacketFlags,
}

impl JumboHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolAbort> {
        if buf.len() < 3 {
            return Err(ProtocolAbort::Vld);
        }
        Ok(JumboHeader {
            flags: PacketFlags::from_bits_truncate(buf[0]),
        })
    }
}

/// ACK reasons (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckReason {
    Requested,
    Duplicate,
    OutOfSequence,
    ExceedsWindow,
    NoSpace,
    Ping,
    PingResponse,
    Delay,
    Other(u8),
}

impl From<u8> for AckReason {
    fn from(v: u8) -> Self {
        match v {
            1 => AckReason::Requested,
            2 => AckReason::Duplicate,
            3 => AckReason::OutOfSequence,
            4 => AckReason::ExceedsWindow,
            5 => AckReason::NoSpace,
            6 => AckReason::Ping,
            7 => AckReason::PingResponse,
            8 => AckReason::Delay,
            other => AckReason::Other(other),
        }
    }
}

impl AckReason {
    pub fn to_u8(self) -> u8 {
        match self {
            AckReason::Requested => 1,
            AckReason::Duplicate => 2,
            AckReason::OutOfSequence => 3,
            AckReason::ExceedsWindow => 4,
            AckReason::NoSpace => 5,
            AckReason::Ping => 6,
            AckReason::PingResponse => 7,
            AckReason::Delay => 8,
            AckReason::Other(v) => v,
        }
    }
}

/// One byte of the soft-ACK array: `1 = ACK`, anything else `= NAK`
/// (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftAck {
    Ack,
    Nak,
}

impl From<u8> for SoftAck {
    fn from(v: u8) -> Self {
        if v == 1 {
            SoftAck::Ack
        } else {
            SoftAck::Nak
        }
    }
}

/// `ackpacket` fixed header (spec.md §6):
/// `{ bufferSpace:2, maxSkew:2, firstPacket:4, previousPacket:4, serial:4,
///    reason:1, nAcks:1 }`, all big-endian, immediately following the wire
/// header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    pub buffer_space: u16,
    pub max_skew: u16,
    pub first_packet: u32,
    pub previous_packet: u32,
    pub ack_serial: u32,
    pub reason: AckReason,
    pub nr_acks: u8,
}

/// `bufferSpace(2) + maxSkew(2) + firstPacket(4) + previousPacket(4) +
/// serial(4) + reason(1) + nAcks(1)`.
pub const ACKPACKET_SIZE: usize = 18;

impl AckPacket {
    /// Parses the fixed ackpacket header at `offset` (normally
    /// `WIRE_HEADER_SIZE`). Aborts "XAK" on a short read (spec.md §4.6).
    pub fn parse(buf: &[u8], offset: usize) -> Result<Self, ProtocolAbort> {
        if buf.len() < offset + ACKPACKET_SIZE {
            return Err(ProtocolAbort::Xak);
        }
        Ok(AckPacket {
            buffer_space: be16(buf, offset),
            max_skew: be16(buf, offset + 2),
            first_packet: be32(buf, offset + 4),
            previous_packet: be32(buf, offset + 8),
            ack_serial: be32(buf, offset + 12),
            reason: AckReason::from(buf[offset + 16]),
            nr_acks: buf[offset + 17],
        })
    }

    /// Soft-ACK byte array immediately following the fixed header, if the
    /// packet is long enough to hold all `nr_acks` bytes. Aborts "XSA"
    /// otherwise (spec.md §4.6).
    pub fn soft_acks<'a>(
        &self,
        buf: &'a [u8],
        offset: usize,
    ) -> Result<&'a [u8], ProtocolAbort> {
        let start = offset + ACKPACKET_SIZE;
        let end = start + self.nr_acks as usize;
        if buf.len() < end {
            return Err(ProtocolAbort::Xsa);
        }
        Ok(&buf[start..end])
    }
}

/// Optional `ackinfo` trailer (spec.md §6):
/// `{ rxMTU:4, maxMTU:4, rwind:4, jumbo_max:4 }`, all big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckInfo {
    pub rx_mtu: u32,
    pub max_mtu: u32,
    pub rwind: u32,
    pub jumbo_max: u32,
}

pub const ACKINFO_SIZE: usize = 16;

impl AckInfo {
    /// Present only if `offset + nr_acks + 3 + sizeof(ackinfo) <= len`
    /// (spec.md §4.6); the 3 is the padding after the soft-ACK array.
    pub fn parse_if_present(buf: &[u8], ack_offset: usize, nr_acks: u8) -> Option<Self> {
        let start = ack_offset + ACKPACKET_SIZE + nr_acks as usize + 3;
        if buf.len() < start + ACKINFO_SIZE {
            return None;
        }
        Some(AckInfo {
            rx_mtu: be32(buf, start),
            max_mtu: be32(buf, start + 4),
            rwind: be32(buf, start + 8),
            jumbo_max: be32(buf, start + 12),
        })
    }
}

fn be16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn be32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_packet_short_read_aborts_xak() {
        let buf = vec![0u8; ACKPACKET_SIZE - 1];
        assert_eq!(AckPacket::parse(&buf, 0), Err(ProtocolAbort::Xak));
    }

    #[test]
    fn ack_packet_parses_fixed_fields() {
        let mut buf = vec![0u8; ACKPACKET_SIZE];
        buf[4..8].copy_from_slice(&7u32.to_be_bytes());
        buf[8..12].copy_from_slice(&3u32.to_be_bytes());
        buf[12..16].copy_from_slice(&99u32.to_be_bytes());
        buf[16] = 6; // reason
        buf[17] = 2; // nr_acks
        let parsed = AckPacket::parse(&buf, 0).unwrap();
        assert_eq!(parsed.first_packet, 7);
        assert_eq!(parsed.previous_packet, 3);
        assert_eq!(parsed.ack_serial, 99);
        assert_eq!(parsed.reason, AckReason::Ping);
        assert_eq!(parsed.nr_acks, 2);
    }

    #[test]
    fn soft_acks_short_read_aborts_xsa() {
        let mut buf = vec![0u8; ACKPACKET_SIZE];
        buf[ACKPACKET_SIZE - 1] = 5;
        let parsed = AckPacket::parse(&buf, 0).unwrap();
        assert_eq!(parsed.soft_acks(&buf, 0), Err(ProtocolAbort::Xsa));
    }

    #[test]
    fn ackinfo_requires_full_trailer() {
        let mut buf = vec![0u8; ACKPACKET_SIZE + 3];
        assert!(AckInfo::parse_if_present(&buf, 0, 0).is_none());
        buf.extend(std::iter::repeat(0u8).take(ACKINFO_SIZE));
        assert!(AckInfo::parse_if_present(&buf, 0, 0).is_some());
    }
}
