//! Jumbo splitter (spec.md §4.2): expands a jumbo-carrying DATA packet into
//! a sequence of per-subpacket DATA units.

use crate::config::{JUMBO_HEADER_SIZE, JUMBO_SUBPKTLEN};
use crate::err::ProtocolAbort;
use crate::wire::{JumboHeader, PacketFlags};

/// One logical DATA unit extracted from a (possibly jumbo) packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subpacket<'a> {
    pub seq: u32,
    pub serial: u32,
    pub flags: PacketFlags,
    pub payload: &'a [u8],
    /// `true` for every subpacket but the trailing remainder — needed by
    /// the duplicate-accounting Open Question (spec.md §9, see
    /// `super::account_duplicate`).
    pub from_jumbo: bool,
}

/// Splits `buf` into subpackets (spec.md §4.2). `seq`/`serial`/`flags` are
/// the outer DATA packet's header fields. Returns one entry even when the
/// JUMBO flag is clear (a single, non-jumbo subpacket).
pub fn split<'a>(
    seq: u32,
    serial: u32,
    flags: PacketFlags,
    buf: &'a [u8],
) -> Result<Vec<Subpacket<'a>>, ProtocolAbort> {
    let mut out = Vec::new();
    let mut cur_seq = seq;
    let mut cur_serial = serial;
    let mut cur_flags = flags;
    let mut rest = buf;

    while cur_flags.contains(PacketFlags::JUMBO_PACKET) {
        if cur_flags.contains(PacketFlags::LAST_PACKET) {
            return Err(ProtocolAbort::Vld);
        }
        if rest.len() < JUMBO_SUBPKTLEN + JUMBO_HEADER_SIZE {
            return Err(ProtocolAbort::Vld);
        }
        let (payload, trailer_and_rest) = rest.split_at(JUMBO_SUBPKTLEN);
        let trailer = JumboHeader::parse(trailer_and_rest)?;

        out.push(Subpacket {
            seq: cur_seq,
            serial: cur_serial,
            flags: cur_flags,
            payload,
            from_jumbo: true,
        });

        rest = &trailer_and_rest[JUMBO_HEADER_SIZE..];
        cur_seq = cur_seq.wrapping_add(1);
        cur_serial = cur_serial.wrapping_add(1);
        cur_flags = trailer.flags;
    }

    out.push(Subpacket {
        seq: cur_seq,
        serial: cur_serial,
        flags: cur_flags,
        payload: rest,
        from_jumbo: false,
    });

    Ok(out)
}
