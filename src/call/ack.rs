//! ACK processing (spec.md §4.6) — the densest component: regression
//! filtering, optional ackinfo trailer, validity checks, soft-ACK decode,
//! NAT-reset heuristics, and the lost-reply ping, finishing with a call into
//! the congestion controller.

use std::time::Instant;

use crate::collab::Collaborators;
use crate::config::Tunables;
use crate::err::{CallError, ProtocolAbort};
use crate::seq::{after, after_eq, before};
use crate::wire::{AckInfo, AckPacket, AckReason, SoftAck, WireHeader};

use super::congestion::{self, AckSummary};
use super::phase::State;
use super::rtt::RttCompletion;
use super::tx_window;
use super::Call;

/// Summary of decoding the soft-ACK byte array (spec.md §4.6 "Soft ACKs").
#[derive(Debug, Clone, Copy, Default)]
struct SoftAckSummary {
    nr_new_acks: u32,
    saw_nacks: bool,
    new_low_nack: bool,
}

fn decode_soft_acks(bytes: &[u8], acks_lowest_nak: &mut u32, hard_ack: u32) -> SoftAckSummary {
    let mut summary = SoftAckSummary::default();
    for (i, &b) in bytes.iter().enumerate() {
        let seq = hard_ack.wrapping_add(1).wrapping_add(i as u32);
        match SoftAck::from(b) {
            SoftAck::Ack => summary.nr_new_acks += 1,
            SoftAck::Nak => {
                summary.saw_nacks = true;
                if after(seq, *acks_lowest_nak) {
                    *acks_lowest_nak = seq;
                    summary.new_low_nack = true;
                }
            }
        }
    }
    summary
}

impl Call {
    /// `is_ack_valid` (spec.md §4.6 "Regression filter").
    fn is_ack_valid(&self, first_pkt: u32, prev_pkt: u32) -> bool {
        if after(first_pkt, self.acks_first_seq) {
            return true;
        }
        if before(first_pkt, self.acks_first_seq) {
            return false;
        }
        if after_eq(prev_pkt, self.acks_prev_seq) {
            return true;
        }
        if after_eq(prev_pkt, self.acks_first_seq.wrapping_add(self.tx_winsize)) {
            return false;
        }
        true
    }

    pub(super) fn on_ack_packet(
        &mut self,
        header: &WireHeader,
        body: &mut [u8],
        now: Instant,
        collab: &mut Collaborators<'_>,
    ) -> Result<(), CallError> {
        if header.security_index != 0 {
            if let Err(err) = collab.security.unshare(body, header.security_index) {
                self.fail_from_collaborator(err, collab);
                return Ok(());
            }
        }

        let offset = crate::wire::WIRE_HEADER_SIZE;
        let ack = match AckPacket::parse(body, offset) {
            Ok(ack) => ack,
            Err(abort) => {
                self.raise_protocol_abort(abort, collab);
                return Ok(());
            }
        };

        let first_soft_ack = ack.first_packet;
        let prev_pkt = ack.previous_packet;
        let hard_ack = first_soft_ack.wrapping_sub(1);
        let acked_serial = ack.ack_serial;

        // RTT completion (spec.md §4.6 "RTT completion").
        match ack.reason {
            AckReason::PingResponse | AckReason::Requested => {
                match self.rtt.complete(acked_serial, now) {
                    RttCompletion::Sample(d) => collab.peer.add_rtt_sample(d),
                    RttCompletion::Lost => {}
                }
            }
            _ if acked_serial != 0 => {
                // Cancellation: retire any matching probe without
                // recording a sample.
                let _ = self.rtt.complete(acked_serial, now);
            }
            _ => {}
        }

        // Auto-responses (spec.md §4.6 "Auto-responses").
        match ack.reason {
            AckReason::Ping => collab.tx.send_ack(AckReason::PingResponse, acked_serial, "ping"),
            _ if header.flags.contains(crate::wire::PacketFlags::REQUEST_ACK) => {
                collab.tx.send_ack(AckReason::Requested, header.serial, "requested")
            }
            _ => {}
        }

        // NAT-reset heuristics (client calls only, spec.md §4.6).
        if self.state.is_client() {
            let nat_reset = match ack.reason {
                AckReason::ExceedsWindow => first_soft_ack == 1 && prev_pkt == 0,
                AckReason::OutOfSequence => {
                    first_soft_ack == 1 && prev_pkt == 0 && self.acks_hard_ack == 0
                }
                _ => false,
            };
            if nat_reset {
                log::warn!("NAT-reset heuristic triggered (reason={:?})", ack.reason);
                self.complete(CallError::NetReset);
                return Ok(());
            }
        }

        if !self.is_ack_valid(first_soft_ack, prev_pkt) {
            log::trace!(
                "ack regressed, dropping: first={first_soft_ack} prev={prev_pkt} (have first={}, prev={})",
                self.acks_first_seq,
                self.acks_prev_seq
            );
            return Ok(());
        }

        // Optional ackinfo trailer (spec.md §4.6 "Optional ackinfo").
        if let Some(info) = AckInfo::parse_if_present(body, offset, ack.nr_acks) {
            self.apply_ackinfo(info, collab);
        }

        // State commits (spec.md §4.6 "State commits").
        self.acks_latest_ts = Some(now);
        self.acks_first_seq = first_soft_ack;
        self.acks_prev_seq = prev_pkt;
        if !matches!(ack.reason, AckReason::Ping) && after(header.serial, self.acks_highest_serial)
        {
            self.acks_highest_serial = header.serial;
        }

        // Validity checks (spec.md §4.6 "Validity checks").
        if first_soft_ack == 0 {
            self.raise_protocol_abort(ProtocolAbort::Ak0, collab);
            return Ok(());
        }
        if before(hard_ack, self.acks_hard_ack) || after(hard_ack, self.tx_top) {
            self.raise_protocol_abort(ProtocolAbort::Akw, collab);
            return Ok(());
        }
        if u32::from(ack.nr_acks) > self.tx_top.wrapping_sub(hard_ack) {
            self.raise_protocol_abort(ProtocolAbort::Akn, collab);
            return Ok(());
        }

        // State gate (spec.md §4.6 "State gate").
        if !self.state.accepts_ack() {
            return Ok(());
        }

        let mut rot_new_acks = 0;
        if after(hard_ack, self.acks_hard_ack) {
            let outcome = tx_window::rotate_tx_window(self, hard_ack);
            rot_new_acks = outcome.nr_rot_new_acks;
            if outcome.tx_last {
                if let Err(abort) = self.end_tx_phase(false, ProtocolAbort::Etd) {
                    self.raise_protocol_abort(abort, collab);
                }
                return Ok(());
            }
        }

        // Soft ACKs (spec.md §4.6 "Soft ACKs").
        let mut soft = SoftAckSummary::default();
        if ack.nr_acks > 0 {
            let bytes = match ack.soft_acks(body, offset) {
                Ok(bytes) => bytes,
                Err(abort) => {
                    self.raise_protocol_abort(abort, collab);
                    return Ok(());
                }
            };
            soft = decode_soft_acks(bytes, &mut self.acks_lowest_nak, hard_ack);
        }

        // Lost-reply ping (spec.md §4.6 "Lost-reply ping").
        if self.state.is_client()
            && self.flags.tx_last()
            && u32::from(ack.nr_acks) == self.tx_top.wrapping_sub(hard_ack)
        {
            collab.tx.propose_ping();
        }

        let summary = AckSummary {
            nr_new_acks: soft.nr_new_acks,
            nr_rot_new_acks: rot_new_acks,
            saw_nacks: soft.saw_nacks,
            new_low_nack: soft.new_low_nack,
            nr_acks_field: u32::from(ack.nr_acks),
        };
        let retrans_timeout = self.flags.retrans_timeout();
        if retrans_timeout {
            self.flags.set_retrans_timeout(false);
        }
        let srtt = std::time::Duration::from_micros(collab.peer.srtt_us());
        let outcome = congestion::on_ack(
            &mut self.cong,
            &self.tunables,
            self.tx_top,
            self.acks_hard_ack,
            summary,
            retrans_timeout,
            srtt,
            self.tx_last_sent,
            now,
        );
        if outcome.resend {
            collab.tx.resend();
        }
        if outcome.send_extra > 0 {
            collab.tx.send_extra_data(outcome.send_extra);
        }

        Ok(())
    }

    fn apply_ackinfo(&mut self, info: AckInfo, collab: &mut Collaborators<'_>) {
        let rwind = info.rwind.min(self.tunables.tx_max_window);
        if rwind > self.tx_winsize {
            collab.socket.notify_socket();
        }
        self.tx_winsize = rwind;
        if rwind < self.cong.ssthresh {
            self.cong.ssthresh = rwind;
        }
        let maxdata = info.rx_mtu.min(info.max_mtu);
        collab.peer.set_maxdata(maxdata);
        collab.peer.set_mtu(maxdata + collab.peer.hdrsize());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::testkit::FakeCollaborators;
    use crate::wire::{PacketFlags, PacketType};

    fn ack_header(serial: u32) -> WireHeader {
        WireHeader {
            packet_type: PacketType::Ack,
            serial,
            seq: 0,
            flags: PacketFlags::empty(),
            security_index: 0,
            service_id: 1,
        }
    }

    fn ack_body(
        first_packet: u32,
        previous_packet: u32,
        ack_serial: u32,
        reason: AckReason,
        nr_acks: u8,
        soft_acks: &[u8],
    ) -> Vec<u8> {
        let mut buf = vec![0u8; crate::wire::WIRE_HEADER_SIZE];
        buf.extend_from_slice(&0u16.to_be_bytes()); // bufferSpace
        buf.extend_from_slice(&0u16.to_be_bytes()); // maxSkew
        buf.extend_from_slice(&first_packet.to_be_bytes());
        buf.extend_from_slice(&previous_packet.to_be_bytes());
        buf.extend_from_slice(&ack_serial.to_be_bytes());
        buf.push(reason.to_u8());
        buf.push(nr_acks);
        buf.extend_from_slice(soft_acks);
        buf
    }

    #[test]
    fn nat_reset_scenario_vi() {
        let mut fakes = FakeCollaborators::new();
        let mut call = Call::new_client(1, Tunables::default());
        call.acks_hard_ack = 0;
        let mut body = ack_body(1, 0, 5, AckReason::OutOfSequence, 0, &[]);
        call.on_ack_packet(&ack_header(5), &mut body, Instant::now(), &mut fakes.as_collab())
            .unwrap();
        assert_eq!(call.state, State::Complete);
        assert_eq!(call.completion, Some(CallError::NetReset));
    }

    #[test]
    fn short_ack_aborts_xak() {
        let mut fakes = FakeCollaborators::new();
        let mut call = Call::new_client(1, Tunables::default());
        let mut body = vec![0u8; crate::wire::WIRE_HEADER_SIZE + 4];
        call.on_ack_packet(&ack_header(1), &mut body, Instant::now(), &mut fakes.as_collab())
            .unwrap();
        assert_eq!(call.state, State::Complete);
        assert_eq!(fakes.tx.aborts[0].why, "XAK");
    }

    #[test]
    fn zero_first_soft_ack_aborts_ak0() {
        let mut fakes = FakeCollaborators::new();
        let mut call = Call::new_client(1, Tunables::default());
        call.acks_first_seq = 0;
        call.acks_prev_seq = 0;
        call.tx_top = 10;
        let mut body = ack_body(0, 0, 1, AckReason::Requested, 0, &[]);
        call.on_ack_packet(&ack_header(1), &mut body, Instant::now(), &mut fakes.as_collab())
            .unwrap();
        assert_eq!(fakes.tx.aborts[0].why, "AK0");
    }

    #[test]
    fn regressed_first_packet_is_dropped_silently() {
        let mut fakes = FakeCollaborators::new();
        let mut call = Call::new_client(1, Tunables::default());
        call.acks_first_seq = 10;
        call.acks_prev_seq = 5;
        call.tx_top = 20;
        let mut body = ack_body(3, 0, 1, AckReason::Requested, 0, &[]);
        call.on_ack_packet(&ack_header(1), &mut body, Instant::now(), &mut fakes.as_collab())
            .unwrap();
        assert_eq!(call.state, State::ClientSendRequest);
        assert_eq!(call.acks_first_seq, 10);
    }

    /// spec.md §2, §6: ACK bodies go through the security layer's "unshare"
    /// step too, before the fixed `ackpacket` header is parsed.
    #[test]
    fn nonzero_security_index_invokes_unshare_before_parsing() {
        let mut fakes = FakeCollaborators::new();
        let mut call = Call::new_client(1, Tunables::default());
        let mut header = ack_header(1);
        header.security_index = 3;
        let mut body = ack_body(1, 0, 1, AckReason::Requested, 0, &[]);
        call.on_ack_packet(&header, &mut body, Instant::now(), &mut fakes.as_collab())
            .unwrap();
        assert_eq!(fakes.security.calls, 1);
    }
}
