//! Packet classifier (spec.md §4.1): routes an incoming packet to DATA,
//! ACK, ACKALL, BUSY, or ABORT handling, and refreshes serial/idle-timeout
//! bookkeeping before dispatch.

use std::time::Instant;

use crate::collab::Collaborators;
use crate::err::{CallError, ProtocolAbort};
use crate::seq::after;
use crate::wire::{PacketType, WireHeader};

use super::phase::State;
use super::Call;

impl Call {
    /// Entry point for every inbound packet on this call (spec.md §4.1,
    /// §2 "classifier"). `now` drives the idle-timer refresh and is threaded
    /// through to the congestion controller and RTT tracker. `body` is
    /// mutable so the DATA/ACK handlers can run the security layer's
    /// in-place "unshare" step (spec.md §2, §6) before parsing it further.
    pub fn on_packet(
        &mut self,
        header: &WireHeader,
        body: &mut [u8],
        now: Instant,
        collab: &mut Collaborators<'_>,
    ) -> Result<(), CallError> {
        if self.state == State::Complete {
            return Ok(());
        }

        if after(header.serial, self.rx_serial) {
            self.rx_serial = header.serial;
        }
        if let Some(timeout) = self.next_rx_timeout {
            collab
                .timers
                .reduce_call_timer(now + timeout, now, "expect_rx_by");
        }

        log::trace!("dispatching {:?} seq={} serial={}", header.packet_type, header.seq, header.serial);

        match header.packet_type {
            PacketType::Data => self.on_data_packet(header, body, collab),
            PacketType::Ack => self.on_ack_packet(header, body, now, collab),
            PacketType::AckAll => {
                let tx_top = self.tx_top;
                let outcome = super::tx_window::rotate_tx_window(self, tx_top);
                if outcome.tx_last {
                    if let Err(abort) = self.end_tx_phase(false, ProtocolAbort::Etd) {
                        self.raise_protocol_abort(abort, collab);
                    }
                }
                Ok(())
            }
            PacketType::Busy => Ok(()),
            PacketType::Abort => {
                let code = if body.len() >= 4 {
                    Some(u32::from_be_bytes([body[0], body[1], body[2], body[3]]))
                } else {
                    None
                };
                self.on_remote_abort(code);
                Ok(())
            }
            PacketType::Other(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::testkit::FakeCollaborators;
    use crate::config::Tunables;
    use crate::wire::{PacketFlags, PacketType};

    fn header(packet_type: PacketType, seq: u32, serial: u32) -> WireHeader {
        WireHeader {
            packet_type,
            serial,
            seq,
            flags: PacketFlags::empty(),
            security_index: 0,
            service_id: 7,
        }
    }

    #[test]
    fn busy_packet_is_ignored() {
        let mut fakes = FakeCollaborators::new();
        let mut call = Call::new_server(1, Tunables::default());
        let result = call.on_packet(
            &header(PacketType::Busy, 0, 1),
            &mut [],
            Instant::now(),
            &mut fakes.as_collab(),
        );
        assert!(result.is_ok());
        assert_eq!(call.state, State::ServerRecvRequest);
    }

    #[test]
    fn abort_packet_completes_call_with_peer_code() {
        let mut fakes = FakeCollaborators::new();
        let mut call = Call::new_server(1, Tunables::default());
        let mut body = 77u32.to_be_bytes();
        call.on_packet(
            &header(PacketType::Abort, 0, 1),
            &mut body,
            Instant::now(),
            &mut fakes.as_collab(),
        )
        .unwrap();
        assert_eq!(call.state, State::Complete);
        assert_eq!(call.completion, Some(CallError::RemoteAbort { code: 77 }));
    }

    #[test]
    fn post_completion_packets_are_dropped_silently() {
        let mut fakes = FakeCollaborators::new();
        let mut call = Call::new_server(1, Tunables::default());
        call.complete(CallError::NetReset);
        call.on_packet(
            &header(PacketType::Abort, 0, 1),
            &mut [],
            Instant::now(),
            &mut fakes.as_collab(),
        )
        .unwrap();
        assert_eq!(call.completion, Some(CallError::NetReset));
    }

    #[test]
    fn newer_serial_updates_rx_serial() {
        let mut fakes = FakeCollaborators::new();
        let mut call = Call::new_server(1, Tunables::default());
        call.rx_serial = 5;
        call.on_packet(
            &header(PacketType::Busy, 0, 9),
            &mut [],
            Instant::now(),
            &mut fakes.as_collab(),
        )
        .unwrap();
        assert_eq!(call.rx_serial, 9);
    }
}
