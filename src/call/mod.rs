//! The `Call` object (spec.md §2, §3): one per in-flight RPC, owning every
//! component the rest of this module implements. Mirrors the teacher's
//! `TCB` — one struct holding state, send/receive windows, congestion
//! state, and RTT bookkeeping, with the protocol logic split across
//! sibling files (`classifier.rs`, `ack.rs`, ...) the way the teacher splits
//! `stream.rs`/`listen.rs`/`ioutil.rs` off from the shared `TCB`.

mod abort;
mod ack;
pub mod classifier;
pub mod congestion;
pub mod jumbo;
pub mod phase;
pub mod rtt;
pub mod rx_window;
pub mod tx_window;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::collab::Collaborators;
use crate::config::Tunables;
use crate::err::{CallError, ProtocolAbort};
use crate::seq::after_eq;
use crate::wire::{AckReason, PacketFlags, WireHeader};

pub use congestion::CongestionState;
pub use phase::State;
pub use rtt::RttRing;
pub use rx_window::{AcceptOutcome, RxWindow};
pub use tx_window::TxBufferEntry;

/// Explicit struct of atomic booleans standing in for `call->flags`
/// (spec.md §9 Design Notes: "Replace the bitmap ... with an explicit
/// struct of atomic booleans, one per concept").
#[derive(Debug, Default)]
pub struct Flags {
    rx_last: AtomicBool,
    tx_last: AtomicBool,
    tx_all_acked: AtomicBool,
    retrans_timeout: AtomicBool,
    is_dead: AtomicBool,
}

macro_rules! flag_accessor {
    ($get:ident, $set:ident, $field:ident) => {
        pub fn $get(&self) -> bool {
            self.$field.load(Ordering::Relaxed)
        }
        pub fn $set(&self, v: bool) {
            self.$field.store(v, Ordering::Relaxed);
        }
    };
}

impl Flags {
    flag_accessor!(rx_last, set_rx_last, rx_last);
    flag_accessor!(tx_last, set_tx_last, tx_last);
    flag_accessor!(tx_all_acked, set_tx_all_acked, tx_all_acked);
    flag_accessor!(retrans_timeout, set_retrans_timeout, retrans_timeout);
    flag_accessor!(is_dead, set_is_dead, is_dead);
}

/// One in-flight RPC (spec.md §3 "Call"). Owns `tx_buffer`, the receive
/// window, the SACK table, and congestion/RTT state exclusively; the Peer
/// and Connection objects referenced through `Collaborators` are shared and
/// mutated under their own locks on the embedder's side.
#[derive(Debug)]
pub struct Call {
    pub(crate) state: State,
    pub(crate) tx_buffer: Vec<TxBufferEntry>,
    pub(crate) tx_top: u32,

    pub(crate) acks_hard_ack: u32,
    pub(crate) acks_lowest_nak: u32,
    pub(crate) acks_first_seq: u32,
    pub(crate) acks_prev_seq: u32,
    pub(crate) acks_highest_serial: u32,
    pub(crate) acks_latest_ts: Option<Instant>,

    pub(crate) rx: RxWindow,
    pub(crate) rx_highest_seq: u32,
    pub(crate) rx_last_seq: Option<u32>,
    pub(crate) nr_jumbo_bad: u32,

    pub(crate) cong: CongestionState,
    pub(crate) rtt: RttRing,
    pub(crate) tx_winsize: u32,
    pub(crate) tx_last_sent: Option<Instant>,

    pub(crate) rx_serial: u32,
    pub(crate) next_rx_timeout: Option<Duration>,

    pub(crate) flags: Flags,
    pub(crate) tunables: Tunables,
    pub(crate) completion: Option<CallError>,
}

impl Call {
    fn new(state: State, tunables: Tunables) -> Self {
        debug_assert!(
            tunables.rx_winsize as usize <= crate::config::SACK_SIZE,
            "rx_winsize ({}) must not exceed SACK_SIZE ({}) or seq % SACK_SIZE stops being injective within the window",
            tunables.rx_winsize,
            crate::config::SACK_SIZE,
        );
        let rtt_ring = RttRing::new(crate::config::RTT_RING_SIZE);
        Call {
            state,
            tx_buffer: Vec::new(),
            tx_top: 0,
            acks_hard_ack: 0,
            acks_lowest_nak: 0,
            acks_first_seq: 0,
            acks_prev_seq: 0,
            acks_highest_serial: 0,
            acks_latest_ts: None,
            rx: RxWindow::new(1, tunables.rx_winsize),
            rx_highest_seq: 0,
            rx_last_seq: None,
            nr_jumbo_bad: 0,
            cong: CongestionState::new(&tunables),
            rtt: rtt_ring,
            tx_winsize: tunables.tx_max_window,
            tx_last_sent: None,
            rx_serial: 0,
            next_rx_timeout: None,
            flags: Flags::default(),
            tunables,
            completion: None,
        }
    }

    pub fn new_client(_call_id: u32, tunables: Tunables) -> Self {
        Call::new(State::ClientSendRequest, tunables)
    }

    pub fn new_server(_call_id: u32, tunables: Tunables) -> Self {
        Call::new(State::ServerRecvRequest, tunables)
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn completion(&self) -> Option<CallError> {
        self.completion
    }

    pub fn window(&self) -> u32 {
        self.rx.window()
    }

    pub fn wtop(&self) -> u32 {
        self.rx.wtop()
    }

    /// Queues one transmit buffer (the real transmit path is out of scope;
    /// tests use this to seed `tx_buffer`/`tx_top` the way a real sender
    /// would before a reply ACK rotates the window).
    pub fn queue_tx(&mut self, seq: u32, last: bool) {
        self.tx_buffer.push(TxBufferEntry { seq, last });
        if after_eq(seq, self.tx_top) {
            self.tx_top = seq;
        }
    }

    /// Open Question decision (spec.md §9): the kernel's
    /// `rxrpc_receive_dup_data` only increments `nr_jumbo_bad` for
    /// duplicates whose carrier subpacket was jumbo-framed (see
    /// DESIGN.md). Plain (non-jumbo) duplicate DATA never counts.
    fn account_duplicate(&mut self, from_jumbo: bool) {
        if from_jumbo {
            self.nr_jumbo_bad += 1;
        }
    }

    fn on_data_packet(
        &mut self,
        header: &WireHeader,
        body: &mut [u8],
        collab: &mut Collaborators<'_>,
    ) -> Result<(), CallError> {
        if header.security_index != 0 {
            if let Err(err) = collab.security.unshare(body, header.security_index) {
                self.fail_from_collaborator(err, collab);
                return Ok(());
            }
        }

        let subpackets = match jumbo::split(header.seq, header.serial, header.flags, body) {
            Ok(s) => s,
            Err(abort) => {
                self.raise_protocol_abort(abort, collab);
                return Ok(());
            }
        };

        for sub in &subpackets {
            if let Err(abort) = self.ingest_data_subpacket(sub, header, collab) {
                self.raise_protocol_abort(abort, collab);
                return Ok(());
            }
        }
        Ok(())
    }

    /// Runs spec.md §4.3 steps 1-7 for one (post-jumbo-split) DATA unit.
    fn ingest_data_subpacket(
        &mut self,
        sub: &jumbo::Subpacket<'_>,
        header: &WireHeader,
        collab: &mut Collaborators<'_>,
    ) -> Result<(), ProtocolAbort> {
        let seq = sub.seq;
        let last = sub.flags.contains(PacketFlags::LAST_PACKET);
        let already_last = self.flags.rx_last();

        if last {
            if already_last {
                if self.rx_last_seq != Some(seq) {
                    return Err(ProtocolAbort::Lsn);
                }
            } else {
                self.flags.set_rx_last(true);
                self.rx_last_seq = Some(seq);
            }
        }
        if already_last && after_eq(seq, self.rx.wtop()) {
            return Err(ProtocolAbort::Lsa);
        }

        if after_eq(seq, self.rx_highest_seq) {
            self.rx_highest_seq = seq;
        }

        // First reply DATA on a client call (spec.md §4.7 `receiving_reply`).
        // Guarded on the pre-reply states so this only fires once per call:
        // once it runs, the phase controller has already moved to
        // `ClientRecvReply` and later DATA packets skip this branch.
        if matches!(self.state, State::ClientSendRequest | State::ClientAwaitReply) {
            self.receiving_reply()?;
        }

        if sub.flags.contains(PacketFlags::JUMBO_PACKET) && self.nr_jumbo_bad > 3 {
            collab.tx.send_ack(AckReason::NoSpace, header.serial, "jumbo-abuse");
            return Ok(());
        }

        let had_oos_before = !self.rx.oos_queue().is_empty();
        let outcome = self.rx.accept(seq);
        log::trace!("seq {seq}: {outcome:?}");
        match outcome {
            AcceptOutcome::Duplicate => {
                collab
                    .tx
                    .send_ack(AckReason::Duplicate, header.serial, "duplicate-in-window");
            }
            AcceptOutcome::ExceedsWindow => {
                collab
                    .tx
                    .send_ack(AckReason::ExceedsWindow, header.serial, "exceeds-window");
            }
            AcceptOutcome::InOrder { .. } => {
                if sub.flags.contains(PacketFlags::REQUEST_ACK) {
                    collab.tx.send_ack(AckReason::Requested, header.serial, "in-order");
                } else if had_oos_before {
                    collab.tx.send_ack(AckReason::Delay, header.serial, "hole-filled");
                } else {
                    collab.tx.propose_delay_ack();
                }
                collab.socket.notify_socket();
            }
            AcceptOutcome::OutOfSequenceNew => {
                collab
                    .tx
                    .send_ack(AckReason::OutOfSequence, header.serial, "out-of-sequence");
            }
            AcceptOutcome::OutOfSequenceDuplicate => {
                self.account_duplicate(sub.from_jumbo);
                collab
                    .tx
                    .send_ack(AckReason::Duplicate, header.serial, "oos-duplicate");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::testkit::FakeCollaborators;
    use crate::wire::{PacketFlags, PacketType};

    fn data_header(seq: u32, serial: u32, flags: PacketFlags) -> WireHeader {
        WireHeader {
            packet_type: PacketType::Data,
            serial,
            seq,
            flags,
            security_index: 0,
            service_id: 1,
        }
    }

    /// Scenario (i): in-order 4-packet request, LAST on seq 4.
    #[test]
    fn scenario_i_in_order_request_with_last() {
        let mut fakes = FakeCollaborators::new();
        let mut call = Call::new_server(1, Tunables::default());
        for seq in 1..=4u32 {
            let flags = if seq == 4 {
                PacketFlags::LAST_PACKET
            } else {
                PacketFlags::empty()
            };
            call.on_data_packet(&data_header(seq, seq, flags), &mut [0xAB], &mut fakes.as_collab())
                .unwrap();
        }
        assert_eq!(call.window(), 5);
        assert_eq!(call.wtop(), 5);
        assert!(call.flags.rx_last());
    }

    /// Scenario (iii): duplicate DATA at window seq, non-jumbo path.
    #[test]
    fn scenario_iii_duplicate_data() {
        let mut fakes = FakeCollaborators::new();
        let mut call = Call::new_server(1, Tunables::default());
        call.on_data_packet(&data_header(2, 1, PacketFlags::empty()), &mut [1], &mut fakes.as_collab())
            .unwrap();
        // window starts at 1, so seq 2 is out-of-sequence (a hole at 1).
        call.on_data_packet(&data_header(2, 2, PacketFlags::empty()), &mut [1], &mut fakes.as_collab())
            .unwrap();
        assert_eq!(call.nr_jumbo_bad, 0);
        assert_eq!(fakes.tx.acks.last().unwrap().reason, AckReason::Duplicate);
    }

    /// Scenario (iv): jumbo cap — after four partially-duplicate jumbo
    /// packets, `nr_jumbo_bad > 3` makes further jumbos elicit NOSPACE.
    #[test]
    fn scenario_iv_jumbo_cap() {
        let mut fakes = FakeCollaborators::new();
        let mut call = Call::new_server(1, Tunables::default());
        call.nr_jumbo_bad = 4;
        let flags = PacketFlags::JUMBO_PACKET;
        let mut buf = vec![0u8; crate::config::JUMBO_SUBPKTLEN];
        buf.extend_from_slice(&[0, 0, 0]); // jumbo_header trailer, no further subpacket
        call.on_data_packet(&data_header(50, 1, flags), &mut buf, &mut fakes.as_collab())
            .unwrap();
        assert_eq!(fakes.tx.acks.last().unwrap().reason, AckReason::NoSpace);
    }

    /// spec.md §4.7 `receiving_reply`: the first reply DATA on a client call
    /// must move the phase controller past `ClientSendRequest`/
    /// `ClientAwaitReply` into `ClientRecvReply`.
    #[test]
    fn first_reply_data_moves_client_to_recv_reply() {
        let mut fakes = FakeCollaborators::new();
        let mut call = Call::new_client(1, Tunables::default());
        call.queue_tx(1, true);
        assert_eq!(call.state(), State::ClientSendRequest);

        call.on_data_packet(
            &data_header(1, 1, PacketFlags::LAST_PACKET),
            &mut [0xCD],
            &mut fakes.as_collab(),
        )
        .unwrap();

        assert_eq!(call.state(), State::ClientRecvReply);
        assert!(call.flags.tx_last());
    }

    /// spec.md §2, §6: a nonzero `securityIndex` must run the security
    /// layer's in-place "unshare" step before the jumbo splitter sees the
    /// packet.
    #[test]
    fn nonzero_security_index_invokes_unshare() {
        let mut fakes = FakeCollaborators::new();
        let mut call = Call::new_server(1, Tunables::default());
        let mut header = data_header(1, 1, PacketFlags::empty());
        header.security_index = 7;
        call.on_data_packet(&header, &mut [0xAB], &mut fakes.as_collab())
            .unwrap();
        assert_eq!(fakes.security.calls, 1);
    }

    /// A zero `securityIndex` must not invoke the security layer at all.
    #[test]
    fn zero_security_index_skips_unshare() {
        let mut fakes = FakeCollaborators::new();
        let mut call = Call::new_server(1, Tunables::default());
        call.on_data_packet(
            &data_header(1, 1, PacketFlags::empty()),
            &mut [0xAB],
            &mut fakes.as_collab(),
        )
        .unwrap();
        assert_eq!(fakes.security.calls, 0);
    }
}
