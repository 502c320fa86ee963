//! Phase controller (spec.md §4.7): the per-call state machine, modelled as
//! an explicit tagged enum per Design Notes §9 ("model it explicitly with a
//! variant type so illegal transitions are statically detectable"), the way
//! the teacher's own `State` enum (`Listen`, `SynRcvd`, ... `TimeWait`)
//! stands in for RFC 9293's state diagram.

use crate::err::ProtocolAbort;

use super::Call;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    ClientSendRequest,
    ClientAwaitReply,
    ClientRecvReply,
    ServerRecvRequest,
    ServerSendReply,
    ServerAwaitAck,
    /// Terminal. A Call transitions here exactly once (spec.md §3, §5).
    Complete,
}

impl State {
    /// States in which ACK processing continues past the state gate
    /// (spec.md §4.6 "State gate").
    pub fn accepts_ack(self) -> bool {
        matches!(
            self,
            State::ClientSendRequest
                | State::ClientAwaitReply
                | State::ServerSendReply
                | State::ServerAwaitAck
        )
    }

    pub fn is_client(self) -> bool {
        matches!(
            self,
            State::ClientSendRequest | State::ClientAwaitReply | State::ClientRecvReply
        )
    }
}

impl Call {
    /// `end_tx_phase(reply_begun, abort_why)` (spec.md §4.7). Requires
    /// `flags.tx_last` to already be set by the caller (the transmit-window
    /// rotator sets it when the walk reaches a LAST-flagged buffer).
    ///
    /// Returns `Ok(())` on a legal transition, or the protocol abort to
    /// raise at `tx_top` on an illegal one — callers are expected to feed
    /// this into `abort::raise_protocol_abort`.
    pub fn end_tx_phase(
        &mut self,
        reply_begun: bool,
        abort_why: ProtocolAbort,
    ) -> Result<(), ProtocolAbort> {
        debug_assert!(self.flags.tx_last(), "end_tx_phase requires TX_LAST set");
        let from = self.state;
        match self.state {
            State::ClientSendRequest | State::ClientAwaitReply => {
                self.state = if reply_begun {
                    State::ClientRecvReply
                } else {
                    State::ClientAwaitReply
                };
                log::trace!("end_tx_phase: {from:?} -> {:?}", self.state);
                Ok(())
            }
            State::ServerAwaitAck => {
                self.state = State::Complete;
                log::trace!("end_tx_phase: {from:?} -> Complete");
                Ok(())
            }
            _ => {
                log::warn!("end_tx_phase: illegal state {from:?}, aborting {abort_why}");
                Err(abort_why)
            }
        }
    }

    /// `receiving_reply` (spec.md §4.7): invoked when the first reply DATA
    /// arrives on a client call.
    pub fn receiving_reply(&mut self) -> Result<(), ProtocolAbort> {
        if !self.flags.tx_last() {
            let tx_top = self.tx_top;
            let outcome = crate::call::tx_window::rotate_tx_window(self, tx_top);
            if !outcome.tx_last {
                return Err(ProtocolAbort::Txl);
            }
        }
        self.end_tx_phase(true, ProtocolAbort::Etd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ack_matches_spec_state_gate() {
        assert!(State::ClientSendRequest.accepts_ack());
        assert!(State::ClientAwaitReply.accepts_ack());
        assert!(State::ServerSendReply.accepts_ack());
        assert!(State::ServerAwaitAck.accepts_ack());
        assert!(!State::ClientRecvReply.accepts_ack());
        assert!(!State::ServerRecvRequest.accepts_ack());
        assert!(!State::Complete.accepts_ack());
    }
}
