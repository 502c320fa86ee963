//! Abort and implicit termination (spec.md §4.9).

use crate::collab::Collaborators;
use crate::err::{CallError, ProtocolAbort};

use super::phase::State;
use super::Call;

/// Default abort code the kernel uses when a peer ABORT carries no
/// explicit code (spec.md §4.9).
pub const RX_CALL_DEAD: u32 = 1;

/// Wire abort code for a locally detected protocol violation (spec.md §7).
/// Distinct from `Errno`, which only labels the *local* completion reason
/// handed to the embedder — this is the numeric code that goes out on the
/// wire in the outgoing ABORT packet.
pub const RX_PROTOCOL_ERROR: u32 = 2;

impl Call {
    /// Handles a received ABORT packet: decodes the 4-byte code (defaulting
    /// to `RX_CALL_DEAD`) and marks the call remotely aborted.
    pub fn on_remote_abort(&mut self, code: Option<u32>) {
        let code = code.unwrap_or(RX_CALL_DEAD);
        log::warn!("call remotely aborted, peer code {code}");
        self.complete(CallError::RemoteAbort { code });
    }

    /// Raises a protocol abort: completes the call locally with
    /// `EBADMSG` and schedules an outgoing ABORT carrying the 3-letter
    /// code (spec.md §4.9, §7).
    pub fn raise_protocol_abort(
        &mut self,
        abort: ProtocolAbort,
        collab: &mut Collaborators<'_>,
    ) {
        log::warn!("protocol abort {}: {abort}", abort.code());
        collab.tx.send_abort(RX_PROTOCOL_ERROR, abort.code());
        self.complete(CallError::Protocol(abort));
    }

    /// Handles a `CallError` returned by an external collaborator (currently
    /// only `Security::unshare`, spec.md §2, §6): a `Protocol` error is
    /// raised the same way a locally detected one is (outgoing ABORT plus
    /// completion), anything else just completes the call with that reason.
    pub(super) fn fail_from_collaborator(
        &mut self,
        err: CallError,
        collab: &mut Collaborators<'_>,
    ) {
        match err {
            CallError::Protocol(abort) => self.raise_protocol_abort(abort, collab),
            other => self.complete(other),
        }
    }

    /// Marks the call terminal. Idempotent: once `Complete`, later calls are
    /// no-ops (spec.md §3 "transitions to COMPLETE exactly once").
    pub fn complete(&mut self, reason: CallError) {
        if self.state == State::Complete {
            return;
        }
        self.state = State::Complete;
        self.completion = Some(reason);
    }

    /// Implicit termination (server side, spec.md §4.9): a new DATA for a
    /// newer call arrived on the same channel. `self` is the *old* call
    /// being torn down; it has already been fed the new packet to flush any
    /// final state before this is called.
    pub fn implicit_terminate(&mut self, collab: &mut Collaborators<'_>) {
        log::debug!("implicit termination, call state was {:?}", self.state);
        self.flags.set_is_dead(true);
        if self.state == State::ServerAwaitAck {
            self.complete(CallError::ImplicitTermination);
        } else {
            collab.tx.send_abort(RX_CALL_DEAD, ProtocolAbort::Imp.code());
            self.complete(CallError::ImplicitTermination);
            collab.socket.disconnect_call();
        }
    }
}
