//! The receive-side call engine of an RxRPC transport: the per-call state
//! machine that consumes DATA, ACK, ACKALL, and ABORT packets belonging to
//! an already-dispatched call, reorders them, maintains a sliding receive
//! window with selective acknowledgement, drives the transmit side via
//! hard/soft ACK processing, runs congestion control over the send window,
//! and completes RTT probes.
//!
//! Everything a dispatch layer, connection/peer objects, key derivation,
//! and socket-facing queueing would normally own is modelled as an injected
//! capability (`collab`) instead of implemented here — see `collab` for the
//! trait seams and `collab::testkit` for the fakes the test suite drives
//! against.

pub mod call;
pub mod collab;
pub mod config;
pub mod err;
pub mod seq;
pub mod wire;

pub use call::{Call, State};
pub use collab::Collaborators;
pub use config::Tunables;
pub use err::{CallError, Errno, ProtocolAbort};
