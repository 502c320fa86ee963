//! Injected capability interfaces (spec.md §6, §9 "External collaborators").
//!
//! The teacher drives its TCB against real collaborators (`TcpStream`'s
//! `Arc<Mutex<VecDeque<Segment>>>`, a real TUN device in `ioutil.rs`) that
//! this crate has no equivalent for: packet dispatch, peer/connection
//! objects, security/key derivation, and timer wheels are all out of scope
//! (spec.md §1 Non-goals). Design Notes §9 asks for these to be expressed as
//! injected capability interfaces instead, so the call engine stays headless
//! and testable the way the teacher's `TCB` methods are callable directly
//! against in-memory `Segment`s without any kernel socket.

use std::time::{Duration, Instant};

use crate::err::CallError;
use crate::wire::AckReason;

/// Everything the congestion controller and ACK processor need to know
/// about (and change on) the shared `Peer` object (spec.md §6, §4.6).
pub trait Peer {
    fn srtt_us(&self) -> u64;
    fn rtt_count(&self) -> u32;
    fn maxdata(&self) -> u32;
    fn mtu(&self) -> u32;
    fn hdrsize(&self) -> u32;
    fn set_maxdata(&mut self, maxdata: u32);
    fn set_mtu(&mut self, mtu: u32);
    /// Submits one RTT sample (spec.md §4.8 RTT tracker).
    fn add_rtt_sample(&mut self, sample: Duration);
}

/// The opaque "security layer" (spec.md §1): in-place decryption of a
/// packet body when `securityIndex != 0`. Key derivation itself is out of
/// scope; this crate only needs the capability to ask for it.
pub trait Security {
    fn unshare(&mut self, buf: &mut [u8], security_index: u8) -> Result<(), CallError>;
}

/// The transmit side and ABORT path (spec.md §6 "Transmit side").
pub trait Transmitter {
    fn send_ack(&mut self, reason: AckReason, serial: u32, why: &'static str);
    fn propose_delay_ack(&mut self);
    fn propose_ping(&mut self);
    fn send_abort(&mut self, code: u32, why: &'static str);
    /// Requested by the congestion controller when `resend` is set
    /// (spec.md §4.8).
    fn resend(&mut self);
    /// Wakes writers to push up to `extra` additional unsent DATA packets
    /// (spec.md §4.8 `send_extra_data`).
    fn send_extra_data(&mut self, extra: u8);
}

/// Socket-facing notifications (spec.md §6 "Connection / socket").
pub trait SocketNotify {
    fn notify_socket(&mut self);
    fn disconnect_call(&mut self);
}

/// Timer-wheel writes (spec.md §6 "Timers"). `now` is threaded through
/// explicitly rather than read from the clock, so tests stay deterministic.
pub trait Timers {
    fn reduce_call_timer(&mut self, deadline: Instant, now: Instant, reason: &'static str);
}

/// Bundles the five collaborator capabilities so call sites pass one value
/// instead of five, mirroring how the teacher's `TCB` methods take a single
/// `&mut TcpStream`-reachable context rather than separate channel handles.
pub struct Collaborators<'a> {
    pub peer: &'a mut dyn Peer,
    pub security: &'a mut dyn Security,
    pub tx: &'a mut dyn Transmitter,
    pub socket: &'a mut dyn SocketNotify,
    pub timers: &'a mut dyn Timers,
}

/// Headless test doubles, analogous to the teacher exercising `TCB` methods
/// directly against an in-memory `TcpStream` instead of a kernel socket.
#[cfg(any(test, feature = "testkit"))]
pub mod testkit {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SentAck {
        pub reason: AckReason,
        pub serial: u32,
        pub why: &'static str,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SentAbort {
        pub code: u32,
        pub why: &'static str,
    }

    #[derive(Debug, Default)]
    pub struct FakePeer {
        pub srtt_us: u64,
        pub rtt_count: u32,
        pub maxdata: u32,
        pub mtu: u32,
        pub hdrsize: u32,
        pub samples: Vec<Duration>,
    }

    impl Peer for FakePeer {
        fn srtt_us(&self) -> u64 {
            self.srtt_us
        }
        fn rtt_count(&self) -> u32 {
            self.rtt_count
        }
        fn maxdata(&self) -> u32 {
            self.maxdata
        }
        fn mtu(&self) -> u32 {
            self.mtu
        }
        fn hdrsize(&self) -> u32 {
            self.hdrsize
        }
        fn set_maxdata(&mut self, maxdata: u32) {
            self.maxdata = maxdata;
        }
        fn set_mtu(&mut self, mtu: u32) {
            self.mtu = mtu;
        }
        fn add_rtt_sample(&mut self, sample: Duration) {
            self.rtt_count += 1;
            self.samples.push(sample);
        }
    }

    #[derive(Debug, Default)]
    pub struct FakeSecurity {
        pub calls: u32,
    }

    impl Security for FakeSecurity {
        fn unshare(&mut self, _buf: &mut [u8], _security_index: u8) -> Result<(), CallError> {
            self.calls += 1;
            Ok(())
        }
    }

    /// Records every outgoing decision instead of sending anything, so
    /// tests can assert on `acks`/`aborts`/`resends` directly.
    #[derive(Debug, Default)]
    pub struct FakeTransmitter {
        pub acks: Vec<SentAck>,
        pub delay_acks: u32,
        pub pings: u32,
        pub aborts: Vec<SentAbort>,
        pub resends: u32,
        pub extra_data: u32,
    }

    impl Transmitter for FakeTransmitter {
        fn send_ack(&mut self, reason: AckReason, serial: u32, why: &'static str) {
            self.acks.push(SentAck { reason, serial, why });
        }
        fn propose_delay_ack(&mut self) {
            self.delay_acks += 1;
        }
        fn propose_ping(&mut self) {
            self.pings += 1;
        }
        fn send_abort(&mut self, code: u32, why: &'static str) {
            self.aborts.push(SentAbort { code, why });
        }
        fn resend(&mut self) {
            self.resends += 1;
        }
        fn send_extra_data(&mut self, extra: u8) {
            self.extra_data += extra as u32;
        }
    }

    #[derive(Debug, Default)]
    pub struct FakeSocketNotify {
        pub notified: u32,
        pub disconnected: u32,
    }

    impl SocketNotify for FakeSocketNotify {
        fn notify_socket(&mut self) {
            self.notified += 1;
        }
        fn disconnect_call(&mut self) {
            self.disconnected += 1;
        }
    }

    #[derive(Debug, Default)]
    pub struct FakeTimers {
        pub last_deadline: Option<Instant>,
        pub reasons: Vec<&'static str>,
    }

    impl Timers for FakeTimers {
        fn reduce_call_timer(&mut self, deadline: Instant, _now: Instant, reason: &'static str) {
            self.last_deadline = Some(deadline);
            self.reasons.push(reason);
        }
    }

    /// Owns one of each fake so a test can build a `Collaborators` borrowing
    /// from it without juggling five separate locals.
    #[derive(Debug, Default)]
    pub struct FakeCollaborators {
        pub peer: FakePeer,
        pub security: FakeSecurity,
        pub tx: FakeTransmitter,
        pub socket: FakeSocketNotify,
        pub timers: FakeTimers,
    }

    impl FakeCollaborators {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn as_collab(&mut self) -> Collaborators<'_> {
            Collaborators {
                peer: &mut self.peer,
                security: &mut self.security,
                tx: &mut self.tx,
                socket: &mut self.socket,
                timers: &mut self.timers,
            }
        }
    }
}
