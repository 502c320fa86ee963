//! RTT probe ring (spec.md §4.8, §9).
//!
//! spec.md's source packs slot state into a bisected bitset (`rtt_avail`'s
//! low half marks "free", high half marks "pending") so the publishing side
//! can flip one bit under a memory fence instead of a lock. Design Notes §9
//! offers the typed alternative explicitly — `{Free, Pending{serial,
//! sent_at}}` — "at a small atomicity cost" that this crate's single-
//! threaded-per-call model (spec.md §5) makes free. The teacher's `rto`/
//! `srtt`/`rttvar` trio in `tcb.rs::compute_rto` is the nearest grounding
//! for "submit a sample to something that owns smoothing"; here that
//! something is the injected `Peer` (`collab::Peer::add_rtt_sample`).

use std::time::{Duration, Instant};

use crate::seq::before;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Free,
    Pending { serial: u32, sent_at: Instant },
}

/// Fixed-size ring of outstanding RTT probes (spec.md §3 `rtt_serial[N]`,
/// `rtt_sent_at[N]`, `rtt_avail`).
#[derive(Debug, Clone)]
pub struct RttRing {
    slots: Vec<Slot>,
    next: usize,
}

/// Outcome of completing a probe (spec.md §4.8 RTT tracker).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RttCompletion {
    /// A sample was produced for the caller to submit to the peer.
    Sample(Duration),
    /// The serial didn't match any pending slot.
    Lost,
}

impl RttRing {
    pub fn new(size: usize) -> Self {
        RttRing {
            slots: vec![Slot::Free; size],
            next: 0,
        }
    }

    /// Records a newly sent probe, evicting the oldest pending slot if the
    /// ring is full (mirrors the kernel's wrap-around allocator over the
    /// bitset).
    pub fn start_probe(&mut self, serial: u32, sent_at: Instant) {
        let len = self.slots.len();
        let idx = self.next % len;
        self.slots[idx] = Slot::Pending { serial, sent_at };
        self.next = (self.next + 1) % len;
    }

    /// `acked_serial` is the serial carried by an incoming ACK whose reason
    /// is PING_RESPONSE or REQUESTED (spec.md §4.6 "RTT completion"). Any
    /// slot whose stored serial is *older* than `acked_serial` is retired as
    /// obsolete without producing a sample (spec.md §4.8).
    pub fn complete(&mut self, acked_serial: u32, now: Instant) -> RttCompletion {
        let mut result = RttCompletion::Lost;
        for slot in &mut self.slots {
            if let Slot::Pending { serial, sent_at } = *slot {
                if serial == acked_serial {
                    result = RttCompletion::Sample(now.saturating_duration_since(sent_at));
                    *slot = Slot::Free;
                } else if before(serial, acked_serial) {
                    *slot = Slot::Free;
                }
            }
        }
        result
    }
}
