//! Receive-window engine and SACK table (spec.md §4.3, §4.4).
//!
//! The window is the pair `(window, wtop)` spec.md packs into one 64-bit
//! atomic so the transmit side can read a consistent snapshot without a
//! lock. This crate models the call engine as single-threaded cooperative
//! per spec.md §5 ("at most one receive-handler runs per Call at a time"),
//! so the pair is kept as two plain `u32`s guarded by the same discipline
//! the teacher gives `SendSpace`/`RecvSpace` — plain fields mutated only by
//! the one thread allowed to touch them. `snapshot()` below is the seam an
//! embedder's transmit-side reader would use to get the atomic pair.

use crate::config::SACK_SIZE;
use crate::seq::{after, before};

/// What happened to one accepted-or-rejected DATA sequence number
/// (spec.md §4.3 steps 4-6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// `before(seq, window)`: already delivered in-order.
    Duplicate,
    /// `after(seq, window + rx_winsize - 1)`.
    ExceedsWindow,
    /// `seq == window`: queued, and the OoS queue may have drained further
    /// contiguous sequence numbers behind it.
    InOrder { drained: Vec<u32> },
    /// `window < seq <= wlimit`, newly recorded out-of-order.
    OutOfSequenceNew,
    /// `window < seq <= wlimit`, SACK bit already set for this seq.
    OutOfSequenceDuplicate,
}

/// `ackr_window` plus the OoS holding area and SACK bitmap (spec.md §3).
#[derive(Debug, Clone)]
pub struct RxWindow {
    window: u32,
    wtop: u32,
    rx_winsize: u32,
    /// Sorted ascending; all seqs lie in `(window, window + rx_winsize)`
    /// (spec.md §3 `rx_oos_queue`).
    oos_queue: Vec<u32>,
    sack_table: Vec<bool>,
}

impl RxWindow {
    pub fn new(start_seq: u32, rx_winsize: u32) -> Self {
        debug_assert!(
            rx_winsize as usize <= SACK_SIZE,
            "rx_winsize ({rx_winsize}) must not exceed SACK_SIZE ({SACK_SIZE}) or seq % SACK_SIZE stops being injective within the window"
        );
        RxWindow {
            window: start_seq,
            wtop: start_seq,
            rx_winsize,
            oos_queue: Vec::new(),
            sack_table: vec![false; SACK_SIZE],
        }
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn wtop(&self) -> u32 {
        self.wtop
    }

    /// `(wtop, window)` as spec.md's double-word atomic packs it (§9).
    pub fn snapshot(&self) -> u64 {
        (u64::from(self.wtop) << 32) | u64::from(self.window)
    }

    pub fn oos_queue(&self) -> &[u32] {
        &self.oos_queue
    }

    pub fn sack_bit(&self, seq: u32) -> bool {
        self.sack_table[seq as usize % SACK_SIZE]
    }

    fn set_sack(&mut self, seq: u32) {
        self.sack_table[seq as usize % SACK_SIZE] = true;
    }

    fn clear_sack(&mut self, seq: u32) {
        self.sack_table[seq as usize % SACK_SIZE] = false;
    }

    /// Runs spec.md §4.3 steps 4-6 for one DATA packet's sequence number,
    /// mutating `window`/`wtop`/the OoS queue/the SACK table as the outcome
    /// demands. The caller (the `Call`-level orchestrator) still owns the
    /// last-packet invariant checks (step 1), the jumbo-abuse gate (step 3)
    /// and choosing an ACK reason from the returned outcome (step 7).
    pub fn accept(&mut self, seq: u32) -> AcceptOutcome {
        if before(seq, self.window) {
            return AcceptOutcome::Duplicate;
        }
        let wlimit = self.window.wrapping_add(self.rx_winsize - 1);
        if after(seq, wlimit) {
            return AcceptOutcome::ExceedsWindow;
        }
        if seq == self.window {
            self.window = self.window.wrapping_add(1);
            if before(self.wtop, self.window) {
                self.wtop = self.window;
            }
            let mut drained = Vec::new();
            while let Some(&head) = self.oos_queue.first() {
                if after(head, self.window) {
                    break;
                }
                self.oos_queue.remove(0);
                drained.push(head);
                self.clear_sack(head);
                if head == self.window {
                    self.window = self.window.wrapping_add(1);
                }
            }
            if before(self.wtop, self.window) {
                self.wtop = self.window;
            }
            AcceptOutcome::InOrder { drained }
        } else if self.sack_bit(seq) {
            AcceptOutcome::OutOfSequenceDuplicate
        } else {
            self.set_sack(seq);
            if after(seq.wrapping_add(1), self.wtop) {
                self.wtop = seq.wrapping_add(1);
            }
            let pos = self
                .oos_queue
                .iter()
                .position(|&s| after(s, seq))
                .unwrap_or(self.oos_queue.len());
            self.oos_queue.insert(pos, seq);
            AcceptOutcome::OutOfSequenceNew
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_advances_window() {
        let mut w = RxWindow::new(1, 32);
        let outcome = w.accept(1);
        assert_eq!(outcome, AcceptOutcome::InOrder { drained: vec![] });
        assert_eq!(w.window(), 2);
        assert_eq!(w.wtop(), 2);
    }

    #[test]
    fn hole_fill_scenario_ii() {
        let mut w = RxWindow::new(1, 32);
        assert_eq!(w.accept(1), AcceptOutcome::InOrder { drained: vec![] });
        assert_eq!(w.window(), 2);

        assert_eq!(w.accept(3), AcceptOutcome::OutOfSequenceNew);
        assert_eq!(w.window(), 2);
        assert_eq!(w.wtop(), 4);
        assert!(w.sack_bit(3));

        assert_eq!(w.accept(4), AcceptOutcome::OutOfSequenceNew);
        assert_eq!(w.window(), 2);
        assert_eq!(w.wtop(), 5);
        assert!(w.sack_bit(4));

        match w.accept(2) {
            AcceptOutcome::InOrder { drained } => assert_eq!(drained, vec![3, 4]),
            other => panic!("expected drain, got {other:?}"),
        }
        assert_eq!(w.window(), 5);
        assert!(!w.sack_bit(3));
        assert!(!w.sack_bit(4));
    }

    #[test]
    fn duplicate_in_window_detected() {
        let mut w = RxWindow::new(1, 32);
        w.accept(1);
        assert_eq!(w.accept(1), AcceptOutcome::Duplicate);
    }

    #[test]
    fn duplicate_out_of_sequence_detected() {
        let mut w = RxWindow::new(1, 32);
        w.accept(3);
        assert_eq!(w.accept(3), AcceptOutcome::OutOfSequenceDuplicate);
    }

    #[test]
    fn exceeds_window_rejected() {
        let mut w = RxWindow::new(1, 4);
        assert_eq!(w.accept(5), AcceptOutcome::ExceedsWindow);
    }
}
