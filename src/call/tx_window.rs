//! Transmit-window rotator (spec.md §4.5).

use crate::seq::{after, before_eq};

use super::Call;

/// One buffer on `tx_buffer`, ordered strictly by `seq` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxBufferEntry {
    pub seq: u32,
    pub last: bool,
}

/// What `rotate_tx_window` observed during one walk, handed to the
/// congestion controller (`cumul_acks += nr_new_acks + nr_rot_new_acks`,
/// spec.md §4.8) and to the ACK processor (`new_low_nack`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RotateOutcome {
    pub nr_rot_new_acks: u32,
    pub tx_last: bool,
    pub new_low_nack: bool,
}

/// `rotate_tx_window(to)` (spec.md §4.5): walks `tx_buffer` for entries with
/// `seq > acks_hard_ack` through `seq == to`, publishes `acks_hard_ack = to`,
/// and reports whether the walk crossed a LAST-flagged buffer.
pub fn rotate_tx_window(call: &mut Call, to: u32) -> RotateOutcome {
    let mut outcome = RotateOutcome::default();

    for entry in &call.tx_buffer {
        if after(entry.seq, call.acks_hard_ack) && before_eq(entry.seq, to) {
            outcome.nr_rot_new_acks += 1;
            if entry.last {
                outcome.tx_last = true;
            }
        }
    }

    if outcome.tx_last {
        call.flags.set_tx_last(true);
        if call.tx_buffer.iter().any(|e| e.seq == to && e.last) || to == call.tx_top {
            call.flags.set_tx_all_acked(true);
        }
    }

    if call.acks_lowest_nak == call.acks_hard_ack {
        call.acks_lowest_nak = to;
    } else if after(to, call.acks_lowest_nak) {
        call.acks_lowest_nak = to;
        outcome.new_low_nack = true;
    }

    // `acks_hard_ack` is published with release semantics on the kernel
    // side (spec.md §5); this crate's single-threaded cooperative model
    // makes that a plain store.
    call.acks_hard_ack = to;

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::Call;
    use crate::config::Tunables;

    fn call_with_tx_buffer(entries: &[(u32, bool)]) -> Call {
        let mut call = Call::new_client(1, Tunables::default());
        call.tx_top = entries.iter().map(|(s, _)| *s).max().unwrap_or(0);
        call.tx_buffer = entries
            .iter()
            .map(|&(seq, last)| TxBufferEntry { seq, last })
            .collect();
        call
    }

    #[test]
    fn rotate_reports_last_and_advances_hard_ack() {
        let mut call = call_with_tx_buffer(&[(1, false), (2, false), (3, false), (4, true)]);
        let outcome = rotate_tx_window(&mut call, 4);
        assert!(outcome.tx_last);
        assert_eq!(outcome.nr_rot_new_acks, 4);
        assert_eq!(call.acks_hard_ack, 4);
        assert!(call.flags.tx_last());
        assert!(call.flags.tx_all_acked());
    }

    #[test]
    fn rotate_without_last_does_not_set_flag() {
        let mut call = call_with_tx_buffer(&[(1, false), (2, false), (3, true)]);
        let outcome = rotate_tx_window(&mut call, 2);
        assert!(!outcome.tx_last);
        assert_eq!(outcome.nr_rot_new_acks, 2);
        assert!(!call.flags.tx_last());
    }

    #[test]
    fn lowest_nak_advances_with_new_hard_ack() {
        let mut call = call_with_tx_buffer(&[(1, false), (2, false)]);
        call.acks_lowest_nak = 0;
        call.acks_hard_ack = 0;
        let outcome = rotate_tx_window(&mut call, 2);
        assert_eq!(call.acks_lowest_nak, 2);
        assert!(!outcome.new_low_nack);
    }
}
