//! Congestion controller (spec.md §4.8), an RFC 5681-style slow-start /
//! congestion-avoidance / packet-loss / fast-retransmit state machine. The
//! shape follows the teacher's RTO/cwnd handling in `tcb.rs` (`compute_rto`,
//! the `cwnd`/`ssthresh` fields seeded from SMSS in `TCB::listen`), widened
//! to the four-mode machine spec.md names instead of TCP's single
//! slow-start/avoidance split.

use std::time::{Duration, Instant};

use crate::config::Tunables;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongMode {
    SlowStart,
    CongestAvoidance,
    PacketLoss,
    FastRetransmit,
}

#[derive(Debug, Clone)]
pub struct CongestionState {
    pub mode: CongMode,
    pub cwnd: u32,
    pub ssthresh: u32,
    pub cumul_acks: u8,
    pub dup_acks: u32,
    pub extra: u8,
    pub tstamp: Option<Instant>,
}

impl CongestionState {
    pub fn new(tunables: &Tunables) -> Self {
        CongestionState {
            mode: CongMode::SlowStart,
            cwnd: tunables.initial_cwnd(),
            ssthresh: tunables.tx_max_window,
            cumul_acks: 0,
            dup_acks: 0,
            extra: 0,
            tstamp: None,
        }
    }
}

/// Inputs to one run of the controller, gathered by the ACK processor
/// (spec.md §4.6 end) from the soft-ACK decode and the transmit-window
/// rotation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AckSummary {
    pub nr_new_acks: u32,
    pub nr_rot_new_acks: u32,
    pub saw_nacks: bool,
    pub new_low_nack: bool,
    /// Number of ACK bytes claimed by the packet (`nr_acks` on the wire);
    /// used for `flight_size`.
    pub nr_acks_field: u32,
}

/// Result of one congestion-management pass (spec.md §4.8 tail): whether
/// the caller should invoke the external `resend` hook, and how many extra
/// unsent DATA packets `send_extra_data` may release.
#[derive(Debug, Clone, Copy, Default)]
pub struct CongestionOutcome {
    pub resend: bool,
    pub send_extra: u8,
}

/// Runs spec.md §4.8 end-to-end for one ACK. `retrans_timeout` is the
/// flag's current value; the caller clears it (the flag is "set-and-cleared"
/// per spec.md, i.e. read-and-reset).
#[allow(clippy::too_many_arguments)]
pub fn on_ack(
    state: &mut CongestionState,
    tunables: &Tunables,
    tx_top: u32,
    acks_hard_ack: u32,
    summary: AckSummary,
    retrans_timeout: bool,
    srtt: Duration,
    tx_last_sent: Option<Instant>,
    now: Instant,
) -> CongestionOutcome {
    let flight_size = tx_top
        .wrapping_sub(acks_hard_ack)
        .saturating_sub(summary.nr_acks_field);

    if retrans_timeout {
        state.ssthresh = (flight_size / 2).max(2);
        state.cwnd = 1;
    }
    if state.mode == CongMode::SlowStart && state.cwnd >= state.ssthresh {
        state.mode = CongMode::CongestAvoidance;
        state.cumul_acks = 0;
    }

    state.cumul_acks = state
        .cumul_acks
        .saturating_add((summary.nr_new_acks + summary.nr_rot_new_acks).min(255) as u8);

    if matches!(state.mode, CongMode::SlowStart | CongMode::CongestAvoidance) {
        if let Some(last_sent) = tx_last_sent {
            if now.saturating_duration_since(last_sent) > srtt {
                state.mode = CongMode::SlowStart;
                state.cwnd = tunables.initial_cwnd();
            }
        }
    }

    let mut outcome = CongestionOutcome::default();
    let mode_before = state.mode;

    match state.mode {
        CongMode::SlowStart => {
            if summary.saw_nacks {
                packet_loss_detected(state, flight_size);
            } else {
                if state.cumul_acks > 0 {
                    state.cwnd += 1;
                }
                if state.cwnd >= state.ssthresh {
                    state.mode = CongMode::CongestAvoidance;
                    state.tstamp = Some(now);
                }
            }
        }
        CongMode::CongestAvoidance => {
            if summary.saw_nacks {
                packet_loss_detected(state, flight_size);
            } else {
                let has_samples = srtt > Duration::ZERO;
                let elapsed_enough = state
                    .tstamp
                    .map(|ts| now.saturating_duration_since(ts) > srtt)
                    .unwrap_or(true);
                if has_samples && elapsed_enough {
                    if state.cumul_acks as u32 >= state.cwnd {
                        state.cwnd += 1;
                    }
                    state.tstamp = Some(now);
                }
            }
        }
        CongMode::PacketLoss => {
            if !summary.saw_nacks {
                state.mode = if state.cwnd < state.ssthresh {
                    CongMode::SlowStart
                } else {
                    CongMode::CongestAvoidance
                };
                state.dup_acks = 0;
                state.extra = 0;
                state.tstamp = None;
            } else if summary.new_low_nack {
                state.dup_acks = 1;
                state.extra = state.extra.min(1);
                outcome.send_extra = state.extra;
            } else {
                state.dup_acks += 1;
                if state.dup_acks == 3 {
                    state.mode = CongMode::FastRetransmit;
                    state.ssthresh = (flight_size / 2).max(2);
                    state.cwnd = state.ssthresh + 3;
                    outcome.resend = true;
                }
            }
        }
        CongMode::FastRetransmit => {
            if summary.new_low_nack {
                state.cwnd = state.ssthresh;
                if !summary.saw_nacks {
                    state.mode = if state.cwnd < state.ssthresh {
                        CongMode::SlowStart
                    } else {
                        CongMode::CongestAvoidance
                    };
                }
            } else {
                if summary.nr_new_acks == 0 {
                    state.cwnd += 1;
                }
                state.dup_acks += 1;
                if state.dup_acks == 2 {
                    outcome.resend = true;
                }
            }
        }
    }

    state.cwnd = state.cwnd.clamp(1, tunables.tx_max_window);
    if state.mode != mode_before {
        log::debug!(
            "congestion mode {mode_before:?} -> {:?} (cwnd={}, ssthresh={})",
            state.mode,
            state.cwnd,
            state.ssthresh
        );
    }
    if outcome.resend {
        log::trace!("congestion controller requested resend");
    }
    outcome
}

fn packet_loss_detected(state: &mut CongestionState, flight_size: u32) {
    state.mode = CongMode::PacketLoss;
    state.dup_acks = 0;
    let _ = flight_size;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_with_nacks() -> AckSummary {
        AckSummary {
            saw_nacks: true,
            ..Default::default()
        }
    }

    #[test]
    fn fast_retransmit_scenario_v() {
        let tunables = Tunables::default();
        let mut state = CongestionState::new(&tunables);
        state.mode = CongMode::CongestAvoidance;
        state.cwnd = 10;
        let now = Instant::now();

        for _ in 0..3 {
            on_ack(
                &mut state,
                &tunables,
                100,
                50,
                summary_with_nacks(),
                false,
                Duration::from_millis(100),
                Some(now),
                now,
            );
        }

        assert_eq!(state.mode, CongMode::FastRetransmit);
        let flight = 100u32.wrapping_sub(50);
        assert_eq!(state.ssthresh, (flight / 2).max(2));
        assert_eq!(state.cwnd, state.ssthresh + 3);
    }

    #[test]
    fn cwnd_never_exceeds_max_window() {
        let tunables = Tunables::default();
        let mut state = CongestionState::new(&tunables);
        state.cwnd = tunables.tx_max_window;
        let now = Instant::now();
        on_ack(
            &mut state,
            &tunables,
            10,
            5,
            AckSummary {
                nr_new_acks: 1,
                ..Default::default()
            },
            false,
            Duration::from_millis(50),
            Some(now),
            now,
        );
        assert!(state.cwnd <= tunables.tx_max_window);
    }
}
