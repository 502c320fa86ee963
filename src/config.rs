//! Tunables (spec.md §6 "Tunables" and the RFC 5681 constants the congestion
//! controller needs). The teacher hardcodes its RFC 9293 constants (`mss:
//! 536`, `cwnd: 4 * 536`, `rto: 1000`) directly as struct-literal fields in
//! `TCB::listen`/`TCB::syn_sent`; here they are pulled into one struct so a
//! `Call` can be built with non-default windows in tests without touching
//! the constants themselves.

/// Ring size for the SACK bitmap. Per spec.md §4.4, must be >= `rx_winsize`
/// so the modular index `seq % SACK_SIZE` is injective within the window.
pub const SACK_SIZE: usize = 256;

/// Size of one jumbo subpacket (spec.md §4.2, §6).
pub const JUMBO_SUBPKTLEN: usize = 1412;

/// Size of the `jumbo_header` trailer appended to every jumbo subpacket but
/// the last (spec.md §6).
pub const JUMBO_HEADER_SIZE: usize = 3;

/// Number of outstanding RTT probes tracked at once (spec.md §3 `rtt_serial`).
pub const RTT_RING_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    /// Largest width either the receive or transmit window may grow to.
    pub tx_max_window: u32,
    /// Sender maximum segment size, used to size the initial congestion window.
    pub tx_smss: u32,
    /// Width of this call's receive window (`rx_winsize`).
    pub rx_winsize: u32,
    /// Largest single DATA payload this call will accept (`MAX_BLOCKSIZE`).
    pub max_blocksize: u32,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            tx_max_window: 255,
            tx_smss: 1024,
            rx_winsize: 32,
            max_blocksize: 1412,
        }
    }
}

impl Tunables {
    /// Initial congestion window per RFC 5681 §3.1, the same table the
    /// teacher's `TCB::listen` encodes inline for a fixed 536-byte MSS.
    pub fn initial_cwnd(&self) -> u32 {
        if self.tx_smss > 2190 {
            2
        } else if self.tx_smss > 1095 {
            3
        } else {
            4
        }
    }
}
