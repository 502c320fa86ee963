//! Circular sequence and serial number arithmetic (spec.md §3, §9).
//!
//! All ordering comparisons on RxRPC sequence and serial numbers are modular:
//! a sequence number is "before" another if the signed difference is
//! negative, mirroring TCP's wrapping comparisons (the teacher's
//! `wrapping_lt`/`is_between_wrapped` pair in `tcp/tcb.rs`, generalized to
//! the four named relations spec.md asks for).

/// `true` if `a` precedes `b` on the circular number line.
pub fn before(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// `true` if `a` follows `b` on the circular number line.
pub fn after(a: u32, b: u32) -> bool {
    before(b, a)
}

/// `true` if `a` precedes or equals `b`.
pub fn before_eq(a: u32, b: u32) -> bool {
    !after(a, b)
}

/// `true` if `a` follows or equals `b`.
pub fn after_eq(a: u32, b: u32) -> bool {
    !before(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn adjacent_ordering() {
        assert!(before(1, 2));
        assert!(after(2, 1));
        assert!(before_eq(1, 1));
        assert!(after_eq(1, 1));
        assert!(!before(2, 1));
        assert!(!after(1, 2));
    }

    #[test]
    fn wraps_around_u32_boundary() {
        assert!(before(u32::MAX, 0));
        assert!(after(0, u32::MAX));
    }

    #[test]
    fn random_round_trip_is_antisymmetric() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let a: u32 = rng.gen();
            let b: u32 = rng.gen_range(1..u32::MAX / 2);
            let b = a.wrapping_add(b);
            assert!(before(a, b) != after(a, b) || a == b);
        }
    }
}
