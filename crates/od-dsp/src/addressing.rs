//! Addressing-register arithmetic
//!
//! Each `$arN` wraps inside a power-of-two window described by `$wrN`:
//! carries out of the window are folded back so the register cycles through
//! `wr + 1` consecutive words. With `wr = 0xffff` the arithmetic is plain
//! 16-bit wrapping. All arithmetic is done in 32 bits and truncated.

/// `ar + 1`
pub fn increment(ar: u16, wr: u16) -> u16 {
    let (ar, wr) = (ar as u32, wr as u32);
    let mut nar = ar + 1;
    if (nar ^ ar) > ((wr | 1) << 1) {
        nar = nar.wrapping_sub(wr + 1);
    }
    nar as u16
}

/// `ar - 1`
pub fn decrement(ar: u16, wr: u16) -> u16 {
    let (ar, wr) = (ar as u32, wr as u32);
    let mut nar = ar + wr;
    if ((nar ^ ar) & ((wr | 1) << 1)) > wr {
        nar = nar.wrapping_sub(wr + 1);
    }
    nar as u16
}

fn add_signed(ar: u32, wr: u32, ix: i32) -> u16 {
    let ix_bits = ix as u32;
    let mx = (wr | 1) << 1;
    let mut nar = ar.wrapping_add(ix_bits);
    let dar = (nar ^ ar ^ ix_bits) & mx;

    if ix >= 0 {
        if dar > wr {
            nar = nar.wrapping_sub(wr + 1);
        }
    } else if ((nar.wrapping_add(wr + 1) ^ nar) & dar) <= wr {
        nar = nar.wrapping_add(wr + 1);
    }
    nar as u16
}

/// `ar + ix`
pub fn increase_by_ix(ar: u16, wr: u16, ix: i16) -> u16 {
    add_signed(ar as u32, wr as u32, ix as i32)
}

/// `ar - ix`
pub fn decrease_by_ix(ar: u16, wr: u16, ix: i16) -> u16 {
    add_signed(ar as u32, wr as u32, -(ix as i32))
}

/// True when two data addresses fall in the same 1K-word page. Dual loads
/// from one page read the first address for both halves.
#[inline]
pub fn is_same_mem_area(a: u16, b: u16) -> bool {
    (a >> 10) == (b >> 10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_linear_addressing_wraps_at_16_bits() {
        assert_eq!(increment(0x1234, 0xffff), 0x1235);
        assert_eq!(increment(0xffff, 0xffff), 0x0000);
        assert_eq!(decrement(0x0000, 0xffff), 0xffff);
        assert_eq!(decrement(0x0100, 0xffff), 0x00ff);
        assert_eq!(increase_by_ix(0x0100, 0xffff, -2), 0x00fe);
        assert_eq!(decrease_by_ix(0x0100, 0xffff, 0x20), 0x00e0);
    }

    #[test]
    fn test_circular_buffer_of_four() {
        // wr = 3 cycles through a 4-word window
        let mut ar = 0x0100;
        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(ar);
            ar = increment(ar, 3);
        }
        assert_eq!(seen, [0x100, 0x101, 0x102, 0x103, 0x100, 0x101, 0x102, 0x103]);

        assert_eq!(decrement(0x0100, 3), 0x0103);
        assert_eq!(decrement(0x0102, 3), 0x0101);
        assert_eq!(increase_by_ix(0x0102, 3, 3), 0x0101);
        assert_eq!(increase_by_ix(0x0101, 3, -2), 0x0103);
    }

    #[test]
    fn test_same_mem_area() {
        assert!(is_same_mem_area(0x0400, 0x0400));
        assert!(is_same_mem_area(0x0400, 0x07ff));
        assert!(!is_same_mem_area(0x0400, 0x0800));
        assert!(!is_same_mem_area(0x03ff, 0x0400));
    }

    proptest! {
        #[test]
        fn linear_matches_wrapping_arithmetic(ar: u16, ix: i16) {
            prop_assert_eq!(increment(ar, 0xffff), ar.wrapping_add(1));
            prop_assert_eq!(decrement(ar, 0xffff), ar.wrapping_sub(1));
            prop_assert_eq!(increase_by_ix(ar, 0xffff, ix), ar.wrapping_add(ix as u16));
        }

        #[test]
        fn increment_then_decrement_is_identity(base in 0u16..0x100, offset in 0u16..16, shift in 1u32..5) {
            let wr = (1u16 << shift) - 1;
            let ar = (base << 4) | (offset & wr);
            prop_assert_eq!(decrement(increment(ar, wr), wr), ar);
        }
    }
}
