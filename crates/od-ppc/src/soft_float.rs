//! Integer-only arithmetic cores over [`FpTemp`]
//!
//! Operands are finite. Results keep the leading one at bit 55 with every
//! discarded bit folded into bit 0, ready for a single rounding step.

use std::cmp::Ordering;

use crate::fp_temp::{sticky_shift_right_128, FpTemp, MANTISSA_TOP};
use crate::fpscr::RoundingMode;

/// Leading-one position of a mantissa widened to 128 bits with its tail
const WIDE_TOP: u32 = MANTISSA_TOP + 64;

#[inline]
fn widen(mantissa: u64, tail: u64) -> u128 {
    ((mantissa as u128) << 64) | tail as u128
}

#[inline]
fn collapse(wide: u128) -> u64 {
    ((wide >> 64) as u64) | ((wide as u64) != 0) as u64
}

fn magnitude_key(t: &FpTemp, tail: u64) -> (bool, i32, u64, u64) {
    let nonzero = t.mantissa != 0 || tail != 0;
    (nonzero, t.exponent, t.mantissa, tail)
}

/// Add `a` (with a 64-bit low tail, as produced by [`mul_core`]) and `b`
pub fn add_core(a: FpTemp, a_tail: u64, b: FpTemp, b_tail: u64, rounding: RoundingMode) -> FpTemp {
    let a_zero = a.mantissa == 0 && a_tail == 0;
    let b_zero = b.mantissa == 0 && b_tail == 0;
    if a_zero && b_zero {
        let sign = if a.sign == b.sign {
            a.sign
        } else {
            rounding == RoundingMode::TowardNegative
        };
        return FpTemp::zero(sign);
    }

    let (big, big_tail, small, small_tail) =
        match magnitude_key(&a, a_tail).cmp(&magnitude_key(&b, b_tail)) {
            Ordering::Less => (b, b_tail, a, a_tail),
            _ => (a, a_tail, b, b_tail),
        };

    let mut exponent = big.exponent;
    let big_wide = widen(big.mantissa, big_tail);
    let small_wide = if small.mantissa == 0 && small_tail == 0 {
        0
    } else {
        let diff = (big.exponent - small.exponent) as u32;
        sticky_shift_right_128(widen(small.mantissa, small_tail), diff)
    };

    let mut sum = if big.sign == small.sign {
        big_wide + small_wide
    } else {
        big_wide - small_wide
    };

    if sum == 0 {
        return FpTemp::zero(rounding == RoundingMode::TowardNegative);
    }

    if sum >> (WIDE_TOP + 1) != 0 {
        sum = sticky_shift_right_128(sum, 1);
        exponent += 1;
    } else {
        let shift = sum.leading_zeros() - (127 - WIDE_TOP);
        sum <<= shift;
        exponent -= shift as i32;
    }

    FpTemp {
        mantissa: collapse(sum),
        exponent,
        sign: big.sign,
    }
}

/// Exact product of two mantissas: the high part as an [`FpTemp`] and the
/// 64 bits below it as a tail
pub fn mul_core(a: FpTemp, b: FpTemp) -> (FpTemp, u64) {
    let sign = a.sign != b.sign;
    if a.is_zero() || b.is_zero() {
        return (FpTemp::zero(sign), 0);
    }

    // 55 + 55 = 110; move the leading one up to bit 119
    let mut product = ((a.mantissa as u128) * (b.mantissa as u128)) << 9;
    let mut exponent = a.exponent + b.exponent - 0x3FF;
    if product >> (WIDE_TOP + 1) != 0 {
        product = sticky_shift_right_128(product, 1);
        exponent += 1;
    }

    (
        FpTemp {
            mantissa: (product >> 64) as u64,
            exponent,
            sign,
        },
        product as u64,
    )
}

/// Product with the tail folded into the sticky bit
pub fn mul_rounded(a: FpTemp, b: FpTemp) -> FpTemp {
    let (product, tail) = mul_core(a, b);
    FpTemp {
        mantissa: product.mantissa | (tail != 0) as u64,
        ..product
    }
}

/// Quotient `a / b` with a sticky bit from the remainder. `b` is nonzero.
pub fn div_core(a: FpTemp, b: FpTemp) -> FpTemp {
    let sign = a.sign != b.sign;
    if a.is_zero() || b.is_zero() {
        return FpTemp::zero(sign);
    }

    let dividend = (a.mantissa as u128) << 64;
    let divisor = b.mantissa as u128;
    let quotient = dividend / divisor;
    let remainder = dividend % divisor;

    let (shift, exponent) = if quotient >> 64 != 0 {
        (9, a.exponent - b.exponent + 0x3FF)
    } else {
        (8, a.exponent - b.exponent + 0x3FF - 1)
    };
    let mantissa = sticky_shift_right_128(quotient, shift) as u64 | (remainder != 0) as u64;

    FpTemp {
        mantissa,
        exponent,
        sign,
    }
}

/// `a * c + b` with one rounding
pub fn madd_fptemp(a: FpTemp, c: FpTemp, b: FpTemp, rounding: RoundingMode) -> FpTemp {
    let (product, tail) = mul_core(a, c);
    add_core(product, tail, b, 0, rounding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp_temp::{decompose_double, round_fptemp_to_double};

    const RN: RoundingMode = RoundingMode::Nearest;

    fn d(v: f64) -> FpTemp {
        decompose_double(v.to_bits())
    }

    fn value(t: FpTemp) -> f64 {
        f64::from_bits(round_fptemp_to_double(t, RN, false).0)
    }

    #[test]
    fn test_add_matches_host() {
        for (a, b) in [(1.0, 2.0), (1.0, -1.0e-20), (0.1, 0.2), (-3.5, 1.25), (1e300, 1e300)] {
            assert_eq!(value(add_core(d(a), 0, d(b), 0, RN)), a + b, "{} + {}", a, b);
        }
    }

    #[test]
    fn test_exact_cancellation_sign() {
        let r = add_core(d(1.5), 0, d(-1.5), 0, RN);
        assert_eq!(r, FpTemp::zero(false));
        let r = add_core(d(1.5), 0, d(-1.5), 0, RoundingMode::TowardNegative);
        assert_eq!(r, FpTemp::zero(true));
        let r = add_core(d(-0.0), 0, d(-0.0), 0, RN);
        assert_eq!(r, FpTemp::zero(true));
    }

    #[test]
    fn test_add_with_zero_operand() {
        assert_eq!(value(add_core(d(0.0), 0, d(-7.0), 0, RN)), -7.0);
    }

    #[test]
    fn test_mul_matches_host() {
        for (a, b) in [(1.5, 2.0), (0.1, 0.3), (-7.25, 3.0), (1e-300, 1e-10)] {
            assert_eq!(value(mul_rounded(d(a), d(b))), a * b, "{} * {}", a, b);
        }
    }

    #[test]
    fn test_div_matches_host() {
        for (a, b) in [(1.0, 3.0), (2.0, 0.5), (-10.0, 4.0), (0.1, 0.7)] {
            assert_eq!(value(div_core(d(a), d(b))), a / b, "{} / {}", a, b);
        }
    }

    #[test]
    fn test_fma_single_rounding() {
        // (1 + 2^-27)^2 - 1 keeps the 2^-54 term only when fused
        let a = 1.0 + 1.0 / 134_217_728.0;
        let b = -1.0;
        let fused = value(madd_fptemp(d(a), d(a), d(b), RN));
        assert_eq!(fused, a.mul_add(a, b));
        assert_ne!(fused, a * a + b);
    }
}
