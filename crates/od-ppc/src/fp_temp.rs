//! Decomposed floating-point values and rounding
//!
//! An [`FpTemp`] carries a 56-bit significand with its leading one at bit 55
//! and three guard bits below the 53 bits a double keeps. The exponent uses
//! double bias (0x3FF) but is widened to `i32` so intermediate results can
//! leave the double range before rounding.

use crate::fpscr::{FpscrFlags, RoundingMode};

pub const SIGN_BIT: u64 = 0x8000_0000_0000_0000;
pub const EXP_MASK: u64 = 0x7FF0_0000_0000_0000;
pub const FRAC_MASK: u64 = 0x000F_FFFF_FFFF_FFFF;
pub const IMPLICIT_BIT: u64 = 0x0010_0000_0000_0000;
pub const QUIET_BIT: u64 = 0x0008_0000_0000_0000;
/// Default quiet NaN produced by invalid operations
pub const DEFAULT_QNAN: u64 = 0x7FF8_0000_0000_0000;
pub const INFINITY: u64 = EXP_MASK;

/// Leading-one position of a normalized [`FpTemp`] mantissa
pub const MANTISSA_TOP: u32 = 55;

/// Smallest normal single exponent, in double bias
pub const SINGLE_MIN_EXP: i32 = 1023 - 126;
/// Largest finite single exponent, in double bias
pub const SINGLE_MAX_EXP: i32 = 1023 + 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpTemp {
    pub mantissa: u64,
    pub exponent: i32,
    pub sign: bool,
}

impl FpTemp {
    pub const fn zero(sign: bool) -> Self {
        Self { mantissa: 0, exponent: 0, sign }
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    pub fn negate(self) -> Self {
        Self { sign: !self.sign, ..self }
    }
}

/// Outcome of dropping the three guard bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rounded {
    pub mantissa: u64,
    /// Bits were discarded (FI)
    pub inexact: bool,
    /// Magnitude was incremented (FR)
    pub incremented: bool,
}

#[inline]
pub fn sign_bits(sign: bool) -> u64 {
    if sign {
        SIGN_BIT
    } else {
        0
    }
}

/// Split a finite double into an [`FpTemp`]. Denormals are normalized.
pub fn decompose_double(bits: u64) -> FpTemp {
    let sign = bits & SIGN_BIT != 0;
    let exponent = ((bits & EXP_MASK) >> 52) as i32;
    let fraction = bits & FRAC_MASK;

    if exponent == 0 {
        if fraction == 0 {
            return FpTemp::zero(sign);
        }
        let mantissa = fraction << 3;
        let shift = mantissa.leading_zeros() - (63 - MANTISSA_TOP);
        return FpTemp {
            mantissa: mantissa << shift,
            exponent: 1 - shift as i32,
            sign,
        };
    }

    FpTemp {
        mantissa: (fraction | IMPLICIT_BIT) << 3,
        exponent,
        sign,
    }
}

/// Shift right, ORing every bit shifted out into bit 0
#[inline]
pub fn sticky_shift_right(value: u64, amount: u32) -> u64 {
    match amount {
        0 => value,
        1..=63 => (value >> amount) | ((value & ((1u64 << amount) - 1)) != 0) as u64,
        _ => (value != 0) as u64,
    }
}

/// 128-bit variant of [`sticky_shift_right`]
#[inline]
pub fn sticky_shift_right_128(value: u128, amount: u32) -> u128 {
    match amount {
        0 => value,
        1..=127 => (value >> amount) | ((value & ((1u128 << amount) - 1)) != 0) as u128,
        _ => (value != 0) as u128,
    }
}

/// Drop the three guard bits of `mantissa` under `mode`
pub fn round_mantissa(mode: RoundingMode, mantissa: u64, sign: bool) -> Rounded {
    let remainder = mantissa & 7;
    let kept = mantissa >> 3;
    let round_up = match mode {
        RoundingMode::Nearest => remainder > 4 || (remainder > 3 && kept & 1 != 0),
        RoundingMode::TowardZero => false,
        RoundingMode::TowardPositive => !sign && remainder != 0,
        RoundingMode::TowardNegative => sign && remainder != 0,
    };
    Rounded {
        mantissa: kept + round_up as u64,
        inexact: remainder != 0,
        incremented: round_up,
    }
}

/// Assemble a double from a rounded 53-bit significand.
///
/// A significand without its implicit bit encodes as a denormal.
pub fn convert_result_to_double(mantissa: u64, exponent: i32, sign: bool, flush: bool) -> u64 {
    let mut mantissa = mantissa;
    let mut exponent = exponent;
    if mantissa & (IMPLICIT_BIT << 1) != 0 {
        mantissa >>= 1;
        exponent += 1;
    }

    if exponent >= 0x7FF {
        return sign_bits(sign) | INFINITY;
    }
    if exponent <= 0 {
        if flush {
            return sign_bits(sign);
        }
        let shift = (1 - exponent) as u32;
        let denormal = if shift >= 64 { 0 } else { mantissa >> shift };
        return sign_bits(sign) | denormal;
    }
    if mantissa & IMPLICIT_BIT == 0 {
        return sign_bits(sign) | mantissa;
    }
    sign_bits(sign) | ((exponent as u64) << 52) | (mantissa & FRAC_MASK)
}

fn inexact_flags(rounded: &Rounded) -> FpscrFlags {
    let mut flags = FpscrFlags::empty();
    if rounded.inexact {
        flags |= FpscrFlags::FI | FpscrFlags::XX;
    }
    if rounded.incremented {
        flags |= FpscrFlags::FR;
    }
    flags
}

fn flushed(sign: bool) -> (u64, FpscrFlags) {
    (
        sign_bits(sign),
        FpscrFlags::UX | FpscrFlags::XX | FpscrFlags::FI,
    )
}

/// Round an intermediate result to double precision
pub fn round_fptemp_to_double(value: FpTemp, mode: RoundingMode, flush: bool) -> (u64, FpscrFlags) {
    if value.is_zero() {
        return (sign_bits(value.sign), FpscrFlags::empty());
    }

    let mut mantissa = value.mantissa;
    let mut exponent = value.exponent;
    let tiny = exponent < 1;
    if tiny {
        if flush {
            return flushed(value.sign);
        }
        // align to the denormal boundary so the value is rounded once
        mantissa = sticky_shift_right(mantissa, (1 - exponent) as u32);
        exponent = 1;
    }

    let rounded = round_mantissa(mode, mantissa, value.sign);
    let bits = convert_result_to_double(rounded.mantissa, exponent, value.sign, flush);
    let mut flags = inexact_flags(&rounded);

    if bits & EXP_MASK == EXP_MASK {
        flags |= FpscrFlags::OX | FpscrFlags::XX | FpscrFlags::FI;
    } else if tiny && rounded.inexact {
        flags |= FpscrFlags::UX;
    }
    (bits, flags)
}

/// Round an intermediate result to single precision, returning the double
/// bit pattern of the rounded single
pub fn round_fptemp_to_single(value: FpTemp, mode: RoundingMode, flush: bool) -> (u64, FpscrFlags) {
    if value.is_zero() {
        return (sign_bits(value.sign), FpscrFlags::empty());
    }

    // 24 significant bits plus guard bits
    let mut mantissa = sticky_shift_right(value.mantissa, 29);
    let mut exponent = value.exponent;
    let tiny = exponent < SINGLE_MIN_EXP;
    if tiny {
        if flush {
            return flushed(value.sign);
        }
        mantissa = sticky_shift_right(mantissa, (SINGLE_MIN_EXP - exponent) as u32);
        exponent = SINGLE_MIN_EXP;
    }

    let rounded = round_mantissa(mode, mantissa, value.sign);
    let mut flags = inexact_flags(&rounded);
    let mut significand = rounded.mantissa;
    if significand & (1 << 24) != 0 {
        significand >>= 1;
        exponent += 1;
    }

    if exponent > SINGLE_MAX_EXP {
        flags |= FpscrFlags::OX | FpscrFlags::XX | FpscrFlags::FI;
        return (sign_bits(value.sign) | INFINITY, flags);
    }
    if tiny && rounded.inexact {
        flags |= FpscrFlags::UX;
    }
    if significand == 0 {
        return (sign_bits(value.sign), flags);
    }

    // single denormals are normal in double format
    let shift = significand.leading_zeros() - 40;
    significand <<= shift;
    exponent -= shift as i32;

    let bits = sign_bits(value.sign)
        | ((exponent as u64) << 52)
        | ((significand & 0x007F_FFFF) << 29);
    (bits, flags)
}

/// Gekko single-precision store conversion (stfs)
pub fn convert_to_single(bits: u64) -> u32 {
    let exponent = ((bits >> 52) & 0x7FF) as u32;
    if exponent > 896 || bits & !SIGN_BIT == 0 {
        (((bits >> 32) & 0xC000_0000) | ((bits >> 29) & 0x3FFF_FFFF)) as u32
    } else if exponent >= 874 {
        // denormal single
        let mut t = (0x8000_0000 | ((bits & FRAC_MASK) >> 21)) as u32;
        t >>= 905 - exponent;
        t | ((bits >> 32) & 0x8000_0000) as u32
    } else {
        // too small for a single: the hardware keeps the raw bit slice
        (((bits >> 32) & 0xC000_0000) | ((bits >> 29) & 0x3FFF_FFFF)) as u32
    }
}

/// Gekko single-precision load conversion (lfs)
pub fn convert_to_double(value: u32) -> u64 {
    let x = value as u64;
    let exponent = (x >> 23) & 0xFF;
    let mut fraction = x & 0x007F_FFFF;

    if exponent > 0 && exponent < 255 {
        let y = ((exponent >> 7) == 0) as u64;
        let z = (y << 61) | (y << 60) | (y << 59);
        ((x & 0xC000_0000) << 32) | z | ((x & 0x3FFF_FFFF) << 29)
    } else if exponent == 0 && fraction != 0 {
        let mut exp = 1023 - 126u64;
        loop {
            fraction <<= 1;
            exp -= 1;
            if fraction & 0x0080_0000 != 0 {
                break;
            }
        }
        ((x & 0x8000_0000) << 32) | (exp << 52) | ((fraction & 0x007F_FFFF) << 29)
    } else {
        // zero, infinity, NaN
        let y = exponent >> 7;
        let z = (y << 61) | (y << 60) | (y << 59);
        ((x & 0xC000_0000) << 32) | z | ((x & 0x3FFF_FFFF) << 29)
    }
}

/// Gekko's multiply truncates frC to 25 significant bits, rounding on bit 27
pub fn force_25_bit(bits: u64) -> u64 {
    (bits & 0xFFFF_FFFF_F800_0000).wrapping_add(bits & 0x0000_0000_0800_0000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(bits: u64) -> u64 {
        round_fptemp_to_double(decompose_double(bits), RoundingMode::Nearest, false).0
    }

    #[test]
    fn test_decompose_normal() {
        let t = decompose_double(1.0f64.to_bits());
        assert_eq!(t.mantissa, 1 << 55);
        assert_eq!(t.exponent, 1023);
        assert!(!t.sign);
    }

    #[test]
    fn test_decompose_denormal_normalizes() {
        let t = decompose_double(1);
        assert_eq!(t.mantissa, 1 << 55);
        assert_eq!(t.exponent, 1 - 52);
    }

    #[test]
    fn test_decompose_zero() {
        assert_eq!(decompose_double(SIGN_BIT), FpTemp::zero(true));
    }

    #[test]
    fn test_representable_round_trip() {
        for bits in [
            1.0f64.to_bits(),
            (-3.75f64).to_bits(),
            f64::MAX.to_bits(),
            f64::MIN_POSITIVE.to_bits(),
            1,
            0x000F_FFFF_FFFF_FFFF,
            0x8000_0000_0000_0001,
            0,
            SIGN_BIT,
        ] {
            assert_eq!(round_trip(bits), bits, "bits {:016x}", bits);
        }
    }

    #[test]
    fn test_sticky_shift_right() {
        assert_eq!(sticky_shift_right(0b1000, 3), 1);
        assert_eq!(sticky_shift_right(0b1001, 3), 1);
        assert_eq!(sticky_shift_right(0b10001, 3), 0b11);
        assert_eq!(sticky_shift_right(0xFFFF, 0), 0xFFFF);
        assert_eq!(sticky_shift_right(1, 64), 1);
        assert_eq!(sticky_shift_right(u64::MAX, 200), 1);
        assert_eq!(sticky_shift_right(0, 64), 0);
        assert_eq!(sticky_shift_right_128(1, 128), 1);
    }

    #[test]
    fn test_round_mantissa_modes() {
        // 0b1_100: halfway, kept LSB 1 -> up
        let r = round_mantissa(RoundingMode::Nearest, 0b1100, false);
        assert_eq!((r.mantissa, r.inexact, r.incremented), (2, true, true));
        // 0b10_100: halfway, kept LSB 0 -> down
        let r = round_mantissa(RoundingMode::Nearest, 0b10100, false);
        assert_eq!(r.mantissa, 2);
        assert!(!r.incremented);

        assert_eq!(round_mantissa(RoundingMode::TowardZero, 0b1111, false).mantissa, 1);
        assert_eq!(round_mantissa(RoundingMode::TowardPositive, 0b1001, false).mantissa, 2);
        assert_eq!(round_mantissa(RoundingMode::TowardPositive, 0b1001, true).mantissa, 1);
        assert_eq!(round_mantissa(RoundingMode::TowardNegative, 0b1001, true).mantissa, 2);

        let exact = round_mantissa(RoundingMode::TowardPositive, 0b1000, false);
        assert!(!exact.inexact);
    }

    #[test]
    fn test_overflow_becomes_infinity() {
        let t = FpTemp { mantissa: 1 << 55, exponent: 0x7FF, sign: true };
        let (bits, flags) = round_fptemp_to_double(t, RoundingMode::Nearest, false);
        assert_eq!(bits, SIGN_BIT | INFINITY);
        assert!(flags.contains(FpscrFlags::OX | FpscrFlags::XX));
    }

    #[test]
    fn test_tiny_inexact_sets_underflow() {
        // 1.5 * 2^-1074 rounds to 2 * 2^-1074 under nearest-even
        let t = FpTemp { mantissa: 0b11 << 54, exponent: 1 - 52, sign: false };
        let (bits, flags) = round_fptemp_to_double(t, RoundingMode::Nearest, false);
        assert_eq!(bits, 2);
        assert!(flags.contains(FpscrFlags::UX | FpscrFlags::FI | FpscrFlags::FR));
    }

    #[test]
    fn test_flush_to_zero() {
        let t = decompose_double(1);
        let (bits, flags) = round_fptemp_to_double(t, RoundingMode::Nearest, true);
        assert_eq!(bits, 0);
        assert!(flags.contains(FpscrFlags::UX));
    }

    #[test]
    fn test_round_to_single() {
        let (bits, flags) =
            round_fptemp_to_single(decompose_double(0.1f64.to_bits()), RoundingMode::Nearest, false);
        assert_eq!(bits, (0.1f32 as f64).to_bits());
        assert!(flags.contains(FpscrFlags::FI | FpscrFlags::XX));

        let (bits, flags) =
            round_fptemp_to_single(decompose_double(1.5f64.to_bits()), RoundingMode::Nearest, false);
        assert_eq!(bits, 1.5f64.to_bits());
        assert!(flags.is_empty());
    }

    #[test]
    fn test_round_to_single_denormal_and_overflow() {
        let tiny = f32::from_bits(3) as f64;
        let (bits, _) =
            round_fptemp_to_single(decompose_double(tiny.to_bits()), RoundingMode::Nearest, false);
        assert_eq!(bits, tiny.to_bits());

        let (bits, flags) =
            round_fptemp_to_single(decompose_double(1e39f64.to_bits()), RoundingMode::Nearest, false);
        assert_eq!(bits, INFINITY);
        assert!(flags.contains(FpscrFlags::OX));
    }

    #[test]
    fn test_single_conversions() {
        for value in [1.0f32, -2.5, f32::MAX, f32::MIN_POSITIVE, 0.0, -0.0, f32::INFINITY] {
            let double = convert_to_double(value.to_bits());
            assert_eq!(double, (value as f64).to_bits());
            assert_eq!(convert_to_single(double), value.to_bits());
        }
        // denormal single loads as a normal double and stores back
        let denormal = 0x0000_0005u32;
        let double = convert_to_double(denormal);
        assert_eq!(f64::from_bits(double), f32::from_bits(denormal) as f64);
        assert_eq!(convert_to_single(double), denormal);
    }

    #[test]
    fn test_force_25_bit() {
        assert_eq!(force_25_bit(0x3FF0_0000_0800_0000), 0x3FF0_0000_1000_0000);
        assert_eq!(force_25_bit(0x3FF0_0000_07FF_FFFF), 0x3FF0_0000_0000_0000);
    }
}
