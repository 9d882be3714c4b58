//! Special-value handling and floating-point entry points
//!
//! Every entry point takes raw double bit patterns plus the current FPSCR
//! and returns the result together with the FPSCR bits the operation
//! raised. The caller merges them with [`Fpscr::apply`] and decides
//! whether the register write happens ([`Fpscr::suppresses_write`]).

use crate::fp_temp::*;
use crate::fpscr::{Fpscr, FpscrFlags, RoundingMode};
use crate::soft_float::{add_core, div_core, madd_fptemp, mul_rounded};

/// Result of one floating-point operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpResult {
    pub value: u64,
    pub flags: FpscrFlags,
}

impl FpResult {
    pub const fn new(value: u64, flags: FpscrFlags) -> Self {
        Self { value, flags }
    }

    pub const fn exact(value: u64) -> Self {
        Self { value, flags: FpscrFlags::empty() }
    }
}

/// Result of fcmpu/fcmpo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareResult {
    /// FL FG FE FU nibble for CR and FPSCR[FPCC]
    pub fpcc: u32,
    pub flags: FpscrFlags,
}

pub const FPCC_LT: u32 = 0b1000;
pub const FPCC_GT: u32 = 0b0100;
pub const FPCC_EQ: u32 = 0b0010;
pub const FPCC_UN: u32 = 0b0001;

#[inline]
pub fn is_nan(bits: u64) -> bool {
    bits & EXP_MASK == EXP_MASK && bits & FRAC_MASK != 0
}

#[inline]
pub fn is_snan(bits: u64) -> bool {
    is_nan(bits) && bits & QUIET_BIT == 0
}

#[inline]
pub fn is_inf(bits: u64) -> bool {
    bits & !SIGN_BIT == INFINITY
}

#[inline]
pub fn is_zero(bits: u64) -> bool {
    bits & !SIGN_BIT == 0
}

#[inline]
pub fn is_denormal(bits: u64) -> bool {
    bits & EXP_MASK == 0 && bits & FRAC_MASK != 0
}

#[inline]
fn sign_of(bits: u64) -> bool {
    bits & SIGN_BIT != 0
}

/// FPRF class code of a double
pub fn classify_double(bits: u64) -> u32 {
    let neg = sign_of(bits);
    if is_nan(bits) {
        0x11
    } else if is_inf(bits) {
        if neg { 0x09 } else { 0x05 }
    } else if is_zero(bits) {
        if neg { 0x12 } else { 0x02 }
    } else if is_denormal(bits) {
        if neg { 0x18 } else { 0x14 }
    } else if neg {
        0x08
    } else {
        0x04
    }
}

/// Denormal inputs read as signed zero in non-IEEE mode
#[inline]
fn flush_input(bits: u64, fpscr: Fpscr) -> u64 {
    if fpscr.non_ieee() && is_denormal(bits) {
        bits & SIGN_BIT
    } else {
        bits
    }
}

/// First NaN in priority order, quieted, with VXSNAN if any input signals
fn propagate_nan(inputs: &[u64]) -> Option<FpResult> {
    let first = inputs.iter().copied().find(|&bits| is_nan(bits))?;
    let mut flags = FpscrFlags::empty();
    if inputs.iter().any(|&bits| is_snan(bits)) {
        flags |= FpscrFlags::VXSNAN;
    }
    Some(FpResult::new(first | QUIET_BIT, flags))
}

fn invalid(cause: FpscrFlags) -> FpResult {
    FpResult::new(DEFAULT_QNAN, cause)
}

/// Keep only the payload bits a single can hold
fn single_nan(result: FpResult) -> FpResult {
    if is_nan(result.value) {
        FpResult::new(result.value & 0xFFFF_FFFF_E000_0000, result.flags)
    } else {
        result
    }
}

fn round(value: FpTemp, fpscr: Fpscr, single: bool) -> FpResult {
    let (value, flags) = if single {
        round_fptemp_to_single(value, fpscr.rounding_mode(), fpscr.non_ieee())
    } else {
        round_fptemp_to_double(value, fpscr.rounding_mode(), fpscr.non_ieee())
    };
    FpResult::new(value, flags)
}

fn add(a: u64, b: u64, subtract: bool, fpscr: Fpscr, single: bool) -> FpResult {
    let a = flush_input(a, fpscr);
    let b = flush_input(b, fpscr);
    if let Some(nan) = propagate_nan(&[a, b]) {
        return nan;
    }
    let b = if subtract { b ^ SIGN_BIT } else { b };

    if is_inf(a) || is_inf(b) {
        if is_inf(a) && is_inf(b) && sign_of(a) != sign_of(b) {
            return invalid(FpscrFlags::VXISI);
        }
        return FpResult::exact(if is_inf(a) { a } else { b });
    }

    let rounding = fpscr.rounding_mode();
    let sum = add_core(decompose_double(a), 0, decompose_double(b), 0, rounding);
    round(sum, fpscr, single)
}

fn multiply(a: u64, c: u64, fpscr: Fpscr, single: bool) -> FpResult {
    let c = if single { force_25_bit(c) } else { c };
    let a = flush_input(a, fpscr);
    let c = flush_input(c, fpscr);
    if let Some(nan) = propagate_nan(&[a, c]) {
        return nan;
    }

    let sign = sign_bits(sign_of(a) != sign_of(c));
    if is_inf(a) || is_inf(c) {
        if is_zero(a) || is_zero(c) {
            return invalid(FpscrFlags::VXIMZ);
        }
        return FpResult::exact(sign | INFINITY);
    }

    round(mul_rounded(decompose_double(a), decompose_double(c)), fpscr, single)
}

fn divide(a: u64, b: u64, fpscr: Fpscr, single: bool) -> FpResult {
    let a = flush_input(a, fpscr);
    let b = flush_input(b, fpscr);
    if let Some(nan) = propagate_nan(&[a, b]) {
        return nan;
    }

    let sign = sign_bits(sign_of(a) != sign_of(b));
    match (is_inf(a), is_inf(b)) {
        (true, true) => return invalid(FpscrFlags::VXIDI),
        (true, false) => return FpResult::exact(sign | INFINITY),
        (false, true) => return FpResult::exact(sign),
        (false, false) => {}
    }
    if is_zero(b) {
        if is_zero(a) {
            return invalid(FpscrFlags::VXZDZ);
        }
        return FpResult::new(sign | INFINITY, FpscrFlags::ZX);
    }

    round(div_core(decompose_double(a), decompose_double(b)), fpscr, single)
}

fn madd(a: u64, c: u64, b: u64, negate: bool, subtract: bool, fpscr: Fpscr, single: bool) -> FpResult {
    let c = if single { force_25_bit(c) } else { c };
    let a = flush_input(a, fpscr);
    let b = flush_input(b, fpscr);
    let c = flush_input(c, fpscr);

    let result = if let Some(nan) = propagate_nan(&[a, b, c]) {
        nan
    } else {
        let b = if subtract { b ^ SIGN_BIT } else { b };
        if is_inf(a) || is_inf(c) {
            if is_zero(a) || is_zero(c) {
                invalid(FpscrFlags::VXIMZ)
            } else {
                let product = sign_bits(sign_of(a) != sign_of(c)) | INFINITY;
                if is_inf(b) && sign_of(b) != sign_of(product) {
                    invalid(FpscrFlags::VXISI)
                } else {
                    FpResult::exact(product)
                }
            }
        } else if is_inf(b) {
            FpResult::exact(b)
        } else {
            let sum = madd_fptemp(
                decompose_double(a),
                decompose_double(c),
                decompose_double(b),
                fpscr.rounding_mode(),
            );
            round(sum, fpscr, single)
        }
    };

    if negate && !is_nan(result.value) {
        FpResult::new(result.value ^ SIGN_BIT, result.flags)
    } else {
        result
    }
}

pub fn add_double_precision(a: u64, b: u64, fpscr: Fpscr) -> FpResult {
    add(a, b, false, fpscr, false)
}

pub fn add_single_precision(a: u64, b: u64, fpscr: Fpscr) -> FpResult {
    single_nan(add(a, b, false, fpscr, true))
}

pub fn sub_double_precision(a: u64, b: u64, fpscr: Fpscr) -> FpResult {
    add(a, b, true, fpscr, false)
}

pub fn sub_single_precision(a: u64, b: u64, fpscr: Fpscr) -> FpResult {
    single_nan(add(a, b, true, fpscr, true))
}

pub fn multiply_double_precision(a: u64, c: u64, fpscr: Fpscr) -> FpResult {
    multiply(a, c, fpscr, false)
}

/// Single multiply; frC is truncated to 25 significant bits first
pub fn multiply_single_precision(a: u64, c: u64, fpscr: Fpscr) -> FpResult {
    single_nan(multiply(a, c, fpscr, true))
}

pub fn divide_double_precision(a: u64, b: u64, fpscr: Fpscr) -> FpResult {
    divide(a, b, fpscr, false)
}

pub fn divide_single_precision(a: u64, b: u64, fpscr: Fpscr) -> FpResult {
    single_nan(divide(a, b, fpscr, true))
}

/// `±(a * c ± b)` with one rounding
pub fn madd_double_precision(
    a: u64,
    c: u64,
    b: u64,
    negate: bool,
    subtract: bool,
    fpscr: Fpscr,
) -> FpResult {
    madd(a, c, b, negate, subtract, fpscr, false)
}

pub fn madd_single_precision(
    a: u64,
    c: u64,
    b: u64,
    negate: bool,
    subtract: bool,
    fpscr: Fpscr,
) -> FpResult {
    single_nan(madd(a, c, b, negate, subtract, fpscr, true))
}

/// frsp
pub fn round_to_single(b: u64, fpscr: Fpscr) -> FpResult {
    let b = flush_input(b, fpscr);
    if let Some(nan) = propagate_nan(&[b]) {
        return single_nan(nan);
    }
    if is_inf(b) || is_zero(b) {
        return FpResult::exact(b);
    }
    round(decompose_double(b), fpscr, true)
}

/// fctiw / fctiwz. The low word holds the integer; the high word is the
/// 0xFFF80000 pattern the hardware leaves behind.
pub fn convert_to_integer(b: u64, round_toward_zero: bool, fpscr: Fpscr) -> FpResult {
    const HIGH: u64 = 0xFFF8_0000_0000_0000;
    // 2147483647.0 and 2147483648.0
    const MAX_POSITIVE: u64 = 0x41DF_FFFF_FFC0_0000;
    const MAX_NEGATIVE: u64 = 0x41E0_0000_0000_0000;

    let b = flush_input(b, fpscr);
    let sign = sign_of(b);

    if is_nan(b) {
        let mut flags = FpscrFlags::VXCVI;
        if is_snan(b) {
            flags |= FpscrFlags::VXSNAN;
        }
        return FpResult::new(HIGH | 0x8000_0000, flags);
    }
    let magnitude = b & !SIGN_BIT;
    if !sign && magnitude > MAX_POSITIVE {
        return FpResult::new(HIGH | 0x7FFF_FFFF, FpscrFlags::VXCVI);
    }
    if sign && magnitude > MAX_NEGATIVE {
        return FpResult::new(HIGH | 0x8000_0000, FpscrFlags::VXCVI);
    }

    let mode = if round_toward_zero {
        RoundingMode::TowardZero
    } else {
        fpscr.rounding_mode()
    };
    let (integer, inexact, incremented) = round_to_integer(b, mode);
    let signed = if sign { -(integer as i64) } else { integer as i64 };
    let word = signed as i32 as u32;

    let mut flags = FpscrFlags::empty();
    if inexact {
        flags |= FpscrFlags::FI | FpscrFlags::XX;
    }
    if incremented {
        flags |= FpscrFlags::FR;
    }

    let mut value = HIGH | word as u64;
    if word == 0 && sign {
        value |= 0x1_0000_0000;
    }
    FpResult::new(value, flags)
}

/// Magnitude of `bits` rounded to an integer under `mode`
fn round_to_integer(bits: u64, mode: RoundingMode) -> (u64, bool, bool) {
    if is_zero(bits) {
        return (0, false, false);
    }
    let sign = sign_of(bits);
    let exponent = ((bits & EXP_MASK) >> 52) as i32;
    let significand = if exponent == 0 {
        bits & FRAC_MASK
    } else {
        (bits & FRAC_MASK) | IMPLICIT_BIT
    };
    let shift = 1075 - exponent.max(1);

    let (integer, above_half, exactly_half, inexact) = if shift <= 0 {
        (significand << (-shift) as u32, false, false, false)
    } else if shift > 63 {
        (0, false, false, true)
    } else {
        let shift = shift as u32;
        let remainder = significand & ((1u64 << shift) - 1);
        let half = 1u64 << (shift - 1);
        (significand >> shift, remainder > half, remainder == half, remainder != 0)
    };

    let round_up = match mode {
        RoundingMode::Nearest => above_half || (exactly_half && integer & 1 != 0),
        RoundingMode::TowardZero => false,
        RoundingMode::TowardPositive => !sign && inexact,
        RoundingMode::TowardNegative => sign && inexact,
    };
    (integer + round_up as u64, inexact, round_up)
}

/// fcmpu / fcmpo
pub fn compare(a: u64, b: u64, ordered: bool, fpscr: Fpscr) -> CompareResult {
    if is_nan(a) || is_nan(b) {
        let mut flags = FpscrFlags::empty();
        let signaling = is_snan(a) || is_snan(b);
        if signaling {
            flags |= FpscrFlags::VXSNAN;
        }
        if ordered && (!signaling || !fpscr.contains(FpscrFlags::VE)) {
            flags |= FpscrFlags::VXVC;
        }
        return CompareResult { fpcc: FPCC_UN, flags };
    }

    let key = |bits: u64| -> i64 {
        let magnitude = (bits & !SIGN_BIT) as i64;
        if sign_of(bits) {
            -magnitude
        } else {
            magnitude
        }
    };
    let fpcc = match key(a).cmp(&key(b)) {
        std::cmp::Ordering::Less => FPCC_LT,
        std::cmp::Ordering::Greater => FPCC_GT,
        std::cmp::Ordering::Equal => FPCC_EQ,
    };
    CompareResult { fpcc, flags: FpscrFlags::empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RN: Fpscr = Fpscr(0);
    const SNAN: u64 = 0x7FF0_0000_0000_0001;

    fn bits(v: f64) -> u64 {
        v.to_bits()
    }

    #[test]
    fn test_add_infinities() {
        let inf = INFINITY;
        let ninf = SIGN_BIT | INFINITY;
        assert_eq!(add_double_precision(inf, ninf, RN), invalid(FpscrFlags::VXISI));
        assert_eq!(add_double_precision(ninf, inf, RN), invalid(FpscrFlags::VXISI));
        assert_eq!(add_double_precision(inf, inf, RN).value, inf);
        assert_eq!(sub_double_precision(inf, inf, RN), invalid(FpscrFlags::VXISI));
        assert_eq!(add_double_precision(bits(1.0), ninf, RN).value, ninf);
    }

    #[test]
    fn test_nan_priority() {
        let qa = 0x7FF8_0000_0000_00AA;
        let qb = 0x7FF8_0000_0000_00BB;
        let qc = 0x7FF8_0000_0000_00CC;
        assert_eq!(add_double_precision(qa, qb, RN).value, qa);
        assert_eq!(add_double_precision(bits(1.0), qb, RN).value, qb);
        assert_eq!(madd_double_precision(bits(1.0), qc, qb, false, false, RN).value, qb);
        assert_eq!(madd_double_precision(qa, qc, qb, true, true, RN).value, qa);
    }

    #[test]
    fn test_signaling_nan_quieted() {
        let r = multiply_double_precision(bits(2.0), SNAN, RN);
        assert_eq!(r.value, SNAN | QUIET_BIT);
        assert_eq!(r.flags, FpscrFlags::VXSNAN);

        // a quiet NaN wins priority but the signaling one still raises
        let r = add_double_precision(DEFAULT_QNAN, SNAN, RN);
        assert_eq!(r.value, DEFAULT_QNAN);
        assert!(r.flags.contains(FpscrFlags::VXSNAN));
    }

    #[test]
    fn test_multiply_specials() {
        for (a, c) in [(INFINITY, 0), (0, INFINITY), (SIGN_BIT, INFINITY | SIGN_BIT)] {
            assert_eq!(multiply_double_precision(a, c, RN), invalid(FpscrFlags::VXIMZ));
        }
        let r = multiply_double_precision(bits(-2.0), INFINITY, RN);
        assert_eq!(r.value, SIGN_BIT | INFINITY);
    }

    #[test]
    fn test_divide_specials() {
        assert_eq!(divide_double_precision(INFINITY, INFINITY, RN), invalid(FpscrFlags::VXIDI));
        assert_eq!(divide_double_precision(0, SIGN_BIT, RN), invalid(FpscrFlags::VXZDZ));
        let r = divide_double_precision(bits(-1.0), 0, RN);
        assert_eq!(r, FpResult::new(SIGN_BIT | INFINITY, FpscrFlags::ZX));
        assert_eq!(divide_double_precision(bits(3.0), SIGN_BIT | INFINITY, RN).value, SIGN_BIT);
        assert_eq!(divide_double_precision(bits(1.0), bits(4.0), RN).value, bits(0.25));
    }

    #[test]
    fn test_madd_specials() {
        let ninf = SIGN_BIT | INFINITY;
        // inf * 1 + -inf
        let r = madd_double_precision(INFINITY, bits(1.0), ninf, false, false, RN);
        assert_eq!(r, invalid(FpscrFlags::VXISI));
        // inf * 1 - inf
        let r = madd_double_precision(INFINITY, bits(1.0), INFINITY, false, true, RN);
        assert_eq!(r, invalid(FpscrFlags::VXISI));
        // inf * 0 + 1
        let r = madd_double_precision(INFINITY, 0, bits(1.0), false, false, RN);
        assert_eq!(r, invalid(FpscrFlags::VXIMZ));
        // 1 * 1 + -inf, negated
        let r = madd_double_precision(bits(1.0), bits(1.0), ninf, true, false, RN);
        assert_eq!(r.value, INFINITY);
    }

    #[test]
    fn test_nmsub_is_negated_msub() {
        for (a, c, b) in [(1.5, 2.25, 0.1), (-3.0, 0.7, 2.0), (1e-200, 1e-200, 0.0), (2.0, 3.0, 6.0)] {
            let msub = madd_double_precision(bits(a), bits(c), bits(b), false, true, RN);
            let nmsub = madd_double_precision(bits(a), bits(c), bits(b), true, true, RN);
            assert_eq!(nmsub.value, msub.value ^ SIGN_BIT);
            assert_eq!(nmsub.flags, msub.flags);
        }
        let nan = madd_double_precision(DEFAULT_QNAN, bits(1.0), bits(1.0), true, true, RN);
        assert_eq!(nan.value, DEFAULT_QNAN);
    }

    #[test]
    fn test_fused_differs_from_separate_rounding() {
        let a = 1.0 + 1.0 / 134_217_728.0;
        let fused = madd_double_precision(bits(a), bits(a), bits(-1.0), false, false, RN);
        assert_eq!(fused.value, bits(a.mul_add(a, -1.0)));
        assert_ne!(fused.value, bits(a * a - 1.0));
    }

    #[test]
    fn test_single_multiply_truncates_frc() {
        let c = 0x3FF0_0000_0800_0000;
        let r = multiply_single_precision(bits(1.0), c, RN);
        let expected = round_to_single(force_25_bit(c), RN).value;
        assert_eq!(r.value, expected);
    }

    #[test]
    fn test_single_add_rounds() {
        let r = add_single_precision(bits(0.1), bits(0.2), RN);
        assert_eq!(r.value, ((0.1f64 + 0.2f64) as f32 as f64).to_bits());
        assert!(r.flags.contains(FpscrFlags::FI));
    }

    #[test]
    fn test_non_ieee_flushes_inputs() {
        let ni = Fpscr(FpscrFlags::NI.bits());
        let r = add_double_precision(1, SIGN_BIT | 1, ni);
        assert_eq!(r.value, 0);
        let r = multiply_double_precision(1, INFINITY, ni);
        assert_eq!(r, invalid(FpscrFlags::VXIMZ));
    }

    #[test]
    fn test_directed_rounding_zero_sign() {
        let rm = Fpscr(3);
        assert_eq!(add_double_precision(bits(1.0), bits(-1.0), rm).value, SIGN_BIT);
        assert_eq!(add_double_precision(bits(1.0), bits(-1.0), RN).value, 0);
    }

    #[test]
    fn test_convert_to_integer() {
        let r = convert_to_integer(bits(2.5), false, RN);
        assert_eq!(r.value, 0xFFF8_0000_0000_0002);
        assert!(r.flags.contains(FpscrFlags::FI));
        assert!(!r.flags.contains(FpscrFlags::FR));

        let r = convert_to_integer(bits(-2.7), true, RN);
        assert_eq!(r.value as u32, (-2i32) as u32);

        let r = convert_to_integer(bits(3.5), false, RN);
        assert_eq!(r.value as u32, 4);
        assert!(r.flags.contains(FpscrFlags::FR));

        let r = convert_to_integer(bits(-0.25), false, RN);
        assert_eq!(r.value, 0xFFF8_0001_0000_0000);

        let r = convert_to_integer(bits(1e10), false, RN);
        assert_eq!(r, FpResult::new(0xFFF8_0000_7FFF_FFFF, FpscrFlags::VXCVI));
        let r = convert_to_integer(bits(-1e10), false, RN);
        assert_eq!(r.value as u32, 0x8000_0000);

        let r = convert_to_integer(SNAN, false, RN);
        assert_eq!(r.value as u32, 0x8000_0000);
        assert_eq!(r.flags, FpscrFlags::VXCVI | FpscrFlags::VXSNAN);

        let r = convert_to_integer(bits(-2147483648.0), false, RN);
        assert_eq!(r, FpResult::exact(0xFFF8_0000_8000_0000));
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare(bits(1.0), bits(2.0), false, RN).fpcc, FPCC_LT);
        assert_eq!(compare(bits(-1.0), bits(-2.0), false, RN).fpcc, FPCC_GT);
        assert_eq!(compare(0, SIGN_BIT, false, RN).fpcc, FPCC_EQ);

        let unordered = compare(DEFAULT_QNAN, bits(1.0), false, RN);
        assert_eq!(unordered, CompareResult { fpcc: FPCC_UN, flags: FpscrFlags::empty() });
        let ordered = compare(DEFAULT_QNAN, bits(1.0), true, RN);
        assert_eq!(ordered.flags, FpscrFlags::VXVC);

        let ve = Fpscr(FpscrFlags::VE.bits());
        assert_eq!(compare(SNAN, 0, true, ve).flags, FpscrFlags::VXSNAN);
        assert_eq!(compare(SNAN, 0, true, RN).flags, FpscrFlags::VXSNAN | FpscrFlags::VXVC);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify_double(DEFAULT_QNAN), 0x11);
        assert_eq!(classify_double(SIGN_BIT | INFINITY), 0x09);
        assert_eq!(classify_double(SIGN_BIT), 0x12);
        assert_eq!(classify_double(1), 0x14);
        assert_eq!(classify_double(bits(1.0)), 0x04);
        assert_eq!(classify_double(bits(-1.0)), 0x08);
    }
}
