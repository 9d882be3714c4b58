//! Scalar floating-point instructions (primary opcodes 59 and 63)
//!
//! Arithmetic goes through the soft-float entry points in [`crate::fp_utils`].
//! Double results write ps0 only; single results are written to both
//! paired-single slots.

use crate::fp_temp::SIGN_BIT;
use crate::fp_utils::{self, is_nan, is_zero, FpResult};
use crate::thread::PpcThread;

/// Which bit manipulation an fsign-class instruction performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOp {
    Neg,
    Abs,
    Nabs,
    Move,
}

impl SignOp {
    #[inline]
    pub fn apply(self, bits: u64) -> u64 {
        match self {
            SignOp::Neg => bits ^ SIGN_BIT,
            SignOp::Abs => bits & !SIGN_BIT,
            SignOp::Nabs => bits | SIGN_BIT,
            SignOp::Move => bits,
        }
    }
}

/// Arithmetic operation selected by the A-form extended opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpOp {
    Add,
    Sub,
    Mul,
    Div,
    /// `a * c + b` with its negated/subtracting variants
    Madd { negate: bool, subtract: bool },
}

impl FpOp {
    /// Decode the 5-bit A-form extended opcode
    pub fn from_xo(xo: u16) -> Option<Self> {
        Some(match xo {
            18 => FpOp::Div,
            20 => FpOp::Sub,
            21 => FpOp::Add,
            25 => FpOp::Mul,
            28 => FpOp::Madd { negate: false, subtract: true },
            29 => FpOp::Madd { negate: false, subtract: false },
            30 => FpOp::Madd { negate: true, subtract: true },
            31 => FpOp::Madd { negate: true, subtract: false },
            _ => return None,
        })
    }

    /// Evaluate on raw operands (frA, frB, frC)
    pub fn evaluate(self, a: u64, b: u64, c: u64, single: bool, fpscr: crate::fpscr::Fpscr) -> FpResult {
        match (self, single) {
            (FpOp::Add, false) => fp_utils::add_double_precision(a, b, fpscr),
            (FpOp::Add, true) => fp_utils::add_single_precision(a, b, fpscr),
            (FpOp::Sub, false) => fp_utils::sub_double_precision(a, b, fpscr),
            (FpOp::Sub, true) => fp_utils::sub_single_precision(a, b, fpscr),
            (FpOp::Mul, false) => fp_utils::multiply_double_precision(a, c, fpscr),
            (FpOp::Mul, true) => fp_utils::multiply_single_precision(a, c, fpscr),
            (FpOp::Div, false) => fp_utils::divide_double_precision(a, b, fpscr),
            (FpOp::Div, true) => fp_utils::divide_single_precision(a, b, fpscr),
            (FpOp::Madd { negate, subtract }, false) => {
                fp_utils::madd_double_precision(a, c, b, negate, subtract, fpscr)
            }
            (FpOp::Madd { negate, subtract }, true) => {
                fp_utils::madd_single_precision(a, c, b, negate, subtract, fpscr)
            }
        }
    }
}

/// `a >= 0.0 ? c : b`, with NaN selecting b
#[inline]
pub fn select(a: u64, b: u64, c: u64) -> u64 {
    if !is_nan(a) && (a & SIGN_BIT == 0 || is_zero(a)) {
        c
    } else {
        b
    }
}

fn finish(thread: &mut PpcThread, rc: bool) {
    if rc {
        thread.update_cr1();
    }
}

/// Run an A-form arithmetic instruction. Returns false when `xo` names an
/// operation that has no soft-float implementation here.
pub fn arithmetic(thread: &mut PpcThread, xo: u16, single: bool, frd: u8, fra: u8, frb: u8, frc: u8, rc: bool) -> bool {
    let Some(op) = FpOp::from_xo(xo) else {
        return false;
    };
    let result = op.evaluate(
        thread.fpr(fra as usize),
        thread.fpr(frb as usize),
        thread.fpr(frc as usize),
        single,
        thread.fpscr(),
    );
    if thread.commit_fp_flags(&result, result.value) {
        if single {
            thread.fill_ps(frd as usize, result.value);
        } else {
            thread.set_fpr(frd as usize, result.value);
        }
    }
    finish(thread, rc);
    true
}

/// fsel
pub fn fsel(thread: &mut PpcThread, frd: u8, fra: u8, frb: u8, frc: u8, rc: bool) {
    let value = select(thread.fpr(fra as usize), thread.fpr(frb as usize), thread.fpr(frc as usize));
    thread.set_fpr(frd as usize, value);
    finish(thread, rc);
}

/// frsp
pub fn frsp(thread: &mut PpcThread, frd: u8, frb: u8, rc: bool) {
    let result = fp_utils::round_to_single(thread.fpr(frb as usize), thread.fpscr());
    if thread.commit_fp_flags(&result, result.value) {
        thread.fill_ps(frd as usize, result.value);
    }
    finish(thread, rc);
}

/// fctiw / fctiwz. FPRF is left unchanged.
pub fn fctiw(thread: &mut PpcThread, frd: u8, frb: u8, round_toward_zero: bool, rc: bool) {
    let fpscr = thread.fpscr();
    let result = fp_utils::convert_to_integer(thread.fpr(frb as usize), round_toward_zero, fpscr);
    let allowed = !fpscr.suppresses_write(result.flags);
    thread.regs.fpscr.apply(result.flags);
    if allowed {
        thread.set_fpr(frd as usize, result.value);
    }
    finish(thread, rc);
}

/// fcmpu / fcmpo into CR field `crfd`
pub fn compare_into(thread: &mut PpcThread, crfd: u8, a: u64, b: u64, ordered: bool) {
    let result = fp_utils::compare(a, b, ordered, thread.fpscr());
    thread.regs.fpscr.raise(result.flags);
    thread.regs.fpscr.set_fpcc(result.fpcc);
    thread.set_cr_field(crfd as usize, result.fpcc);
}

pub fn fcmp(thread: &mut PpcThread, crfd: u8, fra: u8, frb: u8, ordered: bool) {
    let a = thread.fpr(fra as usize);
    let b = thread.fpr(frb as usize);
    compare_into(thread, crfd, a, b, ordered);
}

/// fneg / fabs / fnabs / fmr: ps0 only, no FPSCR change
pub fn fsign(thread: &mut PpcThread, op: SignOp, frd: u8, frb: u8, rc: bool) {
    let value = op.apply(thread.fpr(frb as usize));
    thread.set_fpr(frd as usize, value);
    finish(thread, rc);
}
