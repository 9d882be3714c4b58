//! Floating-point code generation
//!
//! Each compiler either emits host SSE code for an instruction or returns a
//! [`Fallback`] naming why it could not, in which case the block builder
//! flushes the register cache and embeds an interpreter call.
//!
//! With `accurate_fpu` set, everything that can raise an FPSCR flag becomes a
//! soft-float helper call, so compiled code reaches the same values and the
//! same FPSCR as the interpreter. Only the pure bit operations (fneg, fabs,
//! fmr and friends) and comparisons stay native in that mode.

use od_emitter::{Cond, Op, Reg, Xmm};
use od_ppc::fp_utils::{FPCC_EQ, FPCC_GT, FPCC_LT, FPCC_UN};
use od_ppc::instructions::float::{FpOp, SignOp};

use crate::guest::{PpcGuestOp, SoftForm, SoftOp};
use crate::jit::BlockBuilder;
use crate::regcache::{SCRATCH, SCRATCH2};

/// Reason an instruction is handed to the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fallback(pub &'static str);

macro_rules! fallback_if {
    ($cond:expr, $reason:expr) => {
        if $cond {
            return Err(Fallback($reason));
        }
    };
}

pub(crate) use fallback_if;

const SIGN_MASK: u64 = 0x8000_0000_0000_0000;
/// 2147483647.0
const S32_MAX_AS_DOUBLE: u64 = 0x41DF_FFFF_FFC0_0000;
/// Upper word fctiw leaves in the destination
const FCTIW_HIGH: u64 = 0xFFF8_0000_0000_0000;

/// Host register holding the FPCC nibble of a compare
const FPCC_REG: Reg = Reg::RAX;
/// Host register holding the CR nibble of a compare, after any folding
const CR_REG: Reg = Reg::RCX;

/// `cror` folded into a compare: destination and source bits, all inside the
/// compare's CR field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrorFold {
    d: u8,
    a: u8,
    b: u8,
    field: u8,
}

impl CrorFold {
    /// Match `cror crbD, crbA, crbB` with all three bits in `field`
    pub fn detect(opcode: u32, field: u8) -> Option<Self> {
        let op = opcode >> 26;
        let xo = (opcode >> 1) & 0x3FF;
        if op != 19 || xo != 449 {
            return None;
        }
        let d = ((opcode >> 21) & 0x1F) as u8;
        let a = ((opcode >> 16) & 0x1F) as u8;
        let b = ((opcode >> 11) & 0x1F) as u8;
        let in_field = |bit: u8| bit >> 2 == field;
        (in_field(d) && in_field(a) && in_field(b)).then_some(Self { d, a, b, field })
    }

    /// CR nibble after the cror, given the compare's nibble
    pub fn apply(self, nibble: u32) -> u32 {
        let shift = |bit: u8| 3 - (bit - self.field * 4) as u32;
        let bit = |b: u8| (nibble >> shift(b)) & 1;
        let value = bit(self.a) | bit(self.b);
        (nibble & !(1 << shift(self.d))) | (value << shift(self.d))
    }
}

impl BlockBuilder<'_> {
    fn soft_float(&mut self, op: SoftOp, form: SoftForm, d: u8, a: u8, b: u8, c: u8) -> Result<(), Fallback> {
        let xa = self.fpr.bind(&mut self.emit, a)?;
        let xb = self.fpr.bind(&mut self.emit, b)?;
        let xc = self.fpr.bind(&mut self.emit, c)?;
        let xd = self.fpr.bind(&mut self.emit, d)?;
        self.emit.guest(PpcGuestOp::SoftFloat {
            op,
            form,
            dst: xd,
            a: xa,
            b: xb,
            c: xc,
        });
        self.fpr.mark_dirty(d);
        // an enabled exception can leave the old value in place
        self.fpr.set_info(d, false, false);
        Ok(())
    }

    fn record(&mut self, rc: bool) {
        if rc {
            self.emit.guest(PpcGuestOp::UpdateCr1);
        }
    }

    /// Round SCRATCH to single precision and write it to `xd`
    fn finish_single(&mut self, xd: Xmm, packed: bool) {
        if packed {
            self.emit.emit(Op::Cvtpd2ps { dst: SCRATCH, src: SCRATCH });
            self.emit.emit(Op::Cvtps2pd { dst: SCRATCH, src: SCRATCH });
            self.emit.emit(Op::Movapd { dst: xd, src: SCRATCH });
        } else {
            self.emit.emit(Op::Cvtsd2ss { dst: SCRATCH, src: SCRATCH });
            self.emit.emit(Op::Cvtss2sd { dst: SCRATCH, src: SCRATCH });
            self.emit.emit(Op::Movddup { dst: xd, src: SCRATCH });
        }
    }

    /// SCRATCH = a op b (or a op c, or a * c +- b), scalar or packed
    fn emit_arith(&mut self, op: FpOp, packed: bool, xa: Xmm, xb: Xmm, xc: Xmm) {
        match op {
            FpOp::Madd { negate, subtract } => {
                self.emit.emit(Op::Movapd { dst: SCRATCH, src: xb });
                self.emit.emit(match (subtract, packed) {
                    (false, false) => Op::Vfmadd231sd { dst: SCRATCH, a: xa, b: xc },
                    (true, false) => Op::Vfmsub231sd { dst: SCRATCH, a: xa, b: xc },
                    (false, true) => Op::Vfmadd231pd { dst: SCRATCH, a: xa, b: xc },
                    (true, true) => Op::Vfmsub231pd { dst: SCRATCH, a: xa, b: xc },
                });
                if negate {
                    self.emit.load_const_pd(SCRATCH2, SIGN_MASK, Reg::RAX);
                    self.emit.emit(Op::Xorpd { dst: SCRATCH, src: SCRATCH2 });
                }
            }
            _ => {
                self.emit.emit(Op::Movapd { dst: SCRATCH, src: xa });
                self.emit.emit(match (op, packed) {
                    (FpOp::Add, false) => Op::Addsd { dst: SCRATCH, src: xb },
                    (FpOp::Add, true) => Op::Addpd { dst: SCRATCH, src: xb },
                    (FpOp::Sub, false) => Op::Subsd { dst: SCRATCH, src: xb },
                    (FpOp::Sub, true) => Op::Subpd { dst: SCRATCH, src: xb },
                    (FpOp::Mul, false) => Op::Mulsd { dst: SCRATCH, src: xc },
                    (FpOp::Mul, true) => Op::Mulpd { dst: SCRATCH, src: xc },
                    _ => Op::Divsd { dst: SCRATCH, src: xb },
                });
            }
        }
    }

    /// Operands an arithmetic op actually reads
    fn operands(op: FpOp, a: u8, b: u8, c: u8) -> Vec<u8> {
        match op {
            FpOp::Mul => vec![a, c],
            FpOp::Madd { .. } => vec![a, b, c],
            _ => vec![a, b],
        }
    }

    /// fadd, fsub, fmul, fdiv, fmadd family and their single forms
    pub fn fp_arith(&mut self, op: FpOp, single: bool, d: u8, a: u8, b: u8, c: u8, rc: bool) -> Result<(), Fallback> {
        if self.config.accurate_fpu {
            let form = if single { SoftForm::Single } else { SoftForm::Double };
            self.soft_float(SoftOp::Arith(op), form, d, a, b, c)?;
            self.record(rc);
            return Ok(());
        }

        let fused = matches!(op, FpOp::Madd { .. });
        fallback_if!(fused && !self.config.host_has_fma, "fused multiply-add without host FMA");

        let inputs = Self::operands(op, a, b, c);
        // fmuls truncates frC to 25 bits unless it is already a single
        fallback_if!(
            single && !inputs.iter().all(|&r| self.fpr.is_single(r)),
            "single-precision inputs not known single"
        );

        let packed = single
            && op != FpOp::Div
            && !self.config.host_is_atom
            && inputs.iter().all(|&r| self.fpr.is_duplicated(r));

        let xa = self.fpr.bind(&mut self.emit, a)?;
        let xb = self.fpr.bind(&mut self.emit, b)?;
        let xc = self.fpr.bind(&mut self.emit, c)?;
        let xd = self.fpr.bind(&mut self.emit, d)?;
        self.emit_arith(op, packed, xa, xb, xc);

        if single {
            self.finish_single(xd, packed);
            self.fpr.set_info(d, true, true);
        } else {
            self.emit.emit(Op::Movsd { dst: xd, src: SCRATCH });
            self.fpr.set_info(d, false, false);
        }
        self.fpr.mark_dirty(d);
        self.record(rc);
        Ok(())
    }

    /// ps_add, ps_sub, ps_mul, ps_div, ps_madd family
    pub fn ps_arith(&mut self, op: FpOp, d: u8, a: u8, b: u8, c: u8, rc: bool) -> Result<(), Fallback> {
        if self.config.accurate_fpu {
            self.soft_float(SoftOp::Arith(op), SoftForm::Paired, d, a, b, c)?;
            self.record(rc);
            return Ok(());
        }

        let inputs = Self::operands(op, a, b, c);
        fallback_if!(op == FpOp::Div, "paired divide");
        fallback_if!(self.config.host_is_atom, "packed arithmetic on Atom");
        fallback_if!(
            matches!(op, FpOp::Madd { .. }) && !self.config.host_has_fma,
            "fused multiply-add without host FMA"
        );
        fallback_if!(
            !inputs.iter().all(|&r| self.fpr.is_single(r)),
            "paired inputs not known single"
        );
        let duplicated = inputs.iter().all(|&r| self.fpr.is_duplicated(r));

        let xa = self.fpr.bind(&mut self.emit, a)?;
        let xb = self.fpr.bind(&mut self.emit, b)?;
        let xc = self.fpr.bind(&mut self.emit, c)?;
        let xd = self.fpr.bind(&mut self.emit, d)?;
        self.emit_arith(op, true, xa, xb, xc);
        self.finish_single(xd, true);
        self.fpr.set_info(d, true, duplicated);
        self.fpr.mark_dirty(d);
        self.record(rc);
        Ok(())
    }

    /// fneg, fabs, fnabs, fmr and the ps_ forms
    pub fn fsign(&mut self, op: SignOp, paired: bool, d: u8, b: u8, rc: bool) -> Result<(), Fallback> {
        let xb = self.fpr.bind(&mut self.emit, b)?;
        let xd = self.fpr.bind(&mut self.emit, d)?;

        let src = if op == SignOp::Move {
            xb
        } else {
            self.emit.load_const_pd(SCRATCH, SIGN_MASK, Reg::RAX);
            self.emit.emit(match op {
                SignOp::Neg => Op::Xorpd { dst: SCRATCH, src: xb },
                SignOp::Abs => Op::Andnpd { dst: SCRATCH, src: xb },
                _ => Op::Orpd { dst: SCRATCH, src: xb },
            });
            SCRATCH
        };

        if paired {
            self.emit.emit(Op::Movapd { dst: xd, src });
            let (single, duplicated) = (self.fpr.is_single(b), self.fpr.is_duplicated(b));
            self.fpr.set_info(d, single, duplicated);
        } else {
            self.emit.emit(Op::Movsd { dst: xd, src });
            let single = self.fpr.is_single(b) && self.fpr.is_single(d);
            let duplicated = d == b && op == SignOp::Move && self.fpr.is_duplicated(d);
            self.fpr.set_info(d, single, duplicated);
        }
        self.fpr.mark_dirty(d);
        self.record(rc);
        Ok(())
    }

    /// frsp
    pub fn frspx(&mut self, d: u8, b: u8, rc: bool) -> Result<(), Fallback> {
        if self.config.accurate_fpu {
            self.soft_float(SoftOp::RoundToSingle, SoftForm::Single, d, b, b, b)?;
            self.record(rc);
            return Ok(());
        }

        let xb = self.fpr.bind(&mut self.emit, b)?;
        let xd = self.fpr.bind(&mut self.emit, d)?;
        if self.fpr.is_single(b) {
            self.emit.emit(Op::Movddup { dst: xd, src: xb });
        } else {
            self.emit.emit(Op::Movapd { dst: SCRATCH, src: xb });
            self.finish_single(xd, false);
        }
        self.fpr.set_info(d, true, true);
        self.fpr.mark_dirty(d);
        self.record(rc);
        Ok(())
    }

    /// fctiw, fctiwz
    ///
    /// SSE returns 0x80000000 for every out-of-range input, PowerPC clamps
    /// positive overflow to 0x7FFFFFFF. minsd against 2^31-1 with the input
    /// as source clamps the positive side and passes NaN through.
    ///
    /// A result of -0 leaves bit 32 clear here. Only the accurate path sets
    /// it, the same split Dolphin's Jit64 makes outside accurate mode.
    pub fn fctiwx(&mut self, d: u8, b: u8, toward_zero: bool, rc: bool) -> Result<(), Fallback> {
        if self.config.accurate_fpu {
            self.soft_float(SoftOp::ConvertToInteger { toward_zero }, SoftForm::Double, d, b, b, b)?;
            self.record(rc);
            return Ok(());
        }

        let xb = self.fpr.bind(&mut self.emit, b)?;
        let xd = self.fpr.bind(&mut self.emit, d)?;
        self.emit.load_const_sd(SCRATCH, S32_MAX_AS_DOUBLE, Reg::RAX);
        self.emit.emit(Op::Minsd { dst: SCRATCH, src: xb });
        self.emit.emit(if toward_zero {
            Op::Cvttsd2si { dst: Reg::RAX, src: SCRATCH }
        } else {
            Op::Cvtsd2si { dst: Reg::RAX, src: SCRATCH }
        });
        self.emit.mov_imm(Reg::RCX, FCTIW_HIGH);
        self.emit.or(Reg::RAX, Reg::RCX);
        self.emit.emit(Op::MovqToXmm { dst: SCRATCH, src: Reg::RAX });
        self.emit.emit(Op::Movsd { dst: xd, src: SCRATCH });
        self.fpr.set_info(d, false, false);
        self.fpr.mark_dirty(d);
        self.record(rc);
        Ok(())
    }

    fn compare_outcome(&mut self, fpcc: u32, fold: Option<CrorFold>) {
        let cr = fold.map_or(fpcc, |f| f.apply(fpcc));
        self.emit.mov_imm(FPCC_REG, fpcc as u64);
        self.emit.mov_imm(CR_REG, cr as u64);
    }

    /// fcmpu, fcmpo, ps_cmpu0/1, ps_cmpo0/1
    ///
    /// `lane1` compares the second slots. Returns true when `next` was a cror
    /// folded into the result, in which case the caller must skip it.
    pub fn float_compare(&mut self, crf: u8, a: u8, b: u8, ordered: bool, lane1: bool, next: Option<u32>) -> Result<bool, Fallback> {
        let fold = next.and_then(|opcode| CrorFold::detect(opcode, crf));
        let mut xa = self.fpr.bind(&mut self.emit, a)?;
        let mut xb = self.fpr.bind(&mut self.emit, b)?;
        if lane1 {
            self.emit.emit(Op::Movapd { dst: SCRATCH, src: xa });
            self.emit.emit(Op::Unpckhpd { dst: SCRATCH, src: xa });
            self.emit.emit(Op::Movapd { dst: SCRATCH2, src: xb });
            self.emit.emit(Op::Unpckhpd { dst: SCRATCH2, src: xb });
            xa = SCRATCH;
            xb = SCRATCH2;
        }

        let done = self.emit.new_label();
        self.emit.emit(Op::Ucomisd { a: xa, b: xb });
        let nan = self.emit.j_cc(Cond::P);
        let less = self.emit.j_cc(Cond::B);
        let greater = self.emit.j_cc(Cond::A);

        self.compare_outcome(FPCC_EQ, fold);
        self.emit.jmp_to(done);
        self.emit.set_jump_target(less);
        self.compare_outcome(FPCC_LT, fold);
        self.emit.jmp_to(done);
        self.emit.set_jump_target(greater);
        self.compare_outcome(FPCC_GT, fold);
        self.emit.jmp_to(done);

        self.emit.switch_to_far_code();
        self.emit.set_jump_target(nan);
        self.compare_outcome(FPCC_UN, fold);
        self.emit.guest(PpcGuestOp::CompareNaNFlags { a: xa, b: xb, ordered });
        self.emit.jmp_to(done);
        self.emit.switch_to_near_code();

        self.emit.bind(done);
        self.emit.guest(PpcGuestOp::SetFpcc { src: FPCC_REG });
        self.emit.guest(PpcGuestOp::StoreCrField { field: crf, src: CR_REG });
        Ok(fold.is_some())
    }
}
