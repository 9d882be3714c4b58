//! Helper calls from compiled blocks back into the Gekko core

use od_core::error::JitError;
use od_emitter::{Flow, GuestHandler, Machine, Reg, Xmm};
use od_ppc::fp_utils::{self, FpResult};
use od_ppc::instructions::float::FpOp;
use od_ppc::{PpcInterpreter, PpcThread};

/// Soft-float operation embedded in compiled code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftOp {
    Arith(FpOp),
    /// frsp
    RoundToSingle,
    /// fctiw / fctiwz
    ConvertToInteger { toward_zero: bool },
}

/// How a soft-float result is written back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftForm {
    /// Lane 0 only
    Double,
    /// Single result written to both lanes
    Single,
    /// Both lanes computed independently
    Paired,
}

/// Guest payload of [`od_emitter::Op::Guest`] for PowerPC blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpcGuestOp {
    /// Load both paired-single slots of an FPR into an SSE register
    LoadFpr { xmm: Xmm, reg: u8 },
    /// Write an SSE register back to both slots of an FPR
    StoreFpr { reg: u8, xmm: Xmm },
    SoftFloat {
        op: SoftOp,
        form: SoftForm,
        dst: Xmm,
        a: Xmm,
        b: Xmm,
        c: Xmm,
    },
    /// Run one instruction through the interpreter
    Interpret { opcode: u32, pc: u32 },
    /// CR field from the low nibble of a host register
    StoreCrField { field: u8, src: Reg },
    /// FPSCR[FPCC] from the low nibble of a host register
    SetFpcc { src: Reg },
    /// VXSNAN/VXVC for an unordered compare of the two lane-0 values
    CompareNaNFlags { a: Xmm, b: Xmm, ordered: bool },
    /// CR1 from FPSCR, for record forms
    UpdateCr1,
    SetPc { pc: u32 },
}

/// State a compiled block runs against
pub struct PpcGuestContext<'a> {
    pub thread: &'a mut PpcThread,
    pub interpreter: &'a PpcInterpreter,
}

impl PpcGuestContext<'_> {
    fn soft_float(&mut self, op: SoftOp, form: SoftForm, dst: Xmm, a: Xmm, b: Xmm, c: Xmm, m: &mut Machine) {
        let fpscr = self.thread.fpscr();
        let (a, b, c) = (m.lanes(a), m.lanes(b), m.lanes(c));

        match op {
            SoftOp::Arith(arith) => match form {
                SoftForm::Double | SoftForm::Single => {
                    let single = form == SoftForm::Single;
                    let result = arith.evaluate(a[0], b[0], c[0], single, fpscr);
                    if self.thread.commit_fp_flags(&result, result.value) {
                        if single {
                            m.set_lanes(dst, [result.value, result.value]);
                        } else {
                            m.set_lane0(dst, result.value);
                        }
                    }
                }
                SoftForm::Paired => {
                    let ps0 = arith.evaluate(a[0], b[0], c[0], true, fpscr);
                    let ps1 = arith.evaluate(a[1], b[1], c[1], true, fpscr);
                    let merged = FpResult::new(ps0.value, ps0.flags | ps1.flags);
                    if self.thread.commit_fp_flags(&merged, ps0.value) {
                        m.set_lanes(dst, [ps0.value, ps1.value]);
                    }
                }
            },
            SoftOp::RoundToSingle => {
                let result = fp_utils::round_to_single(b[0], fpscr);
                if self.thread.commit_fp_flags(&result, result.value) {
                    m.set_lanes(dst, [result.value, result.value]);
                }
            }
            SoftOp::ConvertToInteger { toward_zero } => {
                let result = fp_utils::convert_to_integer(b[0], toward_zero, fpscr);
                let allowed = !fpscr.suppresses_write(result.flags);
                self.thread.regs.fpscr.apply(result.flags);
                if allowed {
                    m.set_lane0(dst, result.value);
                }
            }
        }
    }
}

impl GuestHandler<PpcGuestOp> for PpcGuestContext<'_> {
    type Error = JitError;

    fn guest_op(&mut self, op: &PpcGuestOp, m: &mut Machine) -> Result<Flow, JitError> {
        match *op {
            PpcGuestOp::LoadFpr { xmm, reg } => {
                let reg = reg as usize;
                m.set_lanes(xmm, [self.thread.ps0(reg), self.thread.ps1(reg)]);
            }
            PpcGuestOp::StoreFpr { reg, xmm } => {
                let [ps0, ps1] = m.lanes(xmm);
                self.thread.set_ps(reg as usize, ps0, ps1);
            }
            PpcGuestOp::SoftFloat { op, form, dst, a, b, c } => {
                self.soft_float(op, form, dst, a, b, c, m);
            }
            PpcGuestOp::Interpret { opcode, pc } => {
                self.thread.set_pc(pc);
                self.interpreter.execute(self.thread, opcode)?;
            }
            PpcGuestOp::StoreCrField { field, src } => {
                self.thread.set_cr_field(field as usize, m.reg(src) as u32);
            }
            PpcGuestOp::SetFpcc { src } => {
                self.thread.regs.fpscr.set_fpcc(m.reg(src) as u32);
            }
            PpcGuestOp::CompareNaNFlags { a, b, ordered } => {
                let result = fp_utils::compare(m.lane0(a), m.lane0(b), ordered, self.thread.fpscr());
                self.thread.regs.fpscr.raise(result.flags);
            }
            PpcGuestOp::UpdateCr1 => self.thread.update_cr1(),
            PpcGuestOp::SetPc { pc } => self.thread.set_pc(pc),
        }
        Ok(Flow::Continue)
    }
}
