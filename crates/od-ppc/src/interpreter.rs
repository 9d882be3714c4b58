//! Gekko interpreter

use std::sync::Arc;

use od_core::error::PpcError;
use od_memory::MemoryManager;

use crate::decoder::{InstructionForm, PpcDecoder};
use crate::instructions::float::SignOp;
use crate::instructions::{branch, float, integer, load_store, paired, system};
use crate::thread::{PpcThread, PpcThreadState};

/// Gekko interpreter for instruction execution
pub struct PpcInterpreter {
    memory: Arc<MemoryManager>,
}

impl PpcInterpreter {
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        Self { memory }
    }

    /// Fetch the instruction word at `pc`
    pub fn fetch(&self, pc: u32) -> Result<u32, PpcError> {
        self.memory
            .read_be32(pc)
            .map_err(|source| PpcError::Fetch { addr: pc, source })
    }

    /// Execute a single instruction
    pub fn step(&self, thread: &mut PpcThread) -> Result<(), PpcError> {
        let opcode = self.fetch(thread.pc())?;
        self.execute(thread, opcode)
    }

    /// Run until `max_instructions` retire, the thread stops, or it spins on a
    /// branch to itself. Returns the number of instructions executed.
    pub fn run(&self, thread: &mut PpcThread, max_instructions: u64) -> Result<u64, PpcError> {
        thread.start();
        let mut executed = 0;
        while thread.is_running() && executed < max_instructions {
            let pc = thread.pc();
            self.step(thread)?;
            executed += 1;
            if thread.pc() == pc {
                od_core::ppc_debug!("halted on branch-to-self at 0x{:08x}", pc);
                thread.state = PpcThreadState::Halted;
            }
        }
        Ok(executed)
    }

    /// Execute one already-fetched instruction at the thread's pc
    pub fn execute(&self, thread: &mut PpcThread, opcode: u32) -> Result<(), PpcError> {
        let decoded = PpcDecoder::decode(opcode);
        od_core::ppc_trace!("0x{:08x}: {:08x} {:?}", thread.pc(), opcode, decoded.form);

        match decoded.form {
            InstructionForm::I => {
                let (li, aa, lk) = PpcDecoder::i_form(opcode);
                branch::b(thread, li, aa, lk);
                return Ok(());
            }
            InstructionForm::B => {
                let (bo, bi, bd, aa, lk) = PpcDecoder::b_form(opcode);
                branch::bc(thread, bo, bi, bd, aa, lk);
                return Ok(());
            }
            InstructionForm::XL if matches!(decoded.xo, 16 | 528) => {
                let (bo, bi, _, _, lk) = PpcDecoder::x_form(opcode);
                if decoded.xo == 16 {
                    branch::bclr(thread, bo, bi, lk);
                } else {
                    branch::bcctr(thread, bo, bi, lk);
                }
                return Ok(());
            }
            InstructionForm::XL => self.execute_xl_form(thread, opcode, decoded.xo),
            InstructionForm::D => self.execute_d_form(thread, opcode, decoded.op)?,
            InstructionForm::X if decoded.op == 31 => self.execute_x31(thread, opcode, decoded.xo)?,
            InstructionForm::X => self.execute_x63(thread, opcode, decoded.xo),
            InstructionForm::XO => {
                let (rt, ra, rb, oe, xo, rc) = PpcDecoder::xo_form(opcode);
                if !integer::arithmetic(thread, xo, rt, ra, rb, oe, rc) {
                    Self::unimplemented(thread, "XO", xo);
                }
            }
            InstructionForm::M => {
                let (rs, ra, rb_sh, mb, me, rc) = PpcDecoder::m_form(opcode);
                integer::rotate(thread, decoded.op, rs, ra, rb_sh, mb, me, rc);
            }
            InstructionForm::A => {
                let (frd, fra, frb, frc, rc) = PpcDecoder::a_form(opcode);
                let single = decoded.op == 59;
                if decoded.xo == 23 && !single {
                    float::fsel(thread, frd, fra, frb, frc, rc);
                } else if !float::arithmetic(thread, decoded.xo, single, frd, fra, frb, frc, rc) {
                    Self::unimplemented(thread, "A", decoded.xo);
                }
            }
            InstructionForm::PsA => {
                let (frd, fra, frb, frc, rc) = PpcDecoder::a_form(opcode);
                if !paired::arithmetic(thread, decoded.xo, frd, fra, frb, frc, rc) {
                    Self::unimplemented(thread, "paired A", decoded.xo);
                }
            }
            InstructionForm::PsX => {
                let (frd, fra, frb, _, rc) = PpcDecoder::x_form(opcode);
                if !paired::execute_x(thread, decoded.xo, frd, fra, frb, rc) {
                    Self::unimplemented(thread, "paired X", decoded.xo);
                }
            }
            InstructionForm::SC => {
                od_core::ppc_debug!("sc at 0x{:08x} ignored", thread.pc());
            }
            InstructionForm::Unknown => {
                return Err(PpcError::InvalidInstruction {
                    addr: thread.pc(),
                    opcode,
                });
            }
        }

        thread.advance_pc();
        Ok(())
    }

    fn unimplemented(thread: &PpcThread, form: &str, xo: u16) {
        tracing::warn!("Unimplemented {}-form xo {} at 0x{:08x}", form, xo, thread.pc());
    }

    fn execute_d_form(&self, thread: &mut PpcThread, opcode: u32, op: u8) -> Result<(), PpcError> {
        let (rt, ra, d) = PpcDecoder::d_form(opcode);
        let uimm = d as u16;

        match op {
            7 => integer::mulli(thread, rt, ra, d),
            10 => integer::cmpli(thread, rt >> 2, ra, uimm),
            11 => integer::cmpi(thread, rt >> 2, ra, d),
            14 => integer::addi(thread, rt, ra, d),
            15 => integer::addis(thread, rt, ra, d),
            24 => integer::ori(thread, rt, ra, uimm),
            25 => integer::oris(thread, rt, ra, uimm),
            26 => integer::xori(thread, rt, ra, uimm),
            28 => integer::andi(thread, rt, ra, uimm),
            32..=55 => {
                if !load_store::execute_d(thread, op, rt, ra, d)? {
                    Self::unimplemented(thread, "D", op as u16);
                }
            }
            _ => Self::unimplemented(thread, "D", op as u16),
        }
        Ok(())
    }

    fn execute_xl_form(&self, thread: &mut PpcThread, opcode: u32, xo: u16) {
        let (bt, ba, bb, _, _) = PpcDecoder::x_form(opcode);
        match xo {
            0 => system::mcrf(thread, bt >> 2, ba >> 2),
            // isync
            150 => {}
            _ => {
                if !system::cr_logical(thread, xo, bt, ba, bb) {
                    Self::unimplemented(thread, "XL", xo);
                }
            }
        }
    }

    fn execute_x31(&self, thread: &mut PpcThread, opcode: u32, xo: u16) -> Result<(), PpcError> {
        let (rt, ra, rb, _, rc) = PpcDecoder::x_form(opcode);
        match xo {
            0 => integer::cmp(thread, rt >> 2, ra, rb),
            32 => integer::cmpl(thread, rt >> 2, ra, rb),
            19 => system::mfcr(thread, rt),
            144 => system::mtcrf(thread, ((opcode >> 12) & 0xFF) as u8, rt),
            339 => system::mfspr(thread, rt, system::decode_spr(opcode)),
            467 => system::mtspr(thread, rt, system::decode_spr(opcode)),
            // sync, eieio, dcbf, dcbst, icbi
            598 | 854 | 86 | 54 | 982 => {}
            _ => {
                if !integer::logical(thread, xo, rt, ra, rb, rc)
                    && !load_store::execute_x(thread, xo, rt, ra, rb)?
                {
                    Self::unimplemented(thread, "X", xo);
                }
            }
        }
        Ok(())
    }

    /// Opcode 63 X-form: compares, conversions, moves and FPSCR access
    fn execute_x63(&self, thread: &mut PpcThread, opcode: u32, xo: u16) {
        let (frd, fra, frb, _, rc) = PpcDecoder::x_form(opcode);
        match xo {
            0 | 32 => {
                float::fcmp(thread, frd >> 2, fra, frb, xo == 32);
                return;
            }
            12 => float::frsp(thread, frd, frb, rc),
            14 | 15 => float::fctiw(thread, frd, frb, xo == 15, rc),
            40 => float::fsign(thread, SignOp::Neg, frd, frb, rc),
            72 => float::fsign(thread, SignOp::Move, frd, frb, rc),
            136 => float::fsign(thread, SignOp::Nabs, frd, frb, rc),
            264 => float::fsign(thread, SignOp::Abs, frd, frb, rc),
            _ => {
                match xo {
                    38 => system::mtfsb(thread, frd, true),
                    70 => system::mtfsb(thread, frd, false),
                    64 => system::mcrfs(thread, frd >> 2, fra >> 2),
                    134 => system::mtfsfi(thread, frd >> 2, ((opcode >> 12) & 0xF) as u8),
                    583 => system::mffs(thread, frd),
                    711 => system::mtfsf(thread, ((opcode >> 17) & 0xFF) as u8, frb),
                    _ => {
                        Self::unimplemented(thread, "X", xo);
                        return;
                    }
                }
                if rc && xo != 64 {
                    thread.update_cr1();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fpscr::FpscrFlags;

    const BASE: u32 = 0x8000_3100;

    fn create_test_env(program: &[u32]) -> (PpcInterpreter, PpcThread) {
        let memory = MemoryManager::new().unwrap();
        let image: Vec<u8> = program.iter().flat_map(|w| w.to_be_bytes()).collect();
        memory.load_image(BASE, &image).unwrap();
        let interpreter = PpcInterpreter::new(memory.clone());
        let mut thread = PpcThread::new(0, memory);
        thread.set_pc(BASE);
        (interpreter, thread)
    }

    #[test]
    fn test_step_advances_pc() {
        // addi r3, r0, 100
        let (interpreter, mut thread) = create_test_env(&[0x3860_0064]);
        interpreter.step(&mut thread).unwrap();
        assert_eq!(thread.gpr(3), 100);
        assert_eq!(thread.pc(), BASE + 4);
    }

    #[test]
    fn test_run_halts_on_self_branch() {
        // li r3, 1; b .
        let (interpreter, mut thread) = create_test_env(&[0x3860_0001, 0x4800_0000]);
        let executed = interpreter.run(&mut thread, 100).unwrap();
        assert_eq!(executed, 2);
        assert_eq!(thread.state, PpcThreadState::Halted);
        assert_eq!(thread.pc(), BASE + 4);
    }

    #[test]
    fn test_invalid_primary_opcode() {
        let (interpreter, mut thread) = create_test_env(&[0x0000_0000]);
        let err = interpreter.step(&mut thread).unwrap_err();
        assert_eq!(err, PpcError::InvalidInstruction { addr: BASE, opcode: 0 });
    }

    #[test]
    fn test_fetch_outside_ram() {
        let (interpreter, mut thread) = create_test_env(&[]);
        thread.set_pc(0x4000_0000);
        assert!(matches!(interpreter.step(&mut thread), Err(PpcError::Fetch { .. })));
    }

    #[test]
    fn test_fdiv_by_zero_flags() {
        // fdiv f1, f2, f3
        let (interpreter, mut thread) = create_test_env(&[0xFC22_1824]);
        thread.set_fpr(2, 0x3FF0_0000_0000_0000);
        thread.set_fpr(3, 0);
        interpreter.step(&mut thread).unwrap();
        assert_eq!(thread.fpr(1), 0x7FF0_0000_0000_0000);
        assert!(thread.fpscr().contains(FpscrFlags::ZX | FpscrFlags::FX));
        assert_eq!(thread.fpscr().fprf(), 0x05);
    }

    #[test]
    fn test_mtfsfi_sets_rounding() {
        // mtfsfi cr7, 1
        let (interpreter, mut thread) = create_test_env(&[0xFF80_110C]);
        interpreter.step(&mut thread).unwrap();
        assert_eq!(thread.fpscr().bits() & 3, 1);
    }
}
