//! Gekko block recompiler
//!
//! Blocks run from their entry address to the first branch, or to the
//! instruction cap. Floating-point instructions go through [`crate::fp`];
//! everything else is embedded as an interpreter call, so a block always
//! makes the same architectural changes as interpreting it.

use std::collections::HashMap;
use std::sync::Arc;

use od_core::config::CpuConfig;
use od_core::error::JitError;
use od_core::{jit_debug, jit_trace};
use od_emitter::{Code, Emitter, Machine, Op};
use od_memory::MemoryManager;
use od_ppc::decoder::{DecodedInstruction, InstructionForm, PpcDecoder};
use od_ppc::instructions::float::{FpOp, SignOp};
use od_ppc::{PpcInterpreter, PpcThread, PpcThreadState};

use crate::fp::{fallback_if, Fallback};
use crate::guest::{PpcGuestContext, PpcGuestOp};
use crate::regcache::FpuRegCache;

/// Instruction cap per block
pub const MAX_BLOCK_INSTRUCTIONS: u32 = 64;

const NOT_FLOATING_POINT: &str = "not a floating-point instruction";

/// A compiled block
pub struct CompiledBlock {
    pub start: u32,
    /// Guest instructions covered, folded ones included
    pub instructions: u32,
    pub ends_in_branch: bool,
    code: Code<PpcGuestOp>,
}

impl CompiledBlock {
    pub fn code(&self) -> &Code<PpcGuestOp> {
        &self.code
    }

    pub fn end(&self) -> u32 {
        self.start.wrapping_add(self.instructions * 4)
    }

    pub fn last_address(&self) -> u32 {
        self.end().wrapping_sub(4)
    }

    pub fn overlaps(&self, addr: u32, len: u32) -> bool {
        addr < self.end() && self.start < addr.saturating_add(len)
    }

    /// Number of embedded interpreter calls
    pub fn interpreter_calls(&self) -> usize {
        self.code
            .ops()
            .iter()
            .filter(|op| matches!(op, Op::Guest(PpcGuestOp::Interpret { .. })))
            .count()
    }
}

/// Recompiler statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JitStats {
    pub blocks_compiled: u64,
    pub native_instructions: u64,
    pub fallbacks: u64,
}

fn is_branch(decoded: &DecodedInstruction) -> bool {
    match decoded.form {
        InstructionForm::I | InstructionForm::B => true,
        InstructionForm::XL => matches!(decoded.xo, 16 | 528),
        _ => false,
    }
}

/// FPR an interpreted instruction writes, and whether the value it leaves
/// is a single held in both slots
fn fpr_written(opcode: u32) -> Option<(u8, bool)> {
    let rt = ((opcode >> 21) & 0x1F) as u8;
    let xo = (opcode >> 1) & 0x3FF;
    match opcode >> 26 {
        // lfs, lfsu
        48 | 49 => Some((rt, true)),
        4 | 50 | 51 | 59 | 63 => Some((rt, false)),
        // lfsx, lfsux
        31 if matches!(xo, 535 | 567) => Some((rt, true)),
        // lfdx, lfdux
        31 if matches!(xo, 599 | 631) => Some((rt, false)),
        _ => None,
    }
}

/// Code generation state for one block
pub struct BlockBuilder<'a> {
    pub(crate) emit: Emitter<PpcGuestOp>,
    pub(crate) fpr: FpuRegCache,
    pub(crate) config: &'a CpuConfig,
}

impl<'a> BlockBuilder<'a> {
    pub fn new(config: &'a CpuConfig) -> Self {
        Self {
            emit: Emitter::new(),
            fpr: FpuRegCache::new(),
            config,
        }
    }

    /// Embed an interpreter call for the instruction at `pc`
    pub fn interpret(&mut self, pc: u32, opcode: u32) {
        self.fpr.flush(&mut self.emit);
        self.emit.guest(PpcGuestOp::Interpret { opcode, pc });
        if let Some((reg, single)) = fpr_written(opcode) {
            self.fpr.set_info(reg, single, single);
        }
    }

    /// Compile one instruction natively. Returns true when `next` was
    /// consumed as well.
    pub fn compile_instruction(&mut self, opcode: u32, next: Option<u32>) -> Result<bool, Fallback> {
        let decoded = PpcDecoder::decode(opcode);
        let xo = decoded.xo;

        match decoded.form {
            InstructionForm::A => {
                let (d, a, b, c, rc) = PpcDecoder::a_form(opcode);
                fallback_if!(xo == 23, "fsel");
                let op = FpOp::from_xo(xo).ok_or(Fallback("unsupported A-form op"))?;
                self.fp_arith(op, decoded.op == 59, d, a, b, c, rc)?;
            }
            InstructionForm::PsA => {
                let (d, a, b, c, rc) = PpcDecoder::a_form(opcode);
                let op = FpOp::from_xo(xo).ok_or(Fallback("unsupported paired op"))?;
                self.ps_arith(op, d, a, b, c, rc)?;
            }
            InstructionForm::PsX => {
                let (d, a, b, _, rc) = PpcDecoder::x_form(opcode);
                match xo {
                    0 | 32 | 64 | 96 => {
                        return self.float_compare(d >> 2, a, b, matches!(xo, 32 | 96), xo >= 64, next);
                    }
                    40 => self.fsign(SignOp::Neg, true, d, b, rc)?,
                    72 => self.fsign(SignOp::Move, true, d, b, rc)?,
                    136 => self.fsign(SignOp::Nabs, true, d, b, rc)?,
                    264 => self.fsign(SignOp::Abs, true, d, b, rc)?,
                    _ => return Err(Fallback("paired merge")),
                }
            }
            InstructionForm::X if decoded.op == 63 => {
                let (d, a, b, _, rc) = PpcDecoder::x_form(opcode);
                match xo {
                    0 | 32 => return self.float_compare(d >> 2, a, b, xo == 32, false, next),
                    12 => self.frspx(d, b, rc)?,
                    14 | 15 => self.fctiwx(d, b, xo == 15, rc)?,
                    40 => self.fsign(SignOp::Neg, false, d, b, rc)?,
                    72 => self.fsign(SignOp::Move, false, d, b, rc)?,
                    136 => self.fsign(SignOp::Nabs, false, d, b, rc)?,
                    264 => self.fsign(SignOp::Abs, false, d, b, rc)?,
                    _ => return Err(Fallback("FPSCR access")),
                }
            }
            _ => return Err(Fallback(NOT_FLOATING_POINT)),
        }
        Ok(false)
    }

    pub fn finish(self) -> Result<Code<PpcGuestOp>, JitError> {
        self.emit.finish()
    }
}

/// Gekko recompiler with its block cache
pub struct Jit64 {
    config: CpuConfig,
    interpreter: PpcInterpreter,
    blocks: HashMap<u32, CompiledBlock>,
    machine: Machine,
    max_block_instructions: u32,
    stats: JitStats,
}

impl Jit64 {
    pub fn new(memory: Arc<MemoryManager>, config: CpuConfig) -> Self {
        Self {
            config,
            interpreter: PpcInterpreter::new(memory),
            blocks: HashMap::new(),
            machine: Machine::new(),
            max_block_instructions: MAX_BLOCK_INSTRUCTIONS,
            stats: JitStats::default(),
        }
    }

    pub fn with_max_block_instructions(mut self, max: u32) -> Self {
        self.max_block_instructions = max.max(1);
        self
    }

    pub fn config(&self) -> &CpuConfig {
        &self.config
    }

    pub fn stats(&self) -> JitStats {
        self.stats
    }

    pub fn block(&self, addr: u32) -> Option<&CompiledBlock> {
        self.blocks.get(&addr)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Compile the block starting at `pc`, replacing any cached one
    pub fn compile(&mut self, pc: u32) -> Result<&CompiledBlock, JitError> {
        let max = self.max_block_instructions;
        let mut builder = BlockBuilder::new(&self.config);
        let mut addr = pc;
        let mut count = 0;
        let mut ends_in_branch = false;

        while count < max {
            let opcode = match self.interpreter.fetch(addr) {
                Ok(opcode) => opcode,
                Err(err) if count == 0 => return Err(err.into()),
                // stop short and let the next block report the fault
                Err(_) => break,
            };
            let decoded = PpcDecoder::decode(opcode);
            if is_branch(&decoded) {
                builder.interpret(addr, opcode);
                count += 1;
                ends_in_branch = true;
                break;
            }

            let next = if count + 2 <= max {
                self.interpreter.fetch(addr.wrapping_add(4)).ok()
            } else {
                None
            };
            let consumed = match builder.compile_instruction(opcode, next) {
                Ok(folded) => {
                    self.stats.native_instructions += 1;
                    if folded {
                        jit_trace!("folded cror at 0x{:08x} into compare", addr.wrapping_add(4));
                        1
                    } else {
                        0
                    }
                }
                Err(Fallback(reason)) => {
                    if reason == NOT_FLOATING_POINT {
                        jit_trace!("interpreting 0x{:08x} at 0x{:08x}", opcode, addr);
                    } else {
                        jit_debug!("fallback for 0x{:08x} at 0x{:08x}: {}", opcode, addr, reason);
                        self.stats.fallbacks += 1;
                    }
                    builder.interpret(addr, opcode);
                    0
                }
            };
            builder.fpr.unlock_all();
            count += 1 + consumed;
            addr = addr.wrapping_add(4 * (1 + consumed));
        }

        if count == 0 {
            return Err(JitError::EmptyBlock { addr: pc });
        }

        builder.fpr.flush(&mut builder.emit);
        if !ends_in_branch {
            builder.emit.guest(PpcGuestOp::SetPc { pc: addr });
        }
        builder.emit.exit(count as u64);
        let code = builder.finish()?;

        jit_debug!("compiled block 0x{:08x}: {} instructions, {} host ops", pc, count, code.len());
        self.stats.blocks_compiled += 1;
        self.blocks.insert(
            pc,
            CompiledBlock {
                start: pc,
                instructions: count,
                ends_in_branch,
                code,
            },
        );
        self.blocks.get(&pc).ok_or(JitError::MissingBlock { addr: pc })
    }

    /// Run the block at the thread's pc, compiling it first if needed.
    /// Returns the number of guest instructions it covered.
    pub fn run_block(&mut self, thread: &mut PpcThread) -> Result<u64, JitError> {
        let pc = thread.pc();
        if !self.blocks.contains_key(&pc) {
            self.compile(pc)?;
        }
        let block = self.blocks.get(&pc).ok_or(JitError::MissingBlock { addr: pc })?;

        let mut ctx = PpcGuestContext {
            thread: &mut *thread,
            interpreter: &self.interpreter,
        };
        let executed = self.machine.run(&block.code, &mut ctx)?;

        if block.ends_in_branch && thread.pc() == block.last_address() {
            od_core::ppc_debug!("halted on branch-to-self at 0x{:08x}", thread.pc());
            thread.state = PpcThreadState::Halted;
        }
        Ok(executed)
    }

    /// Run blocks until at least `max_instructions` retire, the thread stops,
    /// or it spins on a branch to itself
    pub fn run(&mut self, thread: &mut PpcThread, max_instructions: u64) -> Result<u64, JitError> {
        thread.start();
        let mut executed = 0;
        while thread.is_running() && executed < max_instructions {
            executed += self.run_block(thread)?;
        }
        Ok(executed)
    }

    /// Drop every block overlapping `[addr, addr + len)`
    pub fn invalidate(&mut self, addr: u32, len: u32) {
        let before = self.blocks.len();
        self.blocks.retain(|_, block| !block.overlaps(addr, len));
        let dropped = before - self.blocks.len();
        if dropped > 0 {
            jit_debug!("invalidated {} blocks at 0x{:08x}+{}", dropped, addr, len);
        }
    }

    pub fn clear_cache(&mut self) {
        self.blocks.clear();
    }
}
