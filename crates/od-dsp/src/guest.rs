//! Helper calls from compiled DSP blocks back into the core

use od_core::error::JitError;
use od_emitter::{Flow, GuestHandler, Machine, Reg};

use crate::interpreter::DspInterpreter;
use crate::registers::StackReg;
use crate::thread::DspThread;

/// Index of a block in the recompiler's arena
pub type BlockId = usize;

/// Set in a block's exit value when it hands over to a linked block. The
/// low bits then hold the [`BlockId`] to run next; without it the exit
/// value is the number of instructions the block covered.
pub const LINK_BIT: u64 = 1 << 63;

/// Compiled block a link site may enter directly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTarget {
    pub id: BlockId,
    /// Instructions in the target block
    pub size: u16,
}

/// Guest payload of [`od_emitter::Op::Guest`] for DSP blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DspGuestOp {
    /// Run the instruction at `pc` through the interpreter
    Interpret { pc: u16 },
    /// Load `$sr` into a host register
    LoadSr { dst: Reg },
    /// Read a DSP register the way a move does
    ReadReg { dst: Reg, reg: u8 },
    SetPc { pc: u16 },
    PushStack { stack: StackReg, value: u16 },
    /// Enter a hardware loop with the count held in `count`
    PushLoop { body: u16, end: u16, count: Reg },
    /// `ret`, or `rti` when `interrupt` is set
    Return { interrupt: bool },
    /// Jump to the address in a register, pushing `link` first for `callr`
    JumpReg { reg: u8, link: Option<u16> },
    /// Close the innermost hardware loop if pc just left its last instruction
    HandleLoop,
    /// Enter `target` directly when the cycle budget allows. Unlinked sites
    /// carry `None` until the destination block is compiled.
    BlockLink {
        dest: u16,
        cost: u16,
        target: Option<LinkTarget>,
    },
}

/// State a compiled block runs against
pub struct DspGuestContext<'a> {
    pub thread: &'a mut DspThread,
    pub interpreter: &'a DspInterpreter,
    pub cycles_left: &'a mut u64,
}

impl GuestHandler<DspGuestOp> for DspGuestContext<'_> {
    type Error = JitError;

    fn guest_op(&mut self, op: &DspGuestOp, m: &mut Machine) -> Result<Flow, JitError> {
        match *op {
            DspGuestOp::Interpret { pc } => {
                self.thread.set_pc(pc);
                self.interpreter.step_instruction(self.thread)?;
            }
            DspGuestOp::LoadSr { dst } => m.set_reg(dst, self.thread.regs.sr as u64),
            DspGuestOp::ReadReg { dst, reg } => {
                let value = self.thread.regs.read(reg);
                m.set_reg(dst, value as u64);
            }
            DspGuestOp::SetPc { pc } => self.thread.set_pc(pc),
            DspGuestOp::PushStack { stack, value } => self.thread.regs.push_stack(stack, value),
            DspGuestOp::PushLoop { body, end, count } => {
                let regs = &mut self.thread.regs;
                regs.push_stack(StackReg::Call, body);
                regs.push_stack(StackReg::LoopAddress, end);
                regs.push_stack(StackReg::LoopCounter, m.reg(count) as u16);
            }
            DspGuestOp::Return { interrupt } => {
                let regs = &mut self.thread.regs;
                if interrupt {
                    regs.sr = regs.pop_stack(StackReg::Data);
                }
                regs.pc = regs.pop_stack(StackReg::Call);
            }
            DspGuestOp::JumpReg { reg, link } => {
                let regs = &mut self.thread.regs;
                let dest = regs.read(reg);
                if let Some(ret) = link {
                    regs.push_stack(StackReg::Call, ret);
                }
                regs.pc = dest;
            }
            DspGuestOp::HandleLoop => self.interpreter.check_loop(self.thread),
            DspGuestOp::BlockLink { dest, cost, target } => {
                if let Some(target) = target {
                    let needed = cost as u64 + target.size as u64;
                    if *self.cycles_left > needed {
                        *self.cycles_left -= cost as u64;
                        self.thread.set_pc(dest);
                        return Ok(Flow::Exit(LINK_BIT | target.id as u64));
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }
}
