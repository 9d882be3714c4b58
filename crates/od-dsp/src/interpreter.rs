//! DSP interpreter

use od_core::error::DspError;

use crate::ext_ops::{self, WriteBacklog};
use crate::registers::{
    convert_long_acc, is_carry_add, is_carry_sub, is_over_s32, is_overflow, round_long_acc,
    DspRegisters, SrFlags, StackReg, CR_HALT, REG_ACM0,
};
use crate::tables::{
    has_ext_opcode, AccOperand, DspOpcode, ExtOpcode, MulSource, PostModify, ProductMove, ShiftKind,
};
use crate::thread::{DspThread, DspThreadState};

/// DSP interpreter
#[derive(Debug, Clone, Copy, Default)]
pub struct DspInterpreter;

impl DspInterpreter {
    pub fn new() -> Self {
        Self
    }

    /// Execute one instruction without the loop check
    pub fn step_instruction(&self, thread: &mut DspThread) -> Result<(), DspError> {
        let pc = thread.pc();
        let opc = thread.fetch();
        let op = DspOpcode::decode(opc).ok_or(DspError::UnknownOpcode { pc, opcode: opc })?;
        od_core::dsp_trace!("0x{:04x}: {:04x} {:?}", pc, opc, op);

        if has_ext_opcode(opc) {
            let mut backlog = WriteBacklog::new();
            ext_ops::execute(ExtOpcode::from_instruction(opc), thread, &mut backlog);
            self.execute(thread, op);
            backlog.apply(&mut thread.regs);
        } else {
            self.execute(thread, op);
        }
        Ok(())
    }

    /// Execute one instruction, then close the hardware loop it ends
    pub fn step(&self, thread: &mut DspThread) -> Result<(), DspError> {
        self.step_instruction(thread)?;
        self.check_loop(thread);
        Ok(())
    }

    /// Run [`Self::handle_loop`] when the instruction just executed is a
    /// marked loop end
    pub fn check_loop(&self, thread: &mut DspThread) {
        if thread.is_loop_end(thread.pc().wrapping_sub(1)) {
            self.handle_loop(thread);
        }
    }

    /// Count down the innermost hardware loop if pc just left its last
    /// instruction. Returns true when the loop stacks were touched.
    pub fn handle_loop(&self, thread: &mut DspThread) -> bool {
        let regs = &mut thread.regs;
        let call_address = regs.st[StackReg::Call as usize];
        let loop_address = regs.st[StackReg::LoopAddress as usize];
        let counter = regs.st[StackReg::LoopCounter as usize];

        if loop_address == 0 || counter == 0 || regs.pc.wrapping_sub(1) != loop_address {
            return false;
        }

        let counter = counter - 1;
        regs.st[StackReg::LoopCounter as usize] = counter;
        if counter > 0 {
            regs.pc = call_address;
        } else {
            regs.pop_stack(StackReg::Call);
            regs.pop_stack(StackReg::LoopAddress);
            regs.pop_stack(StackReg::LoopCounter);
        }
        true
    }

    /// Run until `max_instructions` retire or the core halts. Returns the
    /// number of instructions executed.
    pub fn run(&self, thread: &mut DspThread, max_instructions: u64) -> Result<u64, DspError> {
        thread.start();
        let mut executed = 0;
        while thread.is_running() && executed < max_instructions {
            self.step(thread)?;
            executed += 1;
        }
        Ok(executed)
    }

    /// Enter a hardware loop over `[body, end]` or skip it on a zero count
    fn start_loop(&self, thread: &mut DspThread, count: u16, end: u16) {
        let regs = &mut thread.regs;
        if count == 0 {
            regs.pc = end;
            thread.skip_instruction();
            return;
        }
        let body = regs.pc;
        regs.push_stack(StackReg::Call, body);
        regs.push_stack(StackReg::LoopAddress, end);
        regs.push_stack(StackReg::LoopCounter, count);
    }

    fn post_modify(thread: &mut DspThread, ar: u8, post: PostModify) {
        let n = ar as usize;
        let regs = &mut thread.regs;
        regs.ar[n] = match post {
            PostModify::None => return,
            PostModify::Decrement => regs.decrement_ar(n),
            PostModify::Increment => regs.increment_ar(n),
            PostModify::AddIndex => regs.increase_ar(n, regs.ix[n]),
        };
    }

    fn add_to_acc(thread: &mut DspThread, acc: u8, operand: i64) {
        let n = acc as usize;
        let regs = &mut thread.regs;
        let before = regs.long_acc(n);
        regs.set_long_acc(n, before + operand);
        let result = regs.long_acc(n);
        regs.update_sr64(result, is_carry_add(before, result), is_overflow(before, operand, result));
    }

    fn sub_from_acc(thread: &mut DspThread, acc: u8, operand: i64) {
        let n = acc as usize;
        let regs = &mut thread.regs;
        let before = regs.long_acc(n);
        regs.set_long_acc(n, before - operand);
        let result = regs.long_acc(n);
        regs.update_sr64(result, is_carry_sub(before, result), is_overflow(before, -operand, result));
    }

    /// Set the compare bits from `a - b` without storing it
    fn compare(regs: &mut DspRegisters, a: i64, b: i64) {
        let result = convert_long_acc(a - b);
        regs.update_sr64(result, is_carry_sub(a, result), is_overflow(a, -b, result));
    }

    fn acc_operand(regs: &DspRegisters, acc: u8, src: AccOperand) -> i64 {
        match src {
            AccOperand::Reg(reg) => (regs.peek(reg) as i16 as i64) << 16,
            AccOperand::Ax(ax) => regs.long_acx(ax as usize),
            AccOperand::AxLow(ax) => regs.ax[ax as usize].l as i64,
            AccOperand::OtherAcc => regs.long_acc(1 - acc as usize),
            AccOperand::Prod => regs.long_prod(),
            AccOperand::Short(imm) => (imm as i64) << 16,
        }
    }

    /// Store `value` in `$acN` and set the compare bits from what was kept
    fn set_acc_with_flags(regs: &mut DspRegisters, acc: u8, value: i64) {
        let n = acc as usize;
        regs.set_long_acc(n, value);
        let result = regs.long_acc(n);
        regs.update_sr64(result, false, false);
    }

    /// Replace `$acN.m`; the sign and zero bits come from the 16-bit result
    fn set_acm_with_flags(regs: &mut DspRegisters, acc: u8, value: u16) {
        let n = acc as usize;
        regs.ac[n].m = value;
        let over_s32 = is_over_s32(regs.long_acc(n));
        regs.update_sr16(value as i16, false, false, over_s32);
    }

    /// Shift `$acN` left by `amount`, right when negative
    fn shift_acc(regs: &mut DspRegisters, acc: u8, kind: ShiftKind, amount: i32) {
        let value = regs.long_acc(acc as usize);
        let result = if amount > 0 {
            value << amount
        } else if amount < 0 {
            match kind {
                ShiftKind::Logical => ((value as u64 & 0xff_ffff_ffff) >> -amount) as i64,
                ShiftKind::Arithmetic => value >> -amount,
            }
        } else {
            value
        };
        Self::set_acc_with_flags(regs, acc, result);
    }

    /// Signed shift count held in the low seven bits of a register
    fn shift_count(value: u16) -> i32 {
        let low = (value & 0x3f) as i32;
        if low != 0 && value & 0x40 != 0 {
            low - 0x40
        } else {
            low
        }
    }

    /// One pass through the multiplier. In unsigned mode `.l` operands of
    /// the cross forms are taken unsigned; unless MUL_MODIFY is set the
    /// product is doubled.
    fn multiply(regs: &DspRegisters, src: MulSource) -> i64 {
        let ax = &regs.ax;
        let (a, b, a_low, b_low) = match src {
            MulSource::Ax { ax: n } => (ax[n as usize].l, ax[n as usize].h, false, false),
            MulSource::Cross { s, t } => {
                let a = if s == 0 { ax[0].l } else { ax[0].h };
                let b = if t == 0 { ax[1].l } else { ax[1].h };
                (a, b, s == 0, t == 0)
            }
            MulSource::AccAx { acc, ax: n } => (regs.ac[acc as usize].m, ax[n as usize].h, false, false),
            MulSource::Axh0 => (ax[0].h, ax[0].h, false, false),
        };
        let unsigned = regs.is_sr_flag_set(SrFlags::MUL_UNSIGNED);
        let widen = |v: u16, low: bool| if unsigned && low { v as i64 } else { v as i16 as i64 };
        let product = widen(a, a_low) * widen(b, b_low);
        if regs.is_sr_flag_set(SrFlags::MUL_MODIFY) {
            product
        } else {
            product << 1
        }
    }

    /// Execute a decoded main opcode. pc points past the first word.
    pub fn execute(&self, thread: &mut DspThread, op: DspOpcode) {
        match op {
            DspOpcode::Nop | DspOpcode::Nx => {}

            DspOpcode::Dar { ar } => {
                let n = ar as usize;
                thread.regs.ar[n] = thread.regs.decrement_ar(n);
            }
            DspOpcode::Iar { ar } => {
                let n = ar as usize;
                thread.regs.ar[n] = thread.regs.increment_ar(n);
            }
            DspOpcode::Subarn { ar } => {
                let n = ar as usize;
                thread.regs.ar[n] = thread.regs.decrease_ar(n, thread.regs.ix[n]);
            }
            DspOpcode::Addarn { ar, ix } => {
                let n = ar as usize;
                thread.regs.ar[n] = thread.regs.increase_ar(n, thread.regs.ix[ix as usize]);
            }

            DspOpcode::Halt => {
                thread.regs.cr |= CR_HALT;
                thread.regs.pc = thread.regs.pc.wrapping_sub(1);
                thread.state = DspThreadState::Halted;
                od_core::dsp_debug!("halt at 0x{:04x}", thread.pc());
            }

            // Branches
            DspOpcode::Jcc { cond } => {
                let dest = thread.fetch();
                if cond.check(thread.regs.sr) {
                    thread.set_pc(dest);
                }
            }
            DspOpcode::Call { cond } => {
                let dest = thread.fetch();
                if cond.check(thread.regs.sr) {
                    let ret = thread.pc();
                    thread.regs.push_stack(StackReg::Call, ret);
                    thread.set_pc(dest);
                }
            }
            DspOpcode::Ret { cond } => {
                if cond.check(thread.regs.sr) {
                    let ret = thread.regs.pop_stack(StackReg::Call);
                    thread.set_pc(ret);
                }
            }
            DspOpcode::Rti { cond } => {
                if cond.check(thread.regs.sr) {
                    thread.regs.sr = thread.regs.pop_stack(StackReg::Data);
                    let ret = thread.regs.pop_stack(StackReg::Call);
                    thread.set_pc(ret);
                }
            }
            DspOpcode::If { cond } => {
                if !cond.check(thread.regs.sr) {
                    thread.skip_instruction();
                }
            }
            DspOpcode::Jmpr { cond, reg } => {
                if cond.check(thread.regs.sr) {
                    let dest = thread.regs.read(reg);
                    thread.set_pc(dest);
                }
            }
            DspOpcode::Callr { cond, reg } => {
                if cond.check(thread.regs.sr) {
                    let dest = thread.regs.read(reg);
                    let ret = thread.pc();
                    thread.regs.push_stack(StackReg::Call, ret);
                    thread.set_pc(dest);
                }
            }

            // Hardware loops
            DspOpcode::Loop { reg } => {
                let count = thread.regs.read(reg);
                let end = thread.pc();
                self.start_loop(thread, count, end);
            }
            DspOpcode::Loopi { count } => {
                let end = thread.pc();
                self.start_loop(thread, count, end);
            }
            DspOpcode::Bloop { reg } => {
                let count = thread.regs.read(reg);
                let end = thread.fetch();
                self.start_loop(thread, count, end);
            }
            DspOpcode::Bloopi { count } => {
                let end = thread.fetch();
                self.start_loop(thread, count, end);
            }

            // Status bits
            DspOpcode::Sbclr { bit } => thread.regs.sr &= !(1 << (bit + 6)),
            DspOpcode::Sbset { bit } => thread.regs.sr |= 1 << (bit + 6),
            DspOpcode::M2 => thread.regs.set_sr_flag(SrFlags::MUL_MODIFY, false),
            DspOpcode::M0 => thread.regs.set_sr_flag(SrFlags::MUL_MODIFY, true),
            DspOpcode::Clr15 => thread.regs.set_sr_flag(SrFlags::MUL_UNSIGNED, false),
            DspOpcode::Set15 => thread.regs.set_sr_flag(SrFlags::MUL_UNSIGNED, true),
            DspOpcode::Set16 => thread.regs.set_sr_flag(SrFlags::SXM, true),
            DspOpcode::Set40 => thread.regs.set_sr_flag(SrFlags::SXM, false),

            // Moves
            DspOpcode::Lri { reg } => {
                let imm = thread.fetch();
                thread.regs.write(reg, imm);
                thread.regs.conditional_extend_accum(reg);
            }
            DspOpcode::Lris { reg, imm } => {
                thread.regs.write(reg, imm);
                thread.regs.conditional_extend_accum(reg);
            }
            DspOpcode::Lr { reg } => {
                let addr = thread.fetch();
                let value = thread.read_dmem(addr);
                thread.regs.write(reg, value);
                thread.regs.conditional_extend_accum(reg);
            }
            DspOpcode::Sr { reg } => {
                let addr = thread.fetch();
                let value = thread.regs.read(reg);
                thread.write_dmem(addr, value);
            }
            DspOpcode::Si { addr } => {
                let imm = thread.fetch();
                thread.write_dmem(addr, imm);
            }
            DspOpcode::Mrr { dst, src } => {
                let value = thread.regs.read(src);
                thread.regs.write(dst, value);
                thread.regs.conditional_extend_accum(dst);
            }
            DspOpcode::Lrr { dst, ar, post } => {
                let value = thread.read_dmem(thread.regs.ar[ar as usize]);
                thread.regs.write(dst, value);
                thread.regs.conditional_extend_accum(dst);
                Self::post_modify(thread, ar, post);
            }
            DspOpcode::Srr { ar, src, post } => {
                let value = thread.regs.read(src);
                thread.write_dmem(thread.regs.ar[ar as usize], value);
                Self::post_modify(thread, ar, post);
            }

            DspOpcode::Lrs { reg, addr } => {
                let value = thread.read_dmem((thread.regs.cr << 8) | addr as u16);
                thread.regs.write(reg, value);
                thread.regs.conditional_extend_accum(reg);
            }
            DspOpcode::Srs { reg, addr } => {
                let value = thread.regs.read(reg);
                thread.write_dmem((thread.regs.cr << 8) | addr as u16, value);
            }
            DspOpcode::Ilrr { acc, ar, post } => {
                let reg = REG_ACM0 + acc;
                let value = thread.read_imem(thread.regs.ar[ar as usize]);
                thread.regs.write(reg, value);
                thread.regs.conditional_extend_accum(reg);
                Self::post_modify(thread, ar, post);
            }

            // Accumulator arithmetic
            DspOpcode::Clr { acc } => {
                thread.regs.set_long_acc(acc as usize, 0);
                thread.regs.update_sr64(0, false, false);
            }
            DspOpcode::Clrl { acc } => {
                let value = round_long_acc(thread.regs.long_acc(acc as usize));
                Self::set_acc_with_flags(&mut thread.regs, acc, value);
            }
            DspOpcode::Cmp => {
                let (acc0, acc1) = (thread.regs.long_acc(0), thread.regs.long_acc(1));
                Self::compare(&mut thread.regs, acc0, acc1);
            }
            DspOpcode::Cmpar { acc, ax } => {
                let value = thread.regs.long_acc(acc as usize);
                let operand = (thread.regs.ax[ax as usize].h as i16 as i64) << 16;
                Self::compare(&mut thread.regs, value, operand);
            }
            DspOpcode::Cmpi { acc } => {
                let operand = (thread.fetch() as i16 as i64) << 16;
                let value = thread.regs.long_acc(acc as usize);
                Self::compare(&mut thread.regs, value, operand);
            }
            DspOpcode::Cmpis { acc, imm } => {
                let value = thread.regs.long_acc(acc as usize);
                Self::compare(&mut thread.regs, value, (imm as i64) << 16);
            }
            DspOpcode::Tst { acc } => {
                let value = thread.regs.long_acc(acc as usize);
                thread.regs.update_sr64(value, false, false);
            }
            DspOpcode::Tstaxh { ax } => {
                let value = thread.regs.ax[ax as usize].h as i16;
                thread.regs.update_sr16(value, false, false, false);
            }
            DspOpcode::Tstprod => {
                let value = thread.regs.long_prod();
                thread.regs.update_sr64(value, false, false);
            }
            DspOpcode::Inc { acc } => Self::add_to_acc(thread, acc, 1),
            DspOpcode::Incm { acc } => Self::add_to_acc(thread, acc, 0x10000),
            DspOpcode::Dec { acc } => Self::sub_from_acc(thread, acc, 1),
            DspOpcode::Decm { acc } => Self::sub_from_acc(thread, acc, 0x10000),
            DspOpcode::Add { acc, src } => {
                let operand = Self::acc_operand(&thread.regs, acc, src);
                Self::add_to_acc(thread, acc, operand);
            }
            DspOpcode::Sub { acc, src } => {
                let operand = Self::acc_operand(&thread.regs, acc, src);
                Self::sub_from_acc(thread, acc, operand);
            }
            DspOpcode::Addi { acc } => {
                let operand = (thread.fetch() as i16 as i64) << 16;
                Self::add_to_acc(thread, acc, operand);
            }
            DspOpcode::Neg { acc } => {
                let value = thread.regs.long_acc(acc as usize);
                Self::set_acc_with_flags(&mut thread.regs, acc, -value);
            }
            DspOpcode::Abs { acc } => {
                let value = thread.regs.long_acc(acc as usize);
                Self::set_acc_with_flags(&mut thread.regs, acc, value.abs());
            }

            // Logic on the middle word
            DspOpcode::LogicImm { op, acc } => {
                let imm = thread.fetch();
                let value = op.apply(thread.regs.ac[acc as usize].m, imm);
                Self::set_acm_with_flags(&mut thread.regs, acc, value);
            }
            DspOpcode::LogicAx { op, acc, ax } => {
                let regs = &mut thread.regs;
                let value = op.apply(regs.ac[acc as usize].m, regs.ax[ax as usize].h);
                Self::set_acm_with_flags(regs, acc, value);
            }
            DspOpcode::LogicAcc { op, acc } => {
                let regs = &mut thread.regs;
                let value = op.apply(regs.ac[acc as usize].m, regs.ac[1 - acc as usize].m);
                Self::set_acm_with_flags(regs, acc, value);
            }
            DspOpcode::Not { acc } => {
                let value = !thread.regs.ac[acc as usize].m;
                Self::set_acm_with_flags(&mut thread.regs, acc, value);
            }
            DspOpcode::Andf { acc } => {
                let imm = thread.fetch();
                let zero = thread.regs.ac[acc as usize].m & imm == 0;
                thread.regs.set_sr_flag(SrFlags::LOGIC_ZERO, zero);
            }
            DspOpcode::Andcf { acc } => {
                let imm = thread.fetch();
                let all = thread.regs.ac[acc as usize].m & imm == imm;
                thread.regs.set_sr_flag(SrFlags::LOGIC_ZERO, all);
            }

            // Shifts
            DspOpcode::Shift { acc, kind, amount } => {
                Self::shift_acc(&mut thread.regs, acc, kind, amount as i32);
            }
            DspOpcode::ShiftN { kind } => {
                let count = Self::shift_count(thread.regs.ac[1].m);
                Self::shift_acc(&mut thread.regs, 0, kind, -count);
            }
            DspOpcode::ShiftByAx { acc, ax, kind } => {
                let count = Self::shift_count(thread.regs.ax[ax as usize].h);
                Self::shift_acc(&mut thread.regs, acc, kind, count);
            }
            DspOpcode::ShiftByAcc { acc, kind } => {
                let count = Self::shift_count(thread.regs.ac[1 - acc as usize].m);
                Self::shift_acc(&mut thread.regs, acc, kind, count);
            }

            // Accumulator moves
            DspOpcode::Movr { acc, src } => {
                let value = (thread.regs.peek(src) as i16 as i64) << 16;
                Self::set_acc_with_flags(&mut thread.regs, acc, value);
            }
            DspOpcode::Movax { acc, ax } => {
                let value = thread.regs.long_acx(ax as usize);
                Self::set_acc_with_flags(&mut thread.regs, acc, value);
            }
            DspOpcode::Mov { acc } => {
                let value = thread.regs.long_acc(1 - acc as usize);
                Self::set_acc_with_flags(&mut thread.regs, acc, value);
            }
            DspOpcode::Movp { acc } => {
                let value = thread.regs.long_prod();
                Self::set_acc_with_flags(&mut thread.regs, acc, value);
            }
            DspOpcode::Movnp { acc } => {
                let value = -thread.regs.long_prod();
                Self::set_acc_with_flags(&mut thread.regs, acc, value);
            }
            DspOpcode::Movpz { acc } => {
                let value = thread.regs.long_prod_rounded();
                Self::set_acc_with_flags(&mut thread.regs, acc, value);
            }
            DspOpcode::Addpaxz { acc, ax } => {
                let regs = &mut thread.regs;
                let before = regs.long_prod();
                let value = regs.long_prod_rounded() + (regs.long_acx(ax as usize) & !0xffff);
                regs.set_long_acc(acc as usize, value);
                let result = regs.long_acc(acc as usize);
                regs.update_sr64(result, is_carry_add(before, result), false);
            }

            // Multiplier
            DspOpcode::Clrp => {
                thread.regs.prod.l = 0x0000;
                thread.regs.prod.m = 0xfff0;
                thread.regs.prod.h = 0x00ff;
                thread.regs.prod.m2 = 0x0010;
            }
            DspOpcode::Mul { src, prev } => {
                let regs = &mut thread.regs;
                let moved = match prev {
                    ProductMove::Discard => None,
                    ProductMove::Add { acc } => Some((acc, regs.long_acc(acc as usize) + regs.long_prod())),
                    ProductMove::Move { acc } => Some((acc, regs.long_prod())),
                    ProductMove::MoveRounded { acc } => Some((acc, regs.long_prod_rounded())),
                };
                let product = Self::multiply(regs, src);
                regs.set_long_prod(product);
                if let Some((acc, value)) = moved {
                    Self::set_acc_with_flags(regs, acc, value);
                }
            }
            DspOpcode::Madd { src } => {
                let regs = &mut thread.regs;
                let product = regs.long_prod() + Self::multiply(regs, src);
                regs.set_long_prod(product);
            }
            DspOpcode::Msub { src } => {
                let regs = &mut thread.regs;
                let product = regs.long_prod() - Self::multiply(regs, src);
                regs.set_long_prod(product);
            }
        }
    }
}
