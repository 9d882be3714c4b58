//! DSP register file and hardware stacks

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::addressing;

pub const REG_AR0: u8 = 0x00;
pub const REG_AR3: u8 = 0x03;
pub const REG_IX0: u8 = 0x04;
pub const REG_WR0: u8 = 0x08;
pub const REG_ST0: u8 = 0x0c;
pub const REG_ST3: u8 = 0x0f;
pub const REG_ACH0: u8 = 0x10;
pub const REG_ACH1: u8 = 0x11;
pub const REG_CR: u8 = 0x12;
pub const REG_SR: u8 = 0x13;
pub const REG_PRODL: u8 = 0x14;
pub const REG_PRODM: u8 = 0x15;
pub const REG_PRODH: u8 = 0x16;
pub const REG_PRODM2: u8 = 0x17;
pub const REG_AXL0: u8 = 0x18;
pub const REG_AXL1: u8 = 0x19;
pub const REG_AXH0: u8 = 0x1a;
pub const REG_AXH1: u8 = 0x1b;
pub const REG_ACL0: u8 = 0x1c;
pub const REG_ACL1: u8 = 0x1d;
pub const REG_ACM0: u8 = 0x1e;
pub const REG_ACM1: u8 = 0x1f;

/// Control register bit set by `halt`
pub const CR_HALT: u16 = 0x0004;

bitflags! {
    /// Status register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SrFlags: u16 {
        const CARRY           = 0x0001;
        const OVERFLOW        = 0x0002;
        const ARITH_ZERO      = 0x0004;
        const SIGN            = 0x0008;
        /// Result does not fit in 32 bits
        const OVER_S32        = 0x0010;
        /// Bits 31 and 30 of the result are equal
        const TOP2BITS        = 0x0020;
        const LOGIC_ZERO      = 0x0040;
        const OVERFLOW_STICKY = 0x0080;
        const INT_ENABLE      = 0x0200;
        const EXT_INT_ENABLE  = 0x0800;
        /// Product is not doubled
        const MUL_MODIFY      = 0x2000;
        /// Set by `set16`: ACM loads sign-extend and ACM reads saturate
        const SXM             = 0x4000;
        const MUL_UNSIGNED    = 0x8000;

        /// Bits rewritten by every arithmetic result
        const CMP_MASK = 0x003f;
    }
}

/// The four hardware stacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackReg {
    Call = 0,
    Data = 1,
    LoopAddress = 2,
    LoopCounter = 3,
}

impl StackReg {
    pub const ALL: [StackReg; 4] = [
        StackReg::Call,
        StackReg::Data,
        StackReg::LoopAddress,
        StackReg::LoopCounter,
    ];

    /// Entries the hardware keeps below the `$st` register
    pub fn capacity(self) -> usize {
        match self {
            StackReg::Call => 8,
            _ => 4,
        }
    }

    fn from_reg(reg: u8) -> StackReg {
        Self::ALL[(reg & 3) as usize]
    }
}

/// Saved entries of one hardware stack. The top of stack lives in `st[n]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwStack {
    saved: Vec<u16>,
}

impl HwStack {
    pub fn depth(&self) -> usize {
        self.saved.len()
    }
}

/// 40-bit accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accumulator {
    pub l: u16,
    pub m: u16,
    /// Sign-extended from bit 7
    pub h: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxReg {
    pub l: u16,
    pub h: u16,
}

/// Product register, kept as two partial sums
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub l: u16,
    pub m: u16,
    pub h: u16,
    pub m2: u16,
}

/// DSP register state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DspRegisters {
    pub ar: [u16; 4],
    pub ix: [u16; 4],
    /// Wrap registers; 0xffff gives linear addressing
    pub wr: [u16; 4],
    /// Stack tops
    pub st: [u16; 4],
    pub ac: [Accumulator; 2],
    pub ax: [AxReg; 2],
    pub prod: Product,
    pub cr: u16,
    pub sr: u16,
    pub pc: u16,
    pub stacks: [HwStack; 4],
}

impl Default for DspRegisters {
    fn default() -> Self {
        Self {
            ar: [0; 4],
            ix: [0; 4],
            wr: [0xffff; 4],
            st: [0; 4],
            ac: [Accumulator::default(); 2],
            ax: [AxReg::default(); 2],
            prod: Product::default(),
            cr: 0,
            sr: 0,
            pc: 0,
            stacks: Default::default(),
        }
    }
}

#[inline]
fn sign_extend_40(value: i64) -> i64 {
    (value << 24) >> 24
}

impl DspRegisters {
    pub fn sr_flags(&self) -> SrFlags {
        SrFlags::from_bits_retain(self.sr)
    }

    #[inline]
    pub fn is_sr_flag_set(&self, flag: SrFlags) -> bool {
        self.sr & flag.bits() != 0
    }

    #[inline]
    pub fn set_sr_flag(&mut self, flag: SrFlags, on: bool) {
        if on {
            self.sr |= flag.bits();
        } else {
            self.sr &= !flag.bits();
        }
    }

    // Stacks

    /// Push `value`, moving the old top into the saved entries
    pub fn push_stack(&mut self, stack: StackReg, value: u16) {
        let n = stack as usize;
        let saved = &mut self.stacks[n].saved;
        if saved.len() == stack.capacity() {
            tracing::warn!(target: "dsp", "{:?} stack overflow, dropping oldest entry", stack);
            saved.remove(0);
        }
        saved.push(self.st[n]);
        self.st[n] = value;
    }

    /// Pop the top of stack, returning it
    pub fn pop_stack(&mut self, stack: StackReg) -> u16 {
        let n = stack as usize;
        let value = self.st[n];
        match self.stacks[n].saved.pop() {
            Some(below) => self.st[n] = below,
            None => tracing::warn!(target: "dsp", "{:?} stack underflow", stack),
        }
        value
    }

    pub fn stack_depth(&self, stack: StackReg) -> usize {
        self.stacks[stack as usize].depth()
    }

    // Accumulators

    pub fn long_acc(&self, n: usize) -> i64 {
        let acc = &self.ac[n];
        let high = (acc.h as i8 as i64) << 32;
        high | ((acc.m as i64) << 16) | acc.l as i64
    }

    pub fn set_long_acc(&mut self, n: usize, value: i64) {
        let acc = &mut self.ac[n];
        acc.l = value as u16;
        acc.m = (value >> 16) as u16;
        acc.h = (value >> 32) as i8 as i16 as u16;
    }

    /// `$axN` as a sign-extended 32-bit value
    pub fn long_acx(&self, n: usize) -> i64 {
        let ax = &self.ax[n];
        (((ax.h as u32) << 16) | ax.l as u32) as i32 as i64
    }

    /// The product, summing its two middle parts
    pub fn long_prod(&self) -> i64 {
        let high = (self.prod.h as u8 as i8 as i64) << 32;
        let mid = (self.prod.m as i64 + self.prod.m2 as i64) << 16;
        high + mid + self.prod.l as i64
    }

    pub fn set_long_prod(&mut self, value: i64) {
        self.prod.l = value as u16;
        self.prod.m = (value >> 16) as u16;
        self.prod.h = (value >> 32) as u8 as u16;
        self.prod.m2 = 0;
    }

    /// The product rounded to its upper 24 bits, low word cleared
    pub fn long_prod_rounded(&self) -> i64 {
        round_long_acc(self.long_prod())
    }

    /// ACM as read by moves: saturated to 16 bits when SXM is set and the
    /// accumulator does not fit in 32
    pub fn acm_saturated(&self, n: usize) -> u16 {
        if self.is_sr_flag_set(SrFlags::SXM) {
            let acc = self.long_acc(n);
            if acc != acc as i32 as i64 {
                return if acc > 0 { 0x7fff } else { 0x8000 };
            }
        }
        self.ac[n].m
    }

    // Register access by index

    /// Read a register the way a move does. Reading `$st0-3` pops.
    pub fn read(&mut self, reg: u8) -> u16 {
        let reg = reg & 0x1f;
        match reg {
            REG_ST0..=REG_ST3 => self.pop_stack(StackReg::from_reg(reg)),
            REG_ACM0 | REG_ACM1 => self.acm_saturated((reg - REG_ACM0) as usize),
            _ => self.peek(reg),
        }
    }

    /// Read a register without side effects or saturation
    pub fn peek(&self, reg: u8) -> u16 {
        let reg = reg & 0x1f;
        let i = (reg & 3) as usize;
        match reg {
            0x00..=0x03 => self.ar[i],
            0x04..=0x07 => self.ix[i],
            0x08..=0x0b => self.wr[i],
            0x0c..=0x0f => self.st[i],
            REG_ACH0 | REG_ACH1 => self.ac[(reg & 1) as usize].h,
            REG_CR => self.cr,
            REG_SR => self.sr,
            REG_PRODL => self.prod.l,
            REG_PRODM => self.prod.m,
            REG_PRODH => self.prod.h,
            REG_PRODM2 => self.prod.m2,
            REG_AXL0 | REG_AXL1 => self.ax[(reg & 1) as usize].l,
            REG_AXH0 | REG_AXH1 => self.ax[(reg & 1) as usize].h,
            REG_ACL0 | REG_ACL1 => self.ac[(reg & 1) as usize].l,
            _ => self.ac[(reg & 1) as usize].m,
        }
    }

    /// Write a register. Writing `$st0-3` pushes; ACH keeps 8 bits, sign-extended.
    pub fn write(&mut self, reg: u8, value: u16) {
        let reg = reg & 0x1f;
        let i = (reg & 3) as usize;
        match reg {
            0x00..=0x03 => self.ar[i] = value,
            0x04..=0x07 => self.ix[i] = value,
            0x08..=0x0b => self.wr[i] = value,
            REG_ST0..=REG_ST3 => self.push_stack(StackReg::from_reg(reg), value),
            REG_ACH0 | REG_ACH1 => self.ac[(reg & 1) as usize].h = value as u8 as i8 as i16 as u16,
            REG_CR => self.cr = value,
            REG_SR => self.sr = value,
            REG_PRODL => self.prod.l = value,
            REG_PRODM => self.prod.m = value,
            REG_PRODH => self.prod.h = value,
            REG_PRODM2 => self.prod.m2 = value,
            REG_AXL0 | REG_AXL1 => self.ax[(reg & 1) as usize].l = value,
            REG_AXH0 | REG_AXH1 => self.ax[(reg & 1) as usize].h = value,
            REG_ACL0 | REG_ACL1 => self.ac[(reg & 1) as usize].l = value,
            _ => self.ac[(reg & 1) as usize].m = value,
        }
    }

    /// After a load into ACM with SXM set, sign-extend into ACH and clear ACL
    pub fn conditional_extend_accum(&mut self, reg: u8) {
        if !matches!(reg & 0x1f, REG_ACM0 | REG_ACM1) || !self.is_sr_flag_set(SrFlags::SXM) {
            return;
        }
        let acc = &mut self.ac[(reg & 1) as usize];
        acc.h = if acc.m & 0x8000 != 0 { 0xffff } else { 0 };
        acc.l = 0;
    }

    // Addressing registers with their wrap register

    pub fn increment_ar(&self, n: usize) -> u16 {
        addressing::increment(self.ar[n], self.wr[n])
    }

    pub fn decrement_ar(&self, n: usize) -> u16 {
        addressing::decrement(self.ar[n], self.wr[n])
    }

    /// `ar[n] + ix` with `ar[n]`'s wrapping
    pub fn increase_ar(&self, n: usize, ix: u16) -> u16 {
        addressing::increase_by_ix(self.ar[n], self.wr[n], ix as i16)
    }

    pub fn decrease_ar(&self, n: usize, ix: u16) -> u16 {
        addressing::decrease_by_ix(self.ar[n], self.wr[n], ix as i16)
    }

    // Status

    /// Rewrite the compare bits from a 40-bit result
    pub fn update_sr64(&mut self, value: i64, carry: bool, overflow: bool) {
        let value = sign_extend_40(value);
        let mut sr = self.sr & !SrFlags::CMP_MASK.bits();
        if carry {
            sr |= SrFlags::CARRY.bits();
        }
        if overflow {
            sr |= (SrFlags::OVERFLOW | SrFlags::OVERFLOW_STICKY).bits();
        }
        if value == 0 {
            sr |= SrFlags::ARITH_ZERO.bits();
        }
        if value < 0 {
            sr |= SrFlags::SIGN.bits();
        }
        if is_over_s32(value) {
            sr |= SrFlags::OVER_S32.bits();
        }
        let top2 = value & 0xc000_0000;
        if top2 == 0 || top2 == 0xc000_0000 {
            sr |= SrFlags::TOP2BITS.bits();
        }
        self.sr = sr;
    }

    /// Rewrite the compare bits from a 16-bit result. Logic ops on `$acD.m`
    /// pass the whole accumulator's 32-bit overflow in `over_s32`.
    pub fn update_sr16(&mut self, value: i16, carry: bool, overflow: bool, over_s32: bool) {
        let mut sr = self.sr & !SrFlags::CMP_MASK.bits();
        if carry {
            sr |= SrFlags::CARRY.bits();
        }
        if overflow {
            sr |= (SrFlags::OVERFLOW | SrFlags::OVERFLOW_STICKY).bits();
        }
        if value == 0 {
            sr |= SrFlags::ARITH_ZERO.bits();
        }
        if value < 0 {
            sr |= SrFlags::SIGN.bits();
        }
        if over_s32 {
            sr |= SrFlags::OVER_S32.bits();
        }
        let top2 = value as u16 >> 14;
        if top2 == 0 || top2 == 3 {
            sr |= SrFlags::TOP2BITS.bits();
        }
        self.sr = sr;
    }
}

/// Round half to even at bit 16 and clear the low word
pub fn round_long_acc(value: i64) -> i64 {
    if value & 0x10000 != 0 {
        (value + 0x8000) & !0xffff
    } else {
        (value + 0x7fff) & !0xffff
    }
}

/// The 40-bit value does not fit in 32 bits
pub fn is_over_s32(value: i64) -> bool {
    value != value as i32 as i64
}

/// 40-bit sign extension of an accumulator value
pub fn convert_long_acc(value: i64) -> i64 {
    sign_extend_40(value)
}

/// Unsigned carry out of an addition
pub fn is_carry_add(before: i64, result: i64) -> bool {
    before as u64 > result as u64
}

/// Unsigned carry out of a subtraction done as an addition of the negation
pub fn is_carry_sub(before: i64, result: i64) -> bool {
    before as u64 >= result as u64
}

pub fn is_overflow(a: i64, b: i64, result: i64) -> bool {
    ((a ^ result) & (b ^ result)) < 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_acc_sign_extends_high_byte() {
        let mut regs = DspRegisters::default();
        regs.set_long_acc(0, -2);
        assert_eq!(regs.ac[0].h, 0xffff);
        assert_eq!(regs.ac[0].m, 0xffff);
        assert_eq!(regs.ac[0].l, 0xfffe);
        assert_eq!(regs.long_acc(0), -2);

        regs.set_long_acc(1, 0x7f_1234_5678);
        assert_eq!(regs.long_acc(1), 0x7f_1234_5678);
    }

    #[test]
    fn test_ach_write_keeps_eight_bits() {
        let mut regs = DspRegisters::default();
        regs.write(REG_ACH0, 0x0180);
        assert_eq!(regs.peek(REG_ACH0), 0xff80);
    }

    #[test]
    fn test_acm_read_saturates_with_sxm() {
        let mut regs = DspRegisters::default();
        regs.set_long_acc(0, 0x01_0000_0000);
        assert_eq!(regs.read(REG_ACM0), 0x0000);
        regs.set_sr_flag(SrFlags::SXM, true);
        assert_eq!(regs.read(REG_ACM0), 0x7fff);
        regs.set_long_acc(0, -0x01_0000_0000);
        assert_eq!(regs.read(REG_ACM0), 0x8000);
    }

    #[test]
    fn test_st_registers_push_and_pop() {
        let mut regs = DspRegisters::default();
        regs.write(REG_ST0 + 2, 0x0010);
        regs.write(REG_ST0 + 2, 0x0020);
        assert_eq!(regs.stack_depth(StackReg::LoopAddress), 2);
        assert_eq!(regs.read(REG_ST0 + 2), 0x0020);
        assert_eq!(regs.st[2], 0x0010);
        assert_eq!(regs.read(REG_ST0 + 2), 0x0010);
        assert_eq!(regs.stack_depth(StackReg::LoopAddress), 0);
    }

    #[test]
    fn test_stack_capacity() {
        let mut regs = DspRegisters::default();
        for i in 0..10 {
            regs.push_stack(StackReg::Call, i);
        }
        assert_eq!(regs.stack_depth(StackReg::Call), 8);
        for i in 0..4 {
            regs.push_stack(StackReg::LoopCounter, i);
        }
        assert_eq!(regs.stack_depth(StackReg::LoopCounter), 4);
        regs.push_stack(StackReg::LoopCounter, 9);
        assert_eq!(regs.stack_depth(StackReg::LoopCounter), 4);
        assert_eq!(regs.pop_stack(StackReg::LoopCounter), 9);
    }

    #[test]
    fn test_conditional_extend_accum() {
        let mut regs = DspRegisters::default();
        regs.ac[1].l = 0x1234;
        regs.write(REG_ACM1, 0x8000);
        regs.conditional_extend_accum(REG_ACM1);
        assert_eq!(regs.ac[1].l, 0x1234);

        regs.set_sr_flag(SrFlags::SXM, true);
        regs.conditional_extend_accum(REG_ACM1);
        assert_eq!((regs.ac[1].h, regs.ac[1].l), (0xffff, 0));
        assert_eq!(regs.long_acc(1), -0x8000_0000);
    }

    #[test]
    fn test_update_sr64() {
        let mut regs = DspRegisters::default();
        regs.sr = 0xff00;
        regs.update_sr64(0, false, false);
        assert_eq!(regs.sr, 0xff00 | 0x24);

        regs.update_sr64(-1, true, false);
        assert!(regs.sr_flags().contains(SrFlags::SIGN | SrFlags::CARRY | SrFlags::TOP2BITS));

        regs.update_sr64(0x1_0000_0000, false, true);
        let sr = regs.sr_flags();
        assert!(sr.contains(SrFlags::OVER_S32 | SrFlags::OVERFLOW | SrFlags::OVERFLOW_STICKY));
        assert!(!sr.contains(SrFlags::SIGN));

        regs.update_sr64(0x4000_0000, false, false);
        assert!(!regs.sr_flags().contains(SrFlags::TOP2BITS));
        assert!(regs.sr_flags().contains(SrFlags::OVERFLOW_STICKY));
    }

    #[test]
    fn test_update_sr16() {
        let mut regs = DspRegisters::default();
        regs.update_sr16(0, false, false, true);
        assert_eq!(regs.sr, 0x34);

        // 0x8000: sign, top two bits differ
        regs.update_sr16(i16::MIN, false, false, false);
        assert_eq!(regs.sr, 0x08);

        // 0xc001: sign, top two bits equal
        regs.update_sr16(0xc001_u16 as i16, false, false, false);
        assert_eq!(regs.sr, 0x28);

        regs.update_sr16(0x4000, true, true, false);
        assert_eq!(regs.sr, 0x83);
    }

    #[test]
    fn test_product_sums_middle_parts() {
        let mut regs = DspRegisters::default();
        // clrp
        regs.prod = Product { l: 0, m: 0xfff0, h: 0x00ff, m2: 0x0010 };
        assert_eq!(regs.long_prod(), 0);

        regs.set_long_prod(-0x1_2345_6789);
        assert_eq!(regs.prod, Product { l: 0x9877, m: 0xdcba, h: 0x00fe, m2: 0 });
        assert_eq!(regs.long_prod(), -0x1_2345_6789);
    }

    #[test]
    fn test_rounding_ties_to_even() {
        assert_eq!(round_long_acc(0x1_8000), 0x2_0000);
        assert_eq!(round_long_acc(0x2_8000), 0x2_0000);
        assert_eq!(round_long_acc(0x2_8001), 0x3_0000);
        assert_eq!(round_long_acc(0x1_7fff), 0x1_0000);
    }

    #[test]
    fn test_long_acx_sign_extends() {
        let mut regs = DspRegisters::default();
        regs.ax[1] = AxReg { l: 0x0001, h: 0x8000 };
        assert_eq!(regs.long_acx(1), -0x7fff_ffff);
    }
}
