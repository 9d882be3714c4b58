//! Extended opcodes
//!
//! An extended opcode runs before its main opcode and sees the register
//! file as it was before the instruction. Data memory stores happen at
//! once; register results are queued in a [`WriteBacklog`] that the
//! interpreter applies after the main opcode.

use crate::addressing::is_same_mem_area;
use crate::registers::{DspRegisters, SrFlags, REG_ACH0, REG_ACL0, REG_ACM0, REG_ACM1, REG_AR3, REG_AXH0, REG_AXL0, REG_AXL1};
use crate::tables::ExtOpcode;
use crate::thread::DspThread;

const BACKLOG_SLOTS: usize = 4;

/// Register writes held back until the main opcode has run
#[derive(Debug, Clone, Default)]
pub struct WriteBacklog {
    entries: [(u8, u16); BACKLOG_SLOTS],
    len: usize,
}

impl WriteBacklog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reg: u8, value: u16) {
        debug_assert!(self.len < BACKLOG_SLOTS, "ext op queued more than {} writes", BACKLOG_SLOTS);
        self.entries[self.len] = (reg, value);
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Write the queued values in order and empty the backlog
    pub fn apply(&mut self, regs: &mut DspRegisters) {
        for &(reg, value) in &self.entries[..self.len] {
            regs.write(reg, value);
        }
        self.len = 0;
    }
}

/// Value of `$acS.l` or `$acS.m` as stored by moves, `src` counting from ACL0
fn read_acc_part(regs: &DspRegisters, reg: u8) -> u16 {
    match reg {
        REG_ACM0 | REG_ACM1 => regs.acm_saturated((reg - REG_ACM0) as usize),
        _ => regs.peek(reg),
    }
}

/// `ar[n]` stepped by one, or by `ix[n]` when `index` is set
fn post_increment(regs: &DspRegisters, n: usize, index: bool) -> u16 {
    if index {
        regs.increase_ar(n, regs.ix[n])
    } else {
        regs.increment_ar(n)
    }
}

/// Queue a load into `reg`. Loads into ACM in 40-bit mode sign-extend
/// into ACH and clear ACL.
fn queue_load(regs: &DspRegisters, backlog: &mut WriteBacklog, reg: u8, value: u16) {
    if matches!(reg, REG_ACM0 | REG_ACM1) && regs.is_sr_flag_set(SrFlags::SXM) {
        let n = reg & 1;
        let high = if value & 0x8000 != 0 { 0xffff } else { 0 };
        backlog.push(REG_ACH0 + n, high);
        backlog.push(reg, value);
        backlog.push(REG_ACL0 + n, 0);
    } else {
        backlog.push(reg, value);
    }
}

/// Run an extended opcode, queueing its register writes
pub fn execute(ext: ExtOpcode, thread: &mut DspThread, backlog: &mut WriteBacklog) {
    od_core::dsp_trace!("ext {:?}", ext);

    match ext {
        ExtOpcode::Nop => {}
        ExtOpcode::Dr { ar } => {
            let n = ar as usize;
            backlog.push(ar, thread.regs.decrement_ar(n));
        }
        ExtOpcode::Ir { ar } => {
            let n = ar as usize;
            backlog.push(ar, thread.regs.increment_ar(n));
        }
        ExtOpcode::Nr { ar } => {
            let n = ar as usize;
            backlog.push(ar, post_increment(&thread.regs, n, true));
        }
        ExtOpcode::Mv { dst, src } => {
            let value = read_acc_part(&thread.regs, REG_ACL0 + src);
            backlog.push(REG_AXL0 + dst, value);
        }
        ExtOpcode::S { ar, src, index } => {
            let n = ar as usize;
            let value = read_acc_part(&thread.regs, REG_ACL0 + src);
            thread.write_dmem(thread.regs.ar[n], value);
            backlog.push(ar, post_increment(&thread.regs, n, index));
        }
        ExtOpcode::L { dst, ar, index } => {
            let n = ar as usize;
            let value = thread.read_dmem(thread.regs.ar[n]);
            queue_load(&thread.regs, backlog, REG_AXL0 + dst, value);
            backlog.push(ar, post_increment(&thread.regs, n, index));
        }
        ExtOpcode::Ls { dst, acc, store_ar0, n, m } => {
            let value = thread.regs.acm_saturated(acc as usize);
            let (store_at, load_from) = if store_ar0 {
                (thread.regs.ar[0], thread.regs.ar[3])
            } else {
                (thread.regs.ar[3], thread.regs.ar[0])
            };
            thread.write_dmem(store_at, value);
            let loaded = thread.read_dmem(load_from);

            backlog.push(REG_AXL0 + dst, loaded);
            backlog.push(REG_AR3, post_increment(&thread.regs, 3, m));
            backlog.push(0, post_increment(&thread.regs, 0, n));
        }
        ExtOpcode::Ld { dst, rreg, ar, n, m } => {
            let s = ar as usize;
            let (addr_s, addr_3) = (thread.regs.ar[s], thread.regs.ar[3]);
            let first = thread.read_dmem(addr_s);
            let second = if is_same_mem_area(addr_s, addr_3) {
                first
            } else {
                thread.read_dmem(addr_3)
            };

            backlog.push(REG_AXL0 + (dst << 1), first);
            backlog.push(REG_AXL1 + (rreg << 1), second);
            backlog.push(ar, post_increment(&thread.regs, s, n));
            backlog.push(REG_AR3, post_increment(&thread.regs, 3, m));
        }
        ExtOpcode::Ldax { sreg, rreg, n, m } => {
            let s = sreg as usize;
            let (addr_s, addr_3) = (thread.regs.ar[s], thread.regs.ar[3]);
            let high = thread.read_dmem(addr_s);
            let low = if is_same_mem_area(addr_s, addr_3) {
                high
            } else {
                thread.read_dmem(addr_3)
            };

            backlog.push(REG_AXH0 + rreg, high);
            backlog.push(REG_AXL0 + rreg, low);
            backlog.push(sreg, post_increment(&thread.regs, s, n));
            backlog.push(REG_AR3, post_increment(&thread.regs, 3, m));
        }
    }
}
