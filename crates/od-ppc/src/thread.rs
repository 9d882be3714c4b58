//! Gekko CPU state

use std::sync::Arc;

use od_memory::MemoryManager;
use serde::{Deserialize, Serialize};

use crate::fp_utils::{classify_double, FpResult};
use crate::fpscr::Fpscr;

/// Gekko register set. Floating-point registers are paired singles: `ps[n][0]`
/// is the FPR seen by double-precision instructions, `ps[n][1]` the second
/// slot used by paired-single and single-precision instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PpcRegisters {
    pub gpr: [u32; 32],
    pub ps: [[u64; 2]; 32],
    pub cr: u32,
    pub lr: u32,
    pub ctr: u32,
    pub xer: u32,
    pub fpscr: Fpscr,
    pub pc: u32,
}

impl Default for PpcRegisters {
    fn default() -> Self {
        Self {
            gpr: [0; 32],
            ps: [[0; 2]; 32],
            cr: 0,
            lr: 0,
            ctr: 0,
            xer: 0,
            fpscr: Fpscr::default(),
            pc: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpcThreadState {
    Stopped,
    Running,
    /// Spinning on a branch to itself
    Halted,
}

/// One emulated Gekko
pub struct PpcThread {
    pub id: u32,
    pub regs: PpcRegisters,
    pub state: PpcThreadState,
    memory: Arc<MemoryManager>,
}

impl PpcThread {
    pub fn new(id: u32, memory: Arc<MemoryManager>) -> Self {
        Self {
            id,
            regs: PpcRegisters::default(),
            state: PpcThreadState::Stopped,
            memory,
        }
    }

    pub fn pc(&self) -> u32 {
        self.regs.pc
    }

    pub fn set_pc(&mut self, addr: u32) {
        self.regs.pc = addr;
    }

    pub fn advance_pc(&mut self) {
        self.regs.pc = self.regs.pc.wrapping_add(4);
    }

    #[inline]
    pub fn gpr(&self, index: usize) -> u32 {
        self.regs.gpr[index]
    }

    #[inline]
    pub fn set_gpr(&mut self, index: usize, value: u32) {
        self.regs.gpr[index] = value;
    }

    /// rA, or zero when the field names r0
    #[inline]
    pub fn gpr_or_zero(&self, index: usize) -> u32 {
        if index == 0 {
            0
        } else {
            self.regs.gpr[index]
        }
    }

    /// FPR as seen by double-precision instructions
    #[inline]
    pub fn fpr(&self, index: usize) -> u64 {
        self.regs.ps[index][0]
    }

    /// Write the FPR, leaving the second paired-single slot alone
    #[inline]
    pub fn set_fpr(&mut self, index: usize, bits: u64) {
        self.regs.ps[index][0] = bits;
    }

    #[inline]
    pub fn ps0(&self, index: usize) -> u64 {
        self.regs.ps[index][0]
    }

    #[inline]
    pub fn ps1(&self, index: usize) -> u64 {
        self.regs.ps[index][1]
    }

    #[inline]
    pub fn set_ps(&mut self, index: usize, ps0: u64, ps1: u64) {
        self.regs.ps[index] = [ps0, ps1];
    }

    /// Write the same value to both slots
    #[inline]
    pub fn fill_ps(&mut self, index: usize, bits: u64) {
        self.regs.ps[index] = [bits, bits];
    }

    pub fn fpscr(&self) -> Fpscr {
        self.regs.fpscr
    }

    /// Merge an arithmetic result's flags and report whether the register
    /// write may happen. FPRF is refreshed from `fprf_source` when it may.
    pub fn commit_fp_flags(&mut self, result: &FpResult, fprf_source: u64) -> bool {
        let allowed = !self.regs.fpscr.suppresses_write(result.flags);
        self.regs.fpscr.apply(result.flags);
        if allowed {
            self.regs.fpscr.set_fprf(classify_double(fprf_source));
        }
        allowed
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn start(&mut self) {
        self.state = PpcThreadState::Running;
    }

    pub fn stop(&mut self) {
        self.state = PpcThreadState::Stopped;
    }

    pub fn is_running(&self) -> bool {
        self.state == PpcThreadState::Running
    }

    /// CR field (0-7)
    pub fn get_cr_field(&self, field: usize) -> u32 {
        (self.regs.cr >> (28 - field * 4)) & 0xF
    }

    pub fn set_cr_field(&mut self, field: usize, value: u32) {
        let shift = 28 - field * 4;
        self.regs.cr = (self.regs.cr & !(0xF << shift)) | ((value & 0xF) << shift);
    }

    /// CR bit (0 = most significant)
    pub fn cr_bit(&self, bit: usize) -> bool {
        (self.regs.cr >> (31 - bit)) & 1 != 0
    }

    pub fn set_cr_bit(&mut self, bit: usize, value: bool) {
        let mask = 1u32 << (31 - bit);
        if value {
            self.regs.cr |= mask;
        } else {
            self.regs.cr &= !mask;
        }
    }

    pub fn get_xer_so(&self) -> bool {
        (self.regs.xer & 0x8000_0000) != 0
    }

    pub fn set_xer_so(&mut self, value: bool) {
        if value {
            self.regs.xer |= 0x8000_0000;
        } else {
            self.regs.xer &= !0x8000_0000;
        }
    }

    /// CR1 from FPSCR[FX, FEX, VX, OX], for record-form FP instructions
    pub fn update_cr1(&mut self) {
        self.set_cr_field(1, self.regs.fpscr.bits() >> 28);
    }
}
