//! Paired-single instructions (primary opcode 4)
//!
//! Both slots are evaluated with the single-precision entry points. The
//! raised FPSCR bits of the two halves are merged; FPRF describes the slot
//! the architecture designates (ps0 for most ops).

use crate::fp_utils::{self, FpResult};
use crate::instructions::float::{compare_into, select, FpOp, SignOp};
use crate::thread::PpcThread;

fn commit_pair(thread: &mut PpcThread, frd: u8, ps0: FpResult, ps1: FpResult, fprf_from_ps1: bool, rc: bool) {
    let merged = FpResult::new(ps0.value, ps0.flags | ps1.flags);
    let fprf_source = if fprf_from_ps1 { ps1.value } else { ps0.value };
    if thread.commit_fp_flags(&merged, fprf_source) {
        thread.set_ps(frd as usize, ps0.value, ps1.value);
    }
    if rc {
        thread.update_cr1();
    }
}

/// Run a 5-bit extended opcode paired-single instruction.
/// Returns false for ops this interpreter does not implement.
pub fn arithmetic(thread: &mut PpcThread, xo: u16, frd: u8, fra: u8, frb: u8, frc: u8, rc: bool) -> bool {
    let (a0, a1) = (thread.ps0(fra as usize), thread.ps1(fra as usize));
    let (b0, b1) = (thread.ps0(frb as usize), thread.ps1(frb as usize));
    let (c0, c1) = (thread.ps0(frc as usize), thread.ps1(frc as usize));
    let fpscr = thread.fpscr();

    match xo {
        // ps_sum0
        10 => {
            let sum = fp_utils::add_single_precision(a0, b1, fpscr);
            commit_pair(thread, frd, sum, FpResult::exact(c1), false, rc);
        }
        // ps_sum1
        11 => {
            let sum = fp_utils::add_single_precision(a0, b1, fpscr);
            commit_pair(thread, frd, FpResult::exact(c0), sum, true, rc);
        }
        // ps_muls0 / ps_muls1
        12 | 13 => {
            let c = if xo == 12 { c0 } else { c1 };
            let p0 = fp_utils::multiply_single_precision(a0, c, fpscr);
            let p1 = fp_utils::multiply_single_precision(a1, c, fpscr);
            commit_pair(thread, frd, p0, p1, false, rc);
        }
        // ps_madds0 / ps_madds1
        14 | 15 => {
            let c = if xo == 14 { c0 } else { c1 };
            let p0 = fp_utils::madd_single_precision(a0, c, b0, false, false, fpscr);
            let p1 = fp_utils::madd_single_precision(a1, c, b1, false, false, fpscr);
            commit_pair(thread, frd, p0, p1, false, rc);
        }
        // ps_sel
        23 => {
            thread.set_ps(frd as usize, select(a0, b0, c0), select(a1, b1, c1));
            if rc {
                thread.update_cr1();
            }
        }
        _ => {
            let Some(op) = FpOp::from_xo(xo) else {
                return false;
            };
            let p0 = op.evaluate(a0, b0, c0, true, fpscr);
            let p1 = op.evaluate(a1, b1, c1, true, fpscr);
            commit_pair(thread, frd, p0, p1, false, rc);
        }
    }
    true
}

/// Run a 10-bit extended opcode paired-single instruction
pub fn execute_x(thread: &mut PpcThread, xo: u16, frd: u8, fra: u8, frb: u8, rc: bool) -> bool {
    let crfd = frd >> 2;
    match xo {
        0 | 32 => {
            let (a, b) = (thread.ps0(fra as usize), thread.ps0(frb as usize));
            compare_into(thread, crfd, a, b, xo == 32);
            return true;
        }
        64 | 96 => {
            let (a, b) = (thread.ps1(fra as usize), thread.ps1(frb as usize));
            compare_into(thread, crfd, a, b, xo == 96);
            return true;
        }
        40 | 72 | 136 | 264 => {
            let op = match xo {
                40 => SignOp::Neg,
                72 => SignOp::Move,
                136 => SignOp::Nabs,
                _ => SignOp::Abs,
            };
            let (b0, b1) = (thread.ps0(frb as usize), thread.ps1(frb as usize));
            thread.set_ps(frd as usize, op.apply(b0), op.apply(b1));
        }
        528 | 560 | 592 | 624 => {
            let a = if xo & 64 != 0 { thread.ps1(fra as usize) } else { thread.ps0(fra as usize) };
            let b = if xo & 32 != 0 { thread.ps1(frb as usize) } else { thread.ps0(frb as usize) };
            thread.set_ps(frd as usize, a, b);
        }
        _ => return false,
    }
    if rc {
        thread.update_cr1();
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use od_memory::MemoryManager;

    const ONE: u64 = 0x3FF0_0000_0000_0000;
    const TWO: u64 = 0x4000_0000_0000_0000;
    const THREE: u64 = 0x4008_0000_0000_0000;
    const FOUR: u64 = 0x4010_0000_0000_0000;

    fn thread() -> PpcThread {
        PpcThread::new(0, MemoryManager::new().unwrap())
    }

    #[test]
    fn test_ps_add_both_slots() {
        let mut t = thread();
        t.set_ps(1, ONE, TWO);
        t.set_ps(2, TWO, TWO);
        assert!(arithmetic(&mut t, 21, 3, 1, 2, 0, false));
        assert_eq!((t.ps0(3), t.ps1(3)), (THREE, FOUR));
    }

    #[test]
    fn test_ps_sum0_keeps_c_slot() {
        let mut t = thread();
        t.set_ps(1, ONE, 0);
        t.set_ps(2, 0, TWO);
        t.set_ps(4, 0, FOUR);
        assert!(arithmetic(&mut t, 10, 3, 1, 2, 4, false));
        assert_eq!((t.ps0(3), t.ps1(3)), (THREE, FOUR));
    }

    #[test]
    fn test_ps_muls1_uses_c_ps1() {
        let mut t = thread();
        t.set_ps(1, ONE, TWO);
        t.set_ps(3, FOUR, TWO);
        assert!(arithmetic(&mut t, 13, 5, 1, 0, 3, false));
        assert_eq!((t.ps0(5), t.ps1(5)), (TWO, FOUR));
    }

    #[test]
    fn test_ps_merges() {
        let mut t = thread();
        t.set_ps(1, 1, 2);
        t.set_ps(2, 3, 4);
        let cases = [(528, (1, 3)), (560, (1, 4)), (592, (2, 3)), (624, (2, 4))];
        for (xo, expected) in cases {
            assert!(execute_x(&mut t, xo, 5, 1, 2, false));
            assert_eq!((t.ps0(5), t.ps1(5)), expected, "xo {xo}");
        }
    }

    #[test]
    fn test_ps_cmpu1_compares_second_slot() {
        let mut t = thread();
        t.set_ps(1, ONE, FOUR);
        t.set_ps(2, TWO, TWO);
        // crfD = 2 is encoded as frD = 8
        assert!(execute_x(&mut t, 64, 8, 1, 2, false));
        assert_eq!(t.get_cr_field(2), 0b0100);
    }
}
