//! Branch instructions. These set the pc themselves.

use crate::thread::PpcThread;

/// Evaluate BO/BI, decrementing CTR when BO asks for it
pub fn condition_met(thread: &mut PpcThread, bo: u8, bi: u8) -> bool {
    if bo & 0x04 == 0 {
        thread.regs.ctr = thread.regs.ctr.wrapping_sub(1);
    }
    let ctr_ok = (bo & 0x04) != 0 || ((thread.regs.ctr != 0) ^ ((bo & 0x02) != 0));
    let cond_ok = (bo & 0x10) != 0 || (thread.cr_bit(bi as usize) == ((bo & 0x08) != 0));
    ctr_ok && cond_ok
}

/// b / ba / bl / bla
pub fn b(thread: &mut PpcThread, li: i32, aa: bool, lk: bool) {
    let pc = thread.pc();
    let target = if aa { li as u32 } else { pc.wrapping_add(li as u32) };
    if lk {
        thread.regs.lr = pc.wrapping_add(4);
    }
    thread.set_pc(target);
}

/// bc
pub fn bc(thread: &mut PpcThread, bo: u8, bi: u8, bd: i16, aa: bool, lk: bool) {
    let pc = thread.pc();
    let taken = condition_met(thread, bo, bi);
    if lk {
        thread.regs.lr = pc.wrapping_add(4);
    }
    if taken {
        let target = if aa { bd as i32 as u32 } else { pc.wrapping_add(bd as i32 as u32) };
        thread.set_pc(target);
    } else {
        thread.set_pc(pc.wrapping_add(4));
    }
}

/// bclr
pub fn bclr(thread: &mut PpcThread, bo: u8, bi: u8, lk: bool) {
    let pc = thread.pc();
    let target = thread.regs.lr & !3;
    let taken = condition_met(thread, bo, bi);
    if lk {
        thread.regs.lr = pc.wrapping_add(4);
    }
    thread.set_pc(if taken { target } else { pc.wrapping_add(4) });
}

/// bcctr (never decrements CTR)
pub fn bcctr(thread: &mut PpcThread, bo: u8, bi: u8, lk: bool) {
    let pc = thread.pc();
    let target = thread.regs.ctr & !3;
    let taken = (bo & 0x10) != 0 || (thread.cr_bit(bi as usize) == ((bo & 0x08) != 0));
    if lk {
        thread.regs.lr = pc.wrapping_add(4);
    }
    thread.set_pc(if taken { target } else { pc.wrapping_add(4) });
}

#[cfg(test)]
mod tests {
    use super::*;
    use od_memory::MemoryManager;

    fn thread() -> PpcThread {
        let mut t = PpcThread::new(0, MemoryManager::new().unwrap());
        t.set_pc(0x8000_3100);
        t
    }

    #[test]
    fn test_bl_sets_link() {
        let mut t = thread();
        b(&mut t, 0x100, false, true);
        assert_eq!(t.pc(), 0x8000_3200);
        assert_eq!(t.regs.lr, 0x8000_3104);
    }

    #[test]
    fn test_bdnz_counts_down() {
        let mut t = thread();
        t.regs.ctr = 2;
        bc(&mut t, 16, 0, -8, false, false);
        assert_eq!(t.pc(), 0x8000_30F8);
        assert_eq!(t.regs.ctr, 1);

        t.set_pc(0x8000_3100);
        bc(&mut t, 16, 0, -8, false, false);
        assert_eq!(t.pc(), 0x8000_3104);
        assert_eq!(t.regs.ctr, 0);
    }

    #[test]
    fn test_beq_on_cr0() {
        let mut t = thread();
        t.set_cr_field(0, 0b0010);
        bc(&mut t, 12, 2, 0x40, false, false);
        assert_eq!(t.pc(), 0x8000_3140);
    }

    #[test]
    fn test_blr_returns() {
        let mut t = thread();
        t.regs.lr = 0x8000_4000;
        bclr(&mut t, 20, 0, false);
        assert_eq!(t.pc(), 0x8000_4000);
    }
}
