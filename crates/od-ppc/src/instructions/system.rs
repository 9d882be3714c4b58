//! Condition register, special purpose register and FPSCR instructions

use crate::fpscr::FpscrFlags;
use crate::thread::PpcThread;

pub const SPR_XER: u16 = 1;
pub const SPR_LR: u16 = 8;
pub const SPR_CTR: u16 = 9;

/// CR logical ops (opcode 19). Returns false for an unknown `xo`.
pub fn cr_logical(thread: &mut PpcThread, xo: u16, crbd: u8, crba: u8, crbb: u8) -> bool {
    let a = thread.cr_bit(crba as usize);
    let b = thread.cr_bit(crbb as usize);
    let value = match xo {
        257 => a & b,
        449 => a | b,
        193 => a ^ b,
        33 => !(a | b),
        289 => !(a ^ b),
        129 => a & !b,
        417 => a | !b,
        225 => !(a & b),
        _ => return false,
    };
    thread.set_cr_bit(crbd as usize, value);
    true
}

/// mcrf
pub fn mcrf(thread: &mut PpcThread, crfd: u8, crfs: u8) {
    let value = thread.get_cr_field(crfs as usize);
    thread.set_cr_field(crfd as usize, value);
}

pub fn mfcr(thread: &mut PpcThread, rt: u8) {
    thread.set_gpr(rt as usize, thread.regs.cr);
}

pub fn mtcrf(thread: &mut PpcThread, crm: u8, rs: u8) {
    let value = thread.gpr(rs as usize);
    let mut mask = 0u32;
    for field in 0..8 {
        if crm & (0x80 >> field) != 0 {
            mask |= 0xF000_0000 >> (field * 4);
        }
    }
    thread.regs.cr = (thread.regs.cr & !mask) | (value & mask);
}

/// SPR number from its split encoding
#[inline]
pub fn decode_spr(opcode: u32) -> u16 {
    (((opcode >> 16) & 0x1F) | (((opcode >> 11) & 0x1F) << 5)) as u16
}

pub fn mfspr(thread: &mut PpcThread, rt: u8, spr: u16) {
    let value = match spr {
        SPR_XER => thread.regs.xer,
        SPR_LR => thread.regs.lr,
        SPR_CTR => thread.regs.ctr,
        _ => {
            tracing::warn!("mfspr from unhandled SPR {}", spr);
            0
        }
    };
    thread.set_gpr(rt as usize, value);
}

pub fn mtspr(thread: &mut PpcThread, rs: u8, spr: u16) {
    let value = thread.gpr(rs as usize);
    match spr {
        SPR_XER => thread.regs.xer = value,
        SPR_LR => thread.regs.lr = value,
        SPR_CTR => thread.regs.ctr = value,
        _ => tracing::warn!("mtspr to unhandled SPR {}", spr),
    }
}

/// mffs: FPSCR in the low word, 0xFFF80000 above it
pub fn mffs(thread: &mut PpcThread, frd: u8) {
    let value = 0xFFF8_0000_0000_0000 | thread.fpscr().bits() as u64;
    thread.set_fpr(frd as usize, value);
}

/// mtfsf: copy the FM-selected nibbles of frB's low word
pub fn mtfsf(thread: &mut PpcThread, fm: u8, frb: u8) {
    let source = thread.fpr(frb as usize) as u32;
    let mut mask = 0u32;
    for field in 0..8 {
        if fm & (0x80 >> field) != 0 {
            mask |= 0xF000_0000 >> (field * 4);
        }
    }
    let current = thread.fpscr().bits();
    thread.regs.fpscr.set((current & !mask) | (source & mask));
}

/// mtfsfi: write a 4-bit immediate to field `crfd`
pub fn mtfsfi(thread: &mut PpcThread, crfd: u8, imm: u8) {
    let shift = 28 - crfd as u32 * 4;
    let mask = 0xF << shift;
    let current = thread.fpscr().bits();
    thread.regs.fpscr.set((current & !mask) | (((imm as u32) & 0xF) << shift));
}

/// mtfsb0 / mtfsb1 on FPSCR bit `crbd` (0 = most significant)
pub fn mtfsb(thread: &mut PpcThread, crbd: u8, value: bool) {
    let bit = 0x8000_0000u32 >> crbd;
    let current = thread.fpscr().bits();
    if !value {
        thread.regs.fpscr.set(current & !bit);
    } else if FpscrFlags::EXCEPTIONS.bits() & bit != 0 {
        thread.regs.fpscr.raise(FpscrFlags::from_bits_retain(bit));
    } else {
        thread.regs.fpscr.set(current | bit);
    }
}

/// mcrfs: copy an FPSCR field into CR and clear the exception bits it held
pub fn mcrfs(thread: &mut PpcThread, crfd: u8, crfs: u8) {
    let fpscr = thread.fpscr();
    thread.set_cr_field(crfd as usize, fpscr.field(crfs as usize));

    let field_mask = 0xF000_0000u32 >> (crfs as u32 * 4);
    let clearable = (FpscrFlags::FX | FpscrFlags::EXCEPTIONS).bits() & field_mask;
    thread.regs.fpscr.0 &= !clearable;
    thread.regs.fpscr.update_summaries();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fpscr::Fpscr;
    use od_memory::MemoryManager;

    fn thread() -> PpcThread {
        PpcThread::new(0, MemoryManager::new().unwrap())
    }

    #[test]
    fn test_cror_and_crxor() {
        let mut t = thread();
        t.set_cr_bit(0, true);
        assert!(cr_logical(&mut t, 449, 3, 0, 1));
        assert!(t.cr_bit(3));
        assert!(cr_logical(&mut t, 193, 3, 0, 0));
        assert!(!t.cr_bit(3));
    }

    #[test]
    fn test_mffs_pattern() {
        let mut t = thread();
        t.regs.fpscr = Fpscr(0x0000_4003);
        mffs(&mut t, 1);
        assert_eq!(t.fpr(1), 0xFFF8_0000_0000_4003);
    }

    #[test]
    fn test_mtfsf_round_mode_only() {
        let mut t = thread();
        t.set_fpr(2, 0xFFFF_FFFF_0000_0001);
        mtfsf(&mut t, 0x01, 2);
        assert_eq!(t.fpscr().bits(), 0x0000_0001);
    }

    #[test]
    fn test_mtfsb1_exception_sets_fx() {
        let mut t = thread();
        // bit 3 = OX
        mtfsb(&mut t, 3, true);
        assert!(t.fpscr().contains(FpscrFlags::OX | FpscrFlags::FX));
        mtfsb(&mut t, 3, false);
        assert!(!t.fpscr().contains(FpscrFlags::OX));
    }

    #[test]
    fn test_mcrfs_clears_copied_exceptions() {
        let mut t = thread();
        t.regs.fpscr.apply(FpscrFlags::VXISI);
        // field 2 holds VXISI VXIDI VXZDZ VXIMZ
        mcrfs(&mut t, 4, 2);
        assert_eq!(t.get_cr_field(4), 0b1000);
        assert!(!t.fpscr().contains(FpscrFlags::VXISI));
        assert!(!t.fpscr().contains(FpscrFlags::VX));
        assert!(t.fpscr().contains(FpscrFlags::FX));
    }

    #[test]
    fn test_spr_moves() {
        let mut t = thread();
        t.set_gpr(3, 0x1234);
        mtspr(&mut t, 3, SPR_CTR);
        mfspr(&mut t, 4, SPR_CTR);
        assert_eq!(t.gpr(4), 0x1234);
    }
}
