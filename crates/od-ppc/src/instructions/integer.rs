//! Integer arithmetic, logical, compare and rotate instructions

use crate::thread::PpcThread;

/// Record CR0 for an Rc=1 instruction
pub fn update_cr0(thread: &mut PpcThread, value: u32) {
    let value = value as i32;
    let c = if value < 0 {
        0b1000
    } else if value > 0 {
        0b0100
    } else {
        0b0010
    };
    let c = c | thread.get_xer_so() as u32;
    thread.set_cr_field(0, c);
}

fn compare_field(thread: &mut PpcThread, crfd: u8, ordering: std::cmp::Ordering) {
    let c = match ordering {
        std::cmp::Ordering::Less => 0b1000,
        std::cmp::Ordering::Greater => 0b0100,
        std::cmp::Ordering::Equal => 0b0010,
    };
    let c = c | thread.get_xer_so() as u32;
    thread.set_cr_field(crfd as usize, c);
}

/// addi (li when rA = 0)
pub fn addi(thread: &mut PpcThread, rt: u8, ra: u8, simm: i16) {
    let value = thread.gpr_or_zero(ra as usize).wrapping_add(simm as i32 as u32);
    thread.set_gpr(rt as usize, value);
}

/// addis (lis when rA = 0)
pub fn addis(thread: &mut PpcThread, rt: u8, ra: u8, simm: i16) {
    let value = thread
        .gpr_or_zero(ra as usize)
        .wrapping_add((simm as i32 as u32) << 16);
    thread.set_gpr(rt as usize, value);
}

pub fn mulli(thread: &mut PpcThread, rt: u8, ra: u8, simm: i16) {
    let value = (thread.gpr(ra as usize) as i32).wrapping_mul(simm as i32);
    thread.set_gpr(rt as usize, value as u32);
}

pub fn ori(thread: &mut PpcThread, rs: u8, ra: u8, uimm: u16) {
    let value = thread.gpr(rs as usize) | uimm as u32;
    thread.set_gpr(ra as usize, value);
}

pub fn oris(thread: &mut PpcThread, rs: u8, ra: u8, uimm: u16) {
    let value = thread.gpr(rs as usize) | ((uimm as u32) << 16);
    thread.set_gpr(ra as usize, value);
}

pub fn xori(thread: &mut PpcThread, rs: u8, ra: u8, uimm: u16) {
    let value = thread.gpr(rs as usize) ^ uimm as u32;
    thread.set_gpr(ra as usize, value);
}

/// andi. always records CR0
pub fn andi(thread: &mut PpcThread, rs: u8, ra: u8, uimm: u16) {
    let value = thread.gpr(rs as usize) & uimm as u32;
    thread.set_gpr(ra as usize, value);
    update_cr0(thread, value);
}

pub fn cmpi(thread: &mut PpcThread, crfd: u8, ra: u8, simm: i16) {
    let a = thread.gpr(ra as usize) as i32;
    compare_field(thread, crfd, a.cmp(&(simm as i32)));
}

pub fn cmpli(thread: &mut PpcThread, crfd: u8, ra: u8, uimm: u16) {
    let a = thread.gpr(ra as usize);
    compare_field(thread, crfd, a.cmp(&(uimm as u32)));
}

pub fn cmp(thread: &mut PpcThread, crfd: u8, ra: u8, rb: u8) {
    let a = thread.gpr(ra as usize) as i32;
    let b = thread.gpr(rb as usize) as i32;
    compare_field(thread, crfd, a.cmp(&b));
}

pub fn cmpl(thread: &mut PpcThread, crfd: u8, ra: u8, rb: u8) {
    let a = thread.gpr(ra as usize);
    let b = thread.gpr(rb as usize);
    compare_field(thread, crfd, a.cmp(&b));
}

/// Logical X-form ops: and, or, xor, nor, andc, slw, srw, extsh, extsb
pub fn logical(thread: &mut PpcThread, xo: u16, rs: u8, ra: u8, rb: u8, rc: bool) -> bool {
    let s = thread.gpr(rs as usize);
    let b = thread.gpr(rb as usize);
    let value = match xo {
        28 => s & b,
        60 => s & !b,
        124 => !(s | b),
        316 => s ^ b,
        444 => s | b,
        24 => {
            let n = b & 0x3F;
            if n > 31 { 0 } else { s << n }
        }
        536 => {
            let n = b & 0x3F;
            if n > 31 { 0 } else { s >> n }
        }
        922 => s as i16 as i32 as u32,
        954 => s as i8 as i32 as u32,
        _ => return false,
    };
    thread.set_gpr(ra as usize, value);
    if rc {
        update_cr0(thread, value);
    }
    true
}

/// XO-form arithmetic; returns false for an unhandled extended opcode
pub fn arithmetic(thread: &mut PpcThread, xo: u16, rt: u8, ra: u8, rb: u8, oe: bool, rc: bool) -> bool {
    let a = thread.gpr(ra as usize);
    let b = thread.gpr(rb as usize);

    let (result, overflow) = match xo {
        266 => {
            let (r, o) = (a as i32).overflowing_add(b as i32);
            (r as u32, o)
        }
        40 => {
            let (r, o) = (b as i32).overflowing_sub(a as i32);
            (r as u32, o)
        }
        104 => {
            let (r, o) = (a as i32).overflowing_neg();
            (r as u32, o)
        }
        235 => {
            let (r, o) = (a as i32).overflowing_mul(b as i32);
            (r as u32, o)
        }
        491 => {
            let (a, b) = (a as i32, b as i32);
            if b == 0 || (a == i32::MIN && b == -1) {
                (0, true)
            } else {
                ((a / b) as u32, false)
            }
        }
        459 => {
            if b == 0 {
                (0, true)
            } else {
                (a / b, false)
            }
        }
        _ => return false,
    };

    thread.set_gpr(rt as usize, result);
    if oe {
        if overflow {
            thread.regs.xer |= 0xC000_0000;
        } else {
            thread.regs.xer &= !0x4000_0000;
        }
    }
    if rc {
        update_cr0(thread, result);
    }
    true
}

/// 32-bit rotate mask from MB to ME
pub fn generate_mask_32(mb: u8, me: u8) -> u32 {
    let mb = mb as u32;
    let me = me as u32;
    if mb <= me {
        (u32::MAX >> mb) & (u32::MAX << (31 - me))
    } else {
        (u32::MAX >> mb) | (u32::MAX << (31 - me))
    }
}

/// rlwimi (20), rlwinm (21), rlwnm (23)
pub fn rotate(thread: &mut PpcThread, op: u8, rs: u8, ra: u8, rb_sh: u8, mb: u8, me: u8, rc: bool) {
    let sh = if op == 23 {
        thread.gpr(rb_sh as usize) & 0x1F
    } else {
        rb_sh as u32
    };
    let rotated = thread.gpr(rs as usize).rotate_left(sh);
    let mask = generate_mask_32(mb, me);
    let result = if op == 20 {
        (rotated & mask) | (thread.gpr(ra as usize) & !mask)
    } else {
        rotated & mask
    };
    thread.set_gpr(ra as usize, result);
    if rc {
        update_cr0(thread, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use od_memory::MemoryManager;

    fn thread() -> PpcThread {
        PpcThread::new(0, MemoryManager::new().unwrap())
    }

    #[test]
    fn test_mask_generation() {
        assert_eq!(generate_mask_32(0, 31), 0xFFFFFFFF);
        assert_eq!(generate_mask_32(16, 31), 0x0000FFFF);
        assert_eq!(generate_mask_32(0, 15), 0xFFFF0000);
        assert_eq!(generate_mask_32(28, 3), 0xF000000F);
    }

    #[test]
    fn test_lis_ori_builds_constant() {
        let mut t = thread();
        addis(&mut t, 3, 0, 0x4000u16 as i16);
        ori(&mut t, 3, 3, 0x1234);
        assert_eq!(t.gpr(3), 0x4000_1234);
    }

    #[test]
    fn test_divw_overflow_sets_so() {
        let mut t = thread();
        t.set_gpr(4, 0x8000_0000);
        t.set_gpr(5, u32::MAX);
        assert!(arithmetic(&mut t, 491, 3, 4, 5, true, true));
        assert_eq!(t.gpr(3), 0);
        assert!(t.get_xer_so());
        assert_eq!(t.get_cr_field(0), 0b0011);
    }

    #[test]
    fn test_signed_compare() {
        let mut t = thread();
        t.set_gpr(3, (-5i32) as u32);
        cmpi(&mut t, 7, 3, 0);
        assert_eq!(t.get_cr_field(7), 0b1000);
        cmpli(&mut t, 6, 3, 0);
        assert_eq!(t.get_cr_field(6), 0b0100);
    }
}
