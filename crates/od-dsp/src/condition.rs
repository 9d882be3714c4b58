//! Condition codes of `jcc`, `callcc`, `retcc`, `rticc`, `ifcc`, `jmprcc`
//! and `callrcc`

use serde::{Deserialize, Serialize};

use crate::registers::SrFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// Greater or equal
    Ge = 0x0,
    /// Less
    L = 0x1,
    /// Greater
    G = 0x2,
    /// Less or equal
    Le = 0x3,
    Nz = 0x4,
    Z = 0x5,
    Nc = 0x6,
    C = 0x7,
    /// Result fits in 32 bits
    NotOverS32 = 0x8,
    OverS32 = 0x9,
    /// `(OVER_S32 || TOP2BITS) && !ARITH_ZERO`
    A = 0xa,
    /// `!(OVER_S32 || TOP2BITS) || ARITH_ZERO`
    B = 0xb,
    /// Logic not zero
    Lnz = 0xc,
    /// Logic zero
    Lz = 0xd,
    O = 0xe,
    Always = 0xf,
}

impl Condition {
    const ALL: [Condition; 16] = [
        Condition::Ge,
        Condition::L,
        Condition::G,
        Condition::Le,
        Condition::Nz,
        Condition::Z,
        Condition::Nc,
        Condition::C,
        Condition::NotOverS32,
        Condition::OverS32,
        Condition::A,
        Condition::B,
        Condition::Lnz,
        Condition::Lz,
        Condition::O,
        Condition::Always,
    ];

    /// Condition in the low four bits of an opcode
    pub fn from_opcode(opc: u16) -> Condition {
        Self::ALL[(opc & 0xf) as usize]
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Evaluate against a status register value
    pub fn check(self, sr: u16) -> bool {
        let sr = SrFlags::from_bits_retain(sr);
        let less = sr.contains(SrFlags::OVERFLOW) != sr.contains(SrFlags::SIGN);
        let zero = sr.contains(SrFlags::ARITH_ZERO);
        let cond_a = (sr.contains(SrFlags::OVER_S32) || sr.contains(SrFlags::TOP2BITS)) && !zero;

        match self {
            Condition::Ge => !less,
            Condition::L => less,
            Condition::G => !less && !zero,
            Condition::Le => less || zero,
            Condition::Nz => !zero,
            Condition::Z => zero,
            Condition::Nc => !sr.contains(SrFlags::CARRY),
            Condition::C => sr.contains(SrFlags::CARRY),
            Condition::NotOverS32 => !sr.contains(SrFlags::OVER_S32),
            Condition::OverS32 => sr.contains(SrFlags::OVER_S32),
            Condition::A => cond_a,
            Condition::B => !cond_a,
            Condition::Lnz => !sr.contains(SrFlags::LOGIC_ZERO),
            Condition::Lz => sr.contains(SrFlags::LOGIC_ZERO),
            Condition::O => sr.contains(SrFlags::OVERFLOW),
            Condition::Always => true,
        }
    }
}

/// Interpreter condition check on a raw condition code
pub fn check_condition(cond: u8, sr: u16) -> bool {
    Condition::from_opcode(cond as u16).check(sr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for code in 0..16u16 {
            assert_eq!(Condition::from_opcode(0x0290 | code).code() as u16, code);
        }
    }

    #[test]
    fn test_pairs_are_complementary() {
        for sr in [0u16, 0x01, 0x02, 0x04, 0x08, 0x0a, 0x10, 0x20, 0x24, 0x40, 0x3f, 0xff] {
            for even in (0..14u8).step_by(2) {
                assert_ne!(check_condition(even, sr), check_condition(even + 1, sr), "cond {even} sr {sr:#x}");
            }
        }
    }

    #[test]
    fn test_signed_compares() {
        // sign without overflow: negative result
        assert!(check_condition(0x1, 0x08));
        assert!(!check_condition(0x0, 0x08));
        // sign and overflow together: positive result that overflowed
        assert!(check_condition(0x0, 0x0a));
        assert!(check_condition(0x2, 0x0a));
        assert!(!check_condition(0x2, 0x04));
        assert!(check_condition(0x3, 0x04));
    }

    #[test]
    fn test_top2bits_condition() {
        assert!(check_condition(0xa, 0x20));
        assert!(check_condition(0xa, 0x10));
        assert!(!check_condition(0xa, 0x24));
        assert!(check_condition(0xb, 0x00));
        assert!(check_condition(0xe, 0x02));
        assert!(check_condition(0xf, 0x00));
    }
}
