//! Floating-Point Status and Control Register

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// FPSCR bit masks (bit 0 of the architecture is the MSB here)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FpscrFlags: u32 {
        /// Exception summary
        const FX     = 0x8000_0000;
        /// Enabled exception summary
        const FEX    = 0x4000_0000;
        /// Invalid operation summary
        const VX     = 0x2000_0000;
        const OX     = 0x1000_0000;
        const UX     = 0x0800_0000;
        const ZX     = 0x0400_0000;
        const XX     = 0x0200_0000;
        const VXSNAN = 0x0100_0000;
        const VXISI  = 0x0080_0000;
        const VXIDI  = 0x0040_0000;
        const VXZDZ  = 0x0020_0000;
        const VXIMZ  = 0x0010_0000;
        const VXVC   = 0x0008_0000;
        /// Fraction rounded
        const FR     = 0x0004_0000;
        /// Fraction inexact
        const FI     = 0x0002_0000;
        /// Result class descriptor
        const C      = 0x0001_0000;
        const FL     = 0x0000_8000;
        const FG     = 0x0000_4000;
        const FE     = 0x0000_2000;
        const FU     = 0x0000_1000;
        const VXSOFT = 0x0000_0400;
        const VXSQRT = 0x0000_0200;
        const VXCVI  = 0x0000_0100;
        const VE     = 0x0000_0080;
        const OE     = 0x0000_0040;
        const UE     = 0x0000_0020;
        const ZE     = 0x0000_0010;
        const XE     = 0x0000_0008;
        /// Non-IEEE mode: denormals flush to zero
        const NI     = 0x0000_0004;
        const RN     = 0x0000_0003;

        const FPCC = Self::FL.bits() | Self::FG.bits() | Self::FE.bits() | Self::FU.bits();
        const FPRF = Self::C.bits() | Self::FPCC.bits();

        /// Every invalid-operation cause
        const VX_ANY = Self::VXSNAN.bits() | Self::VXISI.bits() | Self::VXIDI.bits()
            | Self::VXZDZ.bits() | Self::VXIMZ.bits() | Self::VXVC.bits()
            | Self::VXSOFT.bits() | Self::VXSQRT.bits() | Self::VXCVI.bits();

        /// Sticky exception bits whose 0 -> 1 transition sets FX
        const EXCEPTIONS = Self::OX.bits() | Self::UX.bits() | Self::ZX.bits()
            | Self::XX.bits() | Self::VX_ANY.bits();
    }
}

/// Rounding mode selected by FPSCR[RN]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingMode {
    Nearest,
    TowardZero,
    TowardPositive,
    TowardNegative,
}

impl RoundingMode {
    pub fn from_rn(rn: u32) -> Self {
        match rn & 3 {
            0 => RoundingMode::Nearest,
            1 => RoundingMode::TowardZero,
            2 => RoundingMode::TowardPositive,
            _ => RoundingMode::TowardNegative,
        }
    }
}

/// FPSCR value of one emulated CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fpscr(pub u32);

impl Fpscr {
    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn flags(self) -> FpscrFlags {
        FpscrFlags::from_bits_retain(self.0)
    }

    pub fn contains(self, flags: FpscrFlags) -> bool {
        self.flags().contains(flags)
    }

    pub fn rounding_mode(self) -> RoundingMode {
        RoundingMode::from_rn(self.0)
    }

    pub fn non_ieee(self) -> bool {
        self.contains(FpscrFlags::NI)
    }

    /// Merge the outcome of one arithmetic operation.
    ///
    /// Exception bits are sticky and set FX on a 0 -> 1 transition. FR and FI
    /// describe only the latest operation and are replaced.
    pub fn apply(&mut self, result: FpscrFlags) {
        let old = self.flags();
        let raised = result & FpscrFlags::EXCEPTIONS;
        let mut new = old | raised;
        if !(raised - old).is_empty() {
            new |= FpscrFlags::FX;
        }
        new.set(FpscrFlags::FR, result.contains(FpscrFlags::FR));
        new.set(FpscrFlags::FI, result.contains(FpscrFlags::FI));
        self.0 = new.bits();
        self.update_summaries();
    }

    /// Raise sticky exception bits only, leaving FR and FI alone
    pub fn raise(&mut self, result: FpscrFlags) {
        let fr_fi = self.flags() & (FpscrFlags::FR | FpscrFlags::FI);
        self.apply(result | fr_fi);
    }

    /// Recompute the VX and FEX summary bits
    pub fn update_summaries(&mut self) {
        let mut f = self.flags();
        f.set(FpscrFlags::VX, f.intersects(FpscrFlags::VX_ANY));
        let enabled = (f.contains(FpscrFlags::VX) && f.contains(FpscrFlags::VE))
            || (f.contains(FpscrFlags::OX) && f.contains(FpscrFlags::OE))
            || (f.contains(FpscrFlags::UX) && f.contains(FpscrFlags::UE))
            || (f.contains(FpscrFlags::ZX) && f.contains(FpscrFlags::ZE))
            || (f.contains(FpscrFlags::XX) && f.contains(FpscrFlags::XE));
        f.set(FpscrFlags::FEX, enabled);
        self.0 = f.bits();
    }

    /// Whether the given exception outcome forbids writing the target register
    pub fn suppresses_write(self, result: FpscrFlags) -> bool {
        (result.intersects(FpscrFlags::VX_ANY) && self.contains(FpscrFlags::VE))
            || (result.contains(FpscrFlags::ZX) && self.contains(FpscrFlags::ZE))
    }

    /// Result class (C + FPCC) as a 5-bit value
    pub fn fprf(self) -> u32 {
        (self.0 & FpscrFlags::FPRF.bits()) >> 12
    }

    pub fn set_fprf(&mut self, class: u32) {
        self.0 = (self.0 & !FpscrFlags::FPRF.bits()) | ((class & 0x1f) << 12);
    }

    /// Set only the FPCC nibble, leaving C alone
    pub fn set_fpcc(&mut self, fpcc: u32) {
        self.0 = (self.0 & !FpscrFlags::FPCC.bits()) | ((fpcc & 0xf) << 12);
    }

    /// 4-bit field `n` (0 = most significant), as read by mcrfs
    pub fn field(self, n: usize) -> u32 {
        (self.0 >> (28 - n * 4)) & 0xf
    }

    /// Replace the whole register, as mtfsf/mtfsfi/mtfsb do, and refresh summaries
    pub fn set(&mut self, value: u32) {
        // FEX and VX are never written directly
        let keep = FpscrFlags::FEX.bits() | FpscrFlags::VX.bits();
        self.0 = (value & !keep) | (self.0 & keep);
        self.update_summaries();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_sets_summaries() {
        let mut fpscr = Fpscr::default();
        fpscr.apply(FpscrFlags::VXSNAN | FpscrFlags::FI);
        assert!(fpscr.contains(FpscrFlags::FX | FpscrFlags::VX | FpscrFlags::VXSNAN));
        assert!(fpscr.contains(FpscrFlags::FI));
        assert!(!fpscr.contains(FpscrFlags::FEX));

        fpscr.apply(FpscrFlags::empty());
        assert!(fpscr.contains(FpscrFlags::VXSNAN), "exception bits are sticky");
        assert!(!fpscr.contains(FpscrFlags::FI), "FI tracks the last operation");
    }

    #[test]
    fn test_fx_only_on_new_exceptions() {
        let mut fpscr = Fpscr(FpscrFlags::XX.bits());
        fpscr.apply(FpscrFlags::XX | FpscrFlags::FI);
        assert!(!fpscr.contains(FpscrFlags::FX));

        fpscr.apply(FpscrFlags::OX);
        assert!(fpscr.contains(FpscrFlags::FX));
    }

    #[test]
    fn test_enabled_exception_summary() {
        let mut fpscr = Fpscr(FpscrFlags::ZE.bits());
        fpscr.apply(FpscrFlags::ZX);
        assert!(fpscr.contains(FpscrFlags::FEX));
        assert!(fpscr.suppresses_write(FpscrFlags::ZX));
        assert!(!fpscr.suppresses_write(FpscrFlags::VXISI));
    }

    #[test]
    fn test_rounding_mode_field() {
        assert_eq!(Fpscr(0).rounding_mode(), RoundingMode::Nearest);
        assert_eq!(Fpscr(1).rounding_mode(), RoundingMode::TowardZero);
        assert_eq!(Fpscr(2).rounding_mode(), RoundingMode::TowardPositive);
        assert_eq!(Fpscr(3).rounding_mode(), RoundingMode::TowardNegative);
    }

    #[test]
    fn test_fprf_fields() {
        let mut fpscr = Fpscr::default();
        fpscr.set_fprf(0x11);
        assert_eq!(fpscr.fprf(), 0x11);
        fpscr.set_fpcc(0x4);
        assert_eq!(fpscr.fprf(), 0x14);
        assert_eq!(fpscr.field(4), 0x4);
    }
}
