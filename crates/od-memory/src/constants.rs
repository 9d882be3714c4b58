//! GameCube memory map constants

/// Physical base of main memory (MEM1)
pub const MEM1_PHYS_BASE: u32 = 0x0000_0000;
/// Main memory size (24 MB)
pub const MEM1_SIZE: u32 = 0x0180_0000;

/// Cached virtual mirror of MEM1
pub const MEM1_CACHED_BASE: u32 = 0x8000_0000;
/// Uncached virtual mirror of MEM1
pub const MEM1_UNCACHED_BASE: u32 = 0xC000_0000;

/// Default entry point for raw code images
pub const DEFAULT_LOAD_ADDR: u32 = 0x8000_3100;

/// DSP instruction RAM (words)
pub const DSP_IRAM_SIZE: usize = 0x1000;
/// DSP instruction ROM (words), mapped at 0x8000
pub const DSP_IROM_SIZE: usize = 0x1000;
/// DSP data RAM (words)
pub const DSP_DRAM_SIZE: usize = 0x1000;
/// DSP coefficient ROM (words), mapped at 0x1000
pub const DSP_COEF_SIZE: usize = 0x0800;
/// DSP hardware register window, mapped at 0xff00
pub const DSP_HWREG_SIZE: usize = 0x0100;

pub const DSP_IRAM_MASK: u16 = 0x0fff;
pub const DSP_IROM_MASK: u16 = 0x0fff;
pub const DSP_DRAM_MASK: u16 = 0x0fff;
pub const DSP_COEF_MASK: u16 = 0x07ff;
