//! DSP instruction and data memory
//!
//! The DSP addresses 16-bit words. Instruction memory holds IRAM at
//! 0x0000 and IROM at 0x8000; data memory holds DRAM at 0x0000, the
//! coefficient ROM at 0x1000 and the hardware register window at 0xff00.
//! Anything else reads as zero and ignores writes.

use od_core::error::DspError;

use crate::constants::*;

/// Word-addressed DSP memory as seen by the DSP core
pub trait DspMemory: Send {
    fn read_imem(&self, addr: u16) -> u16;
    fn write_imem(&mut self, addr: u16, value: u16);
    fn read_dmem(&self, addr: u16) -> u16;
    fn write_dmem(&mut self, addr: u16, value: u16);
}

/// Plain RAM/ROM implementation of [`DspMemory`]
pub struct DspRam {
    iram: Box<[u16]>,
    irom: Box<[u16]>,
    dram: Box<[u16]>,
    coef: Box<[u16]>,
    hwreg: Box<[u16]>,
}

impl DspRam {
    pub fn new() -> Self {
        Self {
            iram: vec![0; DSP_IRAM_SIZE].into_boxed_slice(),
            irom: vec![0; DSP_IROM_SIZE].into_boxed_slice(),
            dram: vec![0; DSP_DRAM_SIZE].into_boxed_slice(),
            coef: vec![0; DSP_COEF_SIZE].into_boxed_slice(),
            hwreg: vec![0; DSP_HWREG_SIZE].into_boxed_slice(),
        }
    }

    /// Load a big-endian ucode image into IRAM starting at word 0
    pub fn load_ucode(&mut self, image: &[u8]) -> Result<(), DspError> {
        if image.len() % 2 != 0 {
            return Err(DspError::OddImageLength { len: image.len() });
        }
        let words = image.len() / 2;
        if words > DSP_IRAM_SIZE {
            return Err(DspError::ImageTooLarge { words });
        }
        for (slot, pair) in self.iram.iter_mut().zip(image.chunks_exact(2)) {
            *slot = u16::from_be_bytes([pair[0], pair[1]]);
        }
        tracing::debug!(target: "dsp", "Loaded {} word ucode into IRAM", words);
        Ok(())
    }

    /// Copy words into IRAM starting at word 0
    pub fn load_iram_words(&mut self, words: &[u16]) -> Result<(), DspError> {
        if words.len() > DSP_IRAM_SIZE {
            return Err(DspError::ImageTooLarge { words: words.len() });
        }
        self.iram[..words.len()].copy_from_slice(words);
        Ok(())
    }

    /// Zero IRAM, as the boot ROM does before a ucode upload
    pub fn clear_iram(&mut self) {
        self.iram.fill(0);
    }

    pub fn load_coef(&mut self, words: &[u16]) {
        let len = words.len().min(DSP_COEF_SIZE);
        self.coef[..len].copy_from_slice(&words[..len]);
    }
}

impl Default for DspRam {
    fn default() -> Self {
        Self::new()
    }
}

impl DspMemory for DspRam {
    fn read_imem(&self, addr: u16) -> u16 {
        match addr >> 12 {
            0x0 => self.iram[(addr & DSP_IRAM_MASK) as usize],
            0x8 => self.irom[(addr & DSP_IROM_MASK) as usize],
            _ => {
                tracing::warn!(target: "dsp", "Instruction fetch from unmapped 0x{:04x}", addr);
                0
            }
        }
    }

    fn write_imem(&mut self, addr: u16, value: u16) {
        match addr >> 12 {
            0x0 => self.iram[(addr & DSP_IRAM_MASK) as usize] = value,
            _ => tracing::warn!(target: "dsp", "Write to read-only imem 0x{:04x}", addr),
        }
    }

    fn read_dmem(&self, addr: u16) -> u16 {
        match addr >> 12 {
            0x0 => self.dram[(addr & DSP_DRAM_MASK) as usize],
            0x1 => self.coef[(addr & DSP_COEF_MASK) as usize],
            0xf if addr >= 0xff00 => self.hwreg[(addr & 0xff) as usize],
            _ => {
                tracing::warn!(target: "dsp", "Read from unmapped dmem 0x{:04x}", addr);
                0
            }
        }
    }

    fn write_dmem(&mut self, addr: u16, value: u16) {
        match addr >> 12 {
            0x0 => self.dram[(addr & DSP_DRAM_MASK) as usize] = value,
            0xf if addr >= 0xff00 => self.hwreg[(addr & 0xff) as usize] = value,
            _ => tracing::warn!(target: "dsp", "Write to unmapped dmem 0x{:04x}", addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ucode_load_is_big_endian() {
        let mut ram = DspRam::new();
        ram.load_ucode(&[0x12, 0x34, 0xab, 0xcd]).unwrap();
        assert_eq!(ram.read_imem(0), 0x1234);
        assert_eq!(ram.read_imem(1), 0xabcd);
    }

    #[test]
    fn test_ucode_load_rejects_odd_length() {
        let mut ram = DspRam::new();
        assert_eq!(
            ram.load_ucode(&[0, 1, 2]),
            Err(DspError::OddImageLength { len: 3 })
        );
    }

    #[test]
    fn test_irom_is_read_only() {
        let mut ram = DspRam::new();
        ram.write_imem(0x8010, 0x5555);
        assert_eq!(ram.read_imem(0x8010), 0);
    }

    #[test]
    fn test_coef_rom_window() {
        let mut ram = DspRam::new();
        ram.load_coef(&[0x0800, 0x0801]);
        assert_eq!(ram.read_dmem(0x1001), 0x0801);
        ram.write_dmem(0x1001, 0);
        assert_eq!(ram.read_dmem(0x1001), 0x0801);
    }

    #[test]
    fn test_hardware_register_window() {
        let mut ram = DspRam::new();
        ram.write_dmem(0xfffe, 0x8000);
        assert_eq!(ram.read_dmem(0xfffe), 0x8000);
        assert_eq!(ram.read_dmem(0xf000), 0);
    }
}
