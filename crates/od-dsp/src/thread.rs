//! DSP core state

use od_memory::DspMemory;

use crate::analyzer::Analyzer;
use crate::registers::{DspRegisters, CR_HALT};
use crate::tables::instruction_size;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DspThreadState {
    Stopped,
    Running,
    /// Stopped by `halt`
    Halted,
}

/// One emulated DSP: registers, memory and the code analysis over it
pub struct DspThread {
    pub regs: DspRegisters,
    pub state: DspThreadState,
    analyzer: Analyzer,
    memory: Box<dyn DspMemory>,
}

impl DspThread {
    pub fn new(memory: Box<dyn DspMemory>) -> Self {
        let mut thread = Self {
            regs: DspRegisters::default(),
            state: DspThreadState::Stopped,
            analyzer: Analyzer::new(),
            memory,
        };
        thread.analyze();
        thread
    }

    pub fn pc(&self) -> u16 {
        self.regs.pc
    }

    pub fn set_pc(&mut self, addr: u16) {
        self.regs.pc = addr;
    }

    /// Read the word at pc and step past it
    pub fn fetch(&mut self) -> u16 {
        let word = self.memory.read_imem(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        word
    }

    /// Step pc over the instruction it points at
    pub fn skip_instruction(&mut self) {
        let size = instruction_size(self.memory.read_imem(self.regs.pc));
        self.regs.pc = self.regs.pc.wrapping_add(size);
    }

    #[inline]
    pub fn read_imem(&self, addr: u16) -> u16 {
        self.memory.read_imem(addr)
    }

    /// Write one instruction memory word. Loop ends are not rescanned, so
    /// run [`Self::analyze`] after the last word of an upload or use
    /// [`Self::load_imem`]. Callers running compiled code must also
    /// invalidate it.
    pub fn write_imem(&mut self, addr: u16, value: u16) {
        self.memory.write_imem(addr, value);
    }

    /// Upload a ucode to IMEM from address 0, then rescan it once
    pub fn load_imem(&mut self, words: &[u16]) {
        for (addr, &word) in (0..=u16::MAX).zip(words) {
            self.memory.write_imem(addr, word);
        }
        self.analyze();
        od_core::dsp_debug!("loaded {} IMEM words", words.len());
    }

    #[inline]
    pub fn read_dmem(&self, addr: u16) -> u16 {
        self.memory.read_dmem(addr)
    }

    #[inline]
    pub fn write_dmem(&mut self, addr: u16, value: u16) {
        self.memory.write_dmem(addr, value);
    }

    pub fn memory_mut(&mut self) -> &mut dyn DspMemory {
        self.memory.as_mut()
    }

    /// Rescan instruction memory after it changed
    pub fn analyze(&mut self) {
        self.analyzer.analyze(self.memory.as_ref());
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    #[inline]
    pub fn is_loop_end(&self, addr: u16) -> bool {
        self.analyzer.is_loop_end(addr)
    }

    /// Clear the halt bit and mark the core running
    pub fn start(&mut self) {
        self.regs.cr &= !CR_HALT;
        self.state = DspThreadState::Running;
    }

    pub fn stop(&mut self) {
        self.state = DspThreadState::Stopped;
    }

    pub fn is_running(&self) -> bool {
        self.state == DspThreadState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use od_memory::DspRam;

    fn create_test_thread(program: &[u16]) -> DspThread {
        let mut ram = DspRam::new();
        ram.load_iram_words(program).unwrap();
        DspThread::new(Box::new(ram))
    }

    #[test]
    fn test_dsp_thread_creation() {
        let thread = create_test_thread(&[]);
        assert_eq!(thread.state, DspThreadState::Stopped);
        assert_eq!(thread.pc(), 0);
        assert_eq!(thread.regs.wr, [0xffff; 4]);
    }

    #[test]
    fn test_fetch_and_skip() {
        // lri $ar0, #5; nop
        let mut thread = create_test_thread(&[0x0080, 0x0005, 0x0000]);
        thread.skip_instruction();
        assert_eq!(thread.pc(), 2);
        thread.set_pc(0);
        assert_eq!(thread.fetch(), 0x0080);
        assert_eq!(thread.fetch(), 0x0005);
        assert_eq!(thread.pc(), 2);
    }

    #[test]
    fn test_word_writes_defer_analysis() {
        let mut thread = create_test_thread(&[0x0000, 0x0000]);
        // loop $ar0
        thread.write_imem(0, 0x0040);
        assert!(!thread.is_loop_end(1));
        thread.analyze();
        assert!(thread.is_loop_end(1));
    }

    #[test]
    fn test_load_imem_marks_loop_ends() {
        let mut thread = create_test_thread(&[]);
        thread.load_imem(&[
            0x1102, // 0: bloopi #2, 0x0004
            0x0004,
            0x0008, // 2: iar $ar0
            0x0009, // 3: iar $ar1
            0x000a, // 4: iar $ar2
            0x0041, // 5: loop $ar1
            0x000b, // 6: iar $ar3
            0x0021, // 7: halt
        ]);
        assert_eq!(thread.read_imem(7), 0x0021);
        let ends: Vec<u16> = (0..8).filter(|&addr| thread.is_loop_end(addr)).collect();
        assert_eq!(ends, [4, 6]);
    }

    #[test]
    fn test_start_clears_halt() {
        let mut thread = create_test_thread(&[]);
        thread.regs.cr = CR_HALT;
        thread.start();
        assert!(thread.is_running());
        assert_eq!(thread.regs.cr, 0);
        thread.stop();
        assert!(!thread.is_running());
    }
}
