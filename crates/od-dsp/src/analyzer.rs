//! Static pre-scan of instruction memory
//!
//! Walks IRAM and IROM instruction by instruction, recording where
//! instructions start and which addresses end a hardware loop. Both the
//! interpreter and the recompiler check the loop-end flag after executing
//! an instruction.

use bitflags::bitflags;
use od_memory::DspMemory;

use crate::tables::{instruction_size, DspOpcode};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CodeFlags: u8 {
        const START_OF_INST = 0x01;
        /// Last instruction of a hardware loop body
        const LOOP_END      = 0x02;
    }
}

/// Instruction memory regions that hold code
const CODE_REGIONS: [(u16, u16); 2] = [(0x0000, 0x1000), (0x8000, 0x9000)];

pub struct Analyzer {
    flags: Vec<CodeFlags>,
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            flags: vec![CodeFlags::empty(); 0x10000],
        }
    }

    /// Rescan all of instruction memory
    pub fn analyze(&mut self, memory: &dyn DspMemory) {
        self.flags.fill(CodeFlags::empty());
        let mut loops = 0;

        for (start, end) in CODE_REGIONS {
            let mut addr = start;
            while addr < end {
                let opc = memory.read_imem(addr);
                self.flags[addr as usize] |= CodeFlags::START_OF_INST;

                match DspOpcode::decode(opc) {
                    Some(DspOpcode::Loop { .. } | DspOpcode::Loopi { .. }) => {
                        self.mark_loop_end(addr.wrapping_add(1));
                        loops += 1;
                    }
                    Some(DspOpcode::Bloop { .. } | DspOpcode::Bloopi { .. }) => {
                        self.mark_loop_end(memory.read_imem(addr.wrapping_add(1)));
                        loops += 1;
                    }
                    _ => {}
                }
                addr = addr.wrapping_add(instruction_size(opc));
            }
        }
        od_core::dsp_debug!("analyzed instruction memory: {} loops", loops);
    }

    fn mark_loop_end(&mut self, addr: u16) {
        self.flags[addr as usize] |= CodeFlags::LOOP_END;
    }

    pub fn flags(&self, addr: u16) -> CodeFlags {
        self.flags[addr as usize]
    }

    #[inline]
    pub fn is_loop_end(&self, addr: u16) -> bool {
        self.flags[addr as usize].contains(CodeFlags::LOOP_END)
    }

    #[inline]
    pub fn is_start_of_instruction(&self, addr: u16) -> bool {
        self.flags[addr as usize].contains(CodeFlags::START_OF_INST)
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}
