//! GameCube/Wii DSP for oxidized-dolphin
//!
//! The DSP is a 16-bit word-addressed core with 40-bit accumulators,
//! hardware call and loop stacks and an extended-opcode slot that lets
//! most arithmetic instructions also move data. [`DspInterpreter`] executes
//! it one instruction at a time; [`DspJit`] compiles blocks into
//! [`od_emitter`] host code with native branches, loops and block linking.

pub mod addressing;
pub mod analyzer;
pub mod condition;
pub mod ext_ops;
pub mod guest;
pub mod interpreter;
pub mod jit;
pub mod registers;
pub mod tables;
pub mod thread;

pub use analyzer::Analyzer;
pub use condition::{check_condition, Condition};
pub use guest::{BlockId, DspGuestContext, DspGuestOp, LinkTarget, LINK_BIT};
pub use interpreter::DspInterpreter;
pub use jit::{emit_condition_skip, DspBlock, DspJit, DspJitStats};
pub use registers::{DspRegisters, SrFlags, StackReg};
pub use tables::{
    has_ext_opcode, instruction_size, AccOperand, DspOpcode, ExtOpcode, LogicOp, MulSource, ProductMove,
    ShiftKind,
};
pub use thread::{DspThread, DspThreadState};
