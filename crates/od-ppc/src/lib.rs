//! Gekko (GameCube/Wii PowerPC) CPU emulation for oxidized-dolphin
//!
//! The floating-point unit is emulated in software: operands are decomposed
//! into [`fp_temp::FpTemp`], combined by the cores in [`soft_float`] and
//! rounded once, reproducing the hardware's results and FPSCR bits exactly.

pub mod decoder;
pub mod fp_temp;
pub mod fp_utils;
pub mod fpscr;
pub mod instructions;
pub mod interpreter;
pub mod soft_float;
pub mod thread;

pub use decoder::PpcDecoder;
pub use fp_utils::FpResult;
pub use fpscr::{Fpscr, FpscrFlags, RoundingMode};
pub use interpreter::PpcInterpreter;
pub use thread::{PpcRegisters, PpcThread, PpcThreadState};
