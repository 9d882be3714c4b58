//! Memory for oxidized-dolphin
//!
//! [`MemoryManager`] backs the Gekko's big-endian main RAM and is shared
//! between the interpreter and the recompiler. [`DspRam`] is the DSP's
//! word-addressed instruction and data memory, reached through the
//! [`DspMemory`] trait so the DSP core never sees the backing store.

pub mod constants;
pub mod dsp;
pub mod manager;

pub use dsp::{DspMemory, DspRam};
pub use manager::MemoryManager;
