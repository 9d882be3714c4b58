//! Gekko recompiler for oxidized-dolphin
//!
//! Compiles PowerPC blocks into [`od_emitter`] host code. Floating-point
//! instructions are compiled natively when the result provably matches the
//! hardware, otherwise through soft-float helper calls or the interpreter.

pub mod fp;
pub mod guest;
pub mod jit;
pub mod regcache;

pub use fp::{CrorFold, Fallback};
pub use guest::{PpcGuestContext, PpcGuestOp, SoftForm, SoftOp};
pub use jit::{CompiledBlock, Jit64, JitStats, MAX_BLOCK_INSTRUCTIONS};
pub use regcache::FpuRegCache;
