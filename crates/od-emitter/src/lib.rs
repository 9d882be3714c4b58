//! Host code emission for oxidized-dolphin
//!
//! Recompilers emit x86-64 style instructions into an [`Emitter`], which
//! keeps a near (hot) and far (cold) region and resolves forward branches
//! through [`FixupBranch`] handles. [`Emitter::finish`] lays both regions out
//! into one [`Code`] buffer that a [`Machine`] executes. Anything the host
//! instruction set cannot express is an [`Op::Guest`] call back into the
//! owning core.

pub mod emitter;
pub mod machine;
pub mod ops;

pub use emitter::{Code, Emitter, FixupBranch, Label, Region};
pub use machine::{Flags, Flow, GuestHandler, Machine};
pub use ops::{Cond, Op, Reg, Xmm};
