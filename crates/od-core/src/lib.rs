//! Core infrastructure for oxidized-dolphin
//!
//! Configuration, the error taxonomy shared by every emulated core, logging
//! setup and the top-level emulator session state.

pub mod config;
pub mod emulator;
pub mod error;
pub mod logging;

pub use config::Config;
pub use emulator::{Emulator, EmulatorState};
pub use error::{EmulatorError, Result};
