//! Error types for oxidized-dolphin
//!
//! Guest-visible floating-point exceptions are not errors: they live in the
//! FPSCR of the emulated CPU. Everything here is host-side and aborts the
//! operation that produced it.

use thiserror::Error;

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Top-level emulator error
#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("PowerPC error: {0}")]
    Ppc(#[from] PpcError),

    #[error("DSP error: {0}")]
    Dsp(#[from] DspError),

    #[error("JIT error: {0}")]
    Jit(#[from] JitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading/validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Guest memory access errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("address 0x{addr:08x} is not mapped")]
    Unmapped { addr: u32 },

    #[error("access of {size} bytes at 0x{addr:08x} crosses the end of its region")]
    OutOfRange { addr: u32, size: usize },

    #[error("image of {len} bytes does not fit at 0x{addr:08x}")]
    ImageTooLarge { addr: u32, len: usize },
}

/// PowerPC (Gekko) core errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PpcError {
    #[error("invalid instruction 0x{opcode:08x} at 0x{addr:08x}")]
    InvalidInstruction { addr: u32, opcode: u32 },

    #[error("instruction fetch failed at 0x{addr:08x}: {source}")]
    Fetch {
        addr: u32,
        #[source]
        source: MemoryError,
    },

    #[error("data access failed at 0x{addr:08x}: {source}")]
    DataAccess {
        addr: u32,
        #[source]
        source: MemoryError,
    },
}

/// DSP core errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DspError {
    #[error("unknown DSP opcode 0x{opcode:04x} at 0x{pc:04x}")]
    UnknownOpcode { pc: u16, opcode: u16 },

    #[error("ucode image has odd length {len}")]
    OddImageLength { len: usize },

    #[error("ucode image of {words} words does not fit in IRAM")]
    ImageTooLarge { words: usize },
}

/// Recompiler errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JitError {
    #[error("label {label} was used but never bound")]
    UnboundLabel { label: usize },

    #[error("no block compiled at 0x{addr:08x}")]
    MissingBlock { addr: u32 },

    #[error("block at 0x{addr:08x} contains no instructions")]
    EmptyBlock { addr: u32 },

    #[error("host code ran past the end of its buffer at op {index}")]
    RanOffEnd { index: usize },

    #[error("guest fallback failed: {0}")]
    Guest(String),
}

impl From<PpcError> for JitError {
    fn from(err: PpcError) -> Self {
        JitError::Guest(err.to_string())
    }
}

impl From<DspError> for JitError {
    fn from(err: DspError) -> Self {
        JitError::Guest(err.to_string())
    }
}
