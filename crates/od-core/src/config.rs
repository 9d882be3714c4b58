//! Emulator configuration
//!
//! Stored as TOML in the platform config directory
//! (`<config_dir>/oxidized-dolphin/config.toml`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Execution engine for an emulated core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Decoder {
    /// Instruction-by-instruction interpreter
    Interpreter,
    /// Dynamic recompiler
    #[default]
    Recompiler,
}

/// Log verbosity, ordered from quietest to most verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Gekko CPU settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    /// Engine used for the PowerPC core
    pub ppc_decoder: Decoder,
    /// Route every flag-producing FP operation through the soft-float core
    /// so results and FPSCR match the interpreter bit-for-bit
    pub accurate_fpu: bool,
    /// Host supports fused multiply-add instructions
    pub host_has_fma: bool,
    /// Host is an Atom-class CPU where packed SSE is slower than scalar
    pub host_is_atom: bool,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            ppc_decoder: Decoder::Recompiler,
            accurate_fpu: true,
            host_has_fma: true,
            host_is_atom: false,
        }
    }
}

/// DSP settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DspConfig {
    /// Engine used for the DSP core
    pub decoder: Decoder,
    /// Maximum number of DSP instructions per compiled block
    pub max_block_size: u16,
    /// DSP cycles executed per scheduler slice
    pub cycles_per_slice: u16,
}

impl Default for DspConfig {
    fn default() -> Self {
        Self {
            decoder: Decoder::Recompiler,
            max_block_size: 250,
            cycles_per_slice: 500,
        }
    }
}

/// Debug and logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
    pub log_to_file: bool,
    pub log_path: PathBuf,
    pub targets: TargetLevels,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_to_file: false,
            log_path: PathBuf::from("oxidized-dolphin.log"),
            targets: TargetLevels::default(),
        }
    }
}

/// Most verbose level each subsystem logs at, never above `log_level`.
/// The Gekko and DSP cores trace every instruction, so their traces are
/// capped off unless raised here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetLevels {
    pub ppc: LogLevel,
    pub jit: LogLevel,
    pub dsp: LogLevel,
}

impl Default for TargetLevels {
    fn default() -> Self {
        Self {
            ppc: LogLevel::Debug,
            jit: LogLevel::Trace,
            dsp: LogLevel::Debug,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub cpu: CpuConfig,
    pub dsp: DspConfig,
    pub debug: DebugConfig,
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("oxidized-dolphin").join("config.toml"))
    }

    /// Load the configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path().ok_or_else(|| ConfigError::Invalid {
            key: "path",
            reason: "no config directory on this platform".to_string(),
        })?;
        Self::load_from(&path)
    }

    /// Load the configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        tracing::debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Write the configuration to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or_else(|| ConfigError::Invalid {
            key: "path",
            reason: "no config directory on this platform".to_string(),
        })?;
        self.save_to(&path)
    }

    /// Reject settings the cores cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dsp.max_block_size == 0 {
            return Err(ConfigError::Invalid {
                key: "dsp.max_block_size",
                reason: "must be at least one instruction".to_string(),
            });
        }
        if self.dsp.cycles_per_slice == 0 {
            return Err(ConfigError::Invalid {
                key: "dsp.cycles_per_slice",
                reason: "must be nonzero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.cpu.accurate_fpu);
        assert_eq!(config.dsp.decoder, Decoder::Recompiler);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [cpu]
            accurate_fpu = false

            [dsp]
            decoder = "Interpreter"
            "#,
        )
        .unwrap();
        assert!(!config.cpu.accurate_fpu);
        assert!(config.cpu.host_has_fma);
        assert_eq!(config.dsp.decoder, Decoder::Interpreter);
        assert_eq!(config.dsp.max_block_size, 250);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let err = Config::from_toml("[dsp]\nmax_block_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "dsp.max_block_size", .. }));
    }

    #[test]
    fn test_target_levels_from_toml() {
        let config = Config::from_toml(
            r#"
            [debug]
            log_level = "Trace"

            [debug.targets]
            dsp = "Trace"
            "#,
        )
        .unwrap();
        assert_eq!(config.debug.targets.dsp, LogLevel::Trace);
        assert_eq!(config.debug.targets.ppc, LogLevel::Debug);
        assert!(LogLevel::Warn < LogLevel::Info);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = Config::default();
        config.debug.log_level = LogLevel::Trace;
        config.debug.targets.jit = LogLevel::Off;
        config.cpu.host_is_atom = true;

        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }
}
