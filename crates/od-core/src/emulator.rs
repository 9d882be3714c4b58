//! Emulation session state

use crate::config::Config;
use crate::error::{EmulatorError, Result};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulatorState {
    /// Not running
    Stopped,
    /// Cores are being scheduled
    Running,
    /// Scheduling suspended, state preserved
    Paused,
    /// Stopped by a host-fatal error
    Aborted,
}

/// Emulation session: configuration plus the run state shared by every core
pub struct Emulator {
    state: EmulatorState,
    config: Config,
    last_error: Option<String>,
}

impl Emulator {
    /// Create a new session after validating the configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: EmulatorState::Stopped,
            config,
            last_error: None,
        })
    }

    /// Get the current state
    pub fn state(&self) -> EmulatorState {
        self.state
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start the session
    pub fn start(&mut self) -> Result<()> {
        self.state = EmulatorState::Running;
        self.last_error = None;
        tracing::info!("Emulation started");
        Ok(())
    }

    /// Pause the session
    pub fn pause(&mut self) {
        if self.state == EmulatorState::Running {
            self.state = EmulatorState::Paused;
            tracing::info!("Emulation paused");
        }
    }

    /// Resume the session
    pub fn resume(&mut self) {
        if self.state == EmulatorState::Paused {
            self.state = EmulatorState::Running;
            tracing::info!("Emulation resumed");
        }
    }

    /// Stop the session
    pub fn stop(&mut self) {
        self.state = EmulatorState::Stopped;
        tracing::info!("Emulation stopped");
    }

    /// Abort the session with a host-fatal error
    pub fn abort(&mut self, err: &EmulatorError) {
        tracing::error!("Emulation aborted: {}", err);
        self.last_error = Some(err.to_string());
        self.state = EmulatorState::Aborted;
    }

    /// Diagnostic of the error that aborted the session, if any
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Check if the session is running
    pub fn is_running(&self) -> bool {
        self.state == EmulatorState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DspError;

    #[test]
    fn test_emulator_creation() {
        let emu = Emulator::new(Config::default()).unwrap();
        assert_eq!(emu.state(), EmulatorState::Stopped);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.dsp.cycles_per_slice = 0;
        assert!(Emulator::new(config).is_err());
    }

    #[test]
    fn test_emulator_state_transitions() {
        let mut emu = Emulator::new(Config::default()).unwrap();

        emu.start().unwrap();
        assert!(emu.is_running());

        emu.pause();
        assert_eq!(emu.state(), EmulatorState::Paused);

        emu.resume();
        assert!(emu.is_running());

        emu.stop();
        assert_eq!(emu.state(), EmulatorState::Stopped);
    }

    #[test]
    fn test_abort_records_diagnostic() {
        let mut emu = Emulator::new(Config::default()).unwrap();
        emu.start().unwrap();

        emu.abort(&DspError::UnknownOpcode { pc: 0x20, opcode: 0xffff }.into());
        assert_eq!(emu.state(), EmulatorState::Aborted);
        assert!(emu.last_error().unwrap().contains("0xffff"));
    }
}
