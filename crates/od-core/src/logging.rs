//! Logging infrastructure for oxidized-dolphin

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, DebugConfig, LogLevel};

/// Map a configured level onto a tracing level
pub fn level_for(level: LogLevel) -> Option<Level> {
    match level {
        LogLevel::Off => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Trace => Some(Level::TRACE),
    }
}

fn filter_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Off => "off",
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

/// Effective level of each subsystem's log target: its cap, or the global
/// level when that is quieter
pub fn target_levels(debug: &DebugConfig) -> [(&'static str, LogLevel); 3] {
    let caps = &debug.targets;
    [("ppc", caps.ppc), ("jit", caps.jit), ("dsp", caps.dsp)]
        .map(|(target, cap)| (target, cap.min(debug.log_level)))
}

fn target_directives(debug: &DebugConfig) -> Vec<Directive> {
    target_levels(debug)
        .into_iter()
        .filter_map(|(target, level)| format!("{target}={}", filter_name(level)).parse().ok())
        .collect()
}

/// Initialize the logging system based on configuration
pub fn init(config: &Config) {
    let Some(level) = level_for(config.debug.log_level) else {
        return;
    };

    let filter = target_directives(&config.debug)
        .into_iter()
        .fold(EnvFilter::from_default_env().add_directive(level.into()), |filter, directive| {
            filter.add_directive(directive)
        });

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true),
    );

    if config.debug.log_to_file {
        if let Ok(file) = std::fs::File::create(&config.debug.log_path) {
            let file_layer = fmt::layer().with_writer(file).with_ansi(false);
            let _ = subscriber.with(file_layer).try_init();
        } else {
            let _ = subscriber.try_init();
        }
    } else {
        let _ = subscriber.try_init();
    }
}

/// Initialize logging with default settings (for tests and quick starts)
pub fn init_default() {
    let filter = EnvFilter::from_default_env()
        .add_directive(Level::INFO.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

// Convenience macros for component-specific logging

/// Log a PowerPC trace message
#[macro_export]
macro_rules! ppc_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "ppc", $($arg)*)
    };
}

/// Log a PowerPC debug message
#[macro_export]
macro_rules! ppc_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "ppc", $($arg)*)
    };
}

/// Log a recompiler debug message
#[macro_export]
macro_rules! jit_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "jit", $($arg)*)
    };
}

/// Log a recompiler trace message
#[macro_export]
macro_rules! jit_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "jit", $($arg)*)
    };
}

/// Log a DSP trace message
#[macro_export]
macro_rules! dsp_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "dsp", $($arg)*)
    };
}

/// Log a DSP debug message
#[macro_export]
macro_rules! dsp_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "dsp", $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_for(LogLevel::Off), None);
        assert_eq!(level_for(LogLevel::Warn), Some(Level::WARN));
        assert_eq!(level_for(LogLevel::Trace), Some(Level::TRACE));
    }

    #[test]
    fn test_target_levels_are_capped_by_global() {
        let mut debug = DebugConfig {
            log_level: LogLevel::Trace,
            ..DebugConfig::default()
        };
        assert_eq!(
            target_levels(&debug),
            [("ppc", LogLevel::Debug), ("jit", LogLevel::Trace), ("dsp", LogLevel::Debug)]
        );

        debug.log_level = LogLevel::Warn;
        assert!(target_levels(&debug).iter().all(|&(_, level)| level == LogLevel::Warn));
        assert_eq!(target_directives(&debug).len(), 3);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_default();
        init_default();
        crate::dsp_debug!("logging initialized twice");
    }
}
