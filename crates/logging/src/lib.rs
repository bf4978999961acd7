//! EquityCraft Logging
//!
//! One `tracing-subscriber` setup shared by every EquityCraft binary.
//! Workspace crates log at the requested level; everything else is held
//! at `warn`. `RUST_LOG` overrides both.
//!
//! ```no_run
//! use equitycraft_logging::{init, LogLevel};
//!
//! // -v / -vv on the command line
//! init(LogLevel::from_verbosity(1));
//! ```

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// Crates whose events follow the requested level
const WORKSPACE_TARGETS: &[&str] = &[
    "equitycraft",
    "equitycraft_core",
    "equitycraft_settlement",
    "equitycraft_store",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// `false` → `Info`, `true` → `Debug`
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Self::Debug
        } else {
            Self::Info
        }
    }

    /// `0` → `Info`, `1` → `Debug`, `2+` → `Trace`
    pub fn from_verbosity(count: u8) -> Self {
        match count {
            0 => Self::Info,
            1 => Self::Debug,
            _ => Self::Trace,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Filter directive: dependencies at `warn` (or quieter), workspace
    /// crates at this level
    pub fn directive(&self) -> String {
        let base = (*self).min(LogLevel::Warn).as_str();
        let mut directive = base.to_string();
        for target in WORKSPACE_TARGETS {
            directive.push_str(&format!(",{}={}", target, self.as_str()));
        }
        directive
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()))
}

/// Install the global subscriber.
///
/// A second call leaves the first subscriber in place and reports it on
/// stderr.
pub fn init(level: LogLevel) {
    if let Err(e) = try_init(level) {
        eprintln!("logging already initialized: {e}");
    }
}

/// Install the global subscriber, failing if one is already set
pub fn try_init(level: LogLevel) -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(level >= LogLevel::Debug)
        .try_init()
        .map_err(|e| e.to_string())
}

/// Subscriber for tests (output captured by the test harness)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(LogLevel::Debug.directive()))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_verbose() {
        assert_eq!(LogLevel::from_verbose(false), LogLevel::Info);
        assert_eq!(LogLevel::from_verbose(true), LogLevel::Debug);
    }

    #[test]
    fn test_log_level_from_verbosity() {
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Info);
        assert_eq!(LogLevel::from_verbosity(1), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbosity(7), LogLevel::Trace);
    }

    #[test]
    fn test_directive_keeps_dependencies_quiet() {
        let directive = LogLevel::Trace.directive();
        assert!(directive.starts_with("warn,"));
        assert!(directive.contains("equitycraft_settlement=trace"));

        assert!(LogLevel::Error.directive().starts_with("error,"));
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_init_test_is_repeatable() {
        init_test();
        init_test();
        tracing::info!("test subscriber installed");
    }
}
