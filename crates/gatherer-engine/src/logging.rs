//! Log level derived from the configuration flags.
//!
//! The engine only emits `tracing` events; installing a subscriber is the
//! binary's job.

use std::fmt;

/// Verbosity requested by `verbose`/`debug`/`quiet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    /// `quiet` wins over everything, then `debug`, then `verbose`. With no
    /// flag set only warnings and errors are shown.
    pub fn from_flags(verbose: bool, debug: bool, quiet: bool) -> Self {
        match (quiet, debug, verbose) {
            (true, _, _) => Self::Error,
            (false, true, _) => Self::Debug,
            (false, false, true) => Self::Info,
            (false, false, false) => Self::Warn,
        }
    }

    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
