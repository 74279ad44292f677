//! Per-container engine log configuration.

use serde::{Deserialize, Serialize};

/// Log level of the engine's per-container log file.
///
/// Numeric representation matches the engine's own level ordering, lowest
/// (most verbose) first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum LogLevel {
    /// Finest-grained tracing.
    Trace = 0,
    /// Debug detail.
    Debug = 1,
    /// Informational messages.
    Info = 2,
    /// Normal but significant conditions.
    Notice = 3,
    /// Warnings.
    Warn = 4,
    /// Errors.
    Error = 5,
    /// Critical conditions.
    Crit = 6,
    /// Action must be taken immediately.
    Alert = 7,
    /// The engine is unusable.
    Fatal = 8,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Error
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Crit => "CRIT",
            Self::Alert => "ALERT",
            Self::Fatal => "FATAL",
        };
        write!(f, "{s}")
    }
}
