//! Narrow logging interface used by selections, filters and the sort/spill machinery.
//!
//! A stream or selection with a [`Logger`] attached becomes lenient: per-item failures of user
//! functions and expression cycles are reported through the logger instead of aborting the
//! operation. Without a logger those errors propagate.
//!
//! [`TracingLogger`] forwards to the `tracing` macros, so any subscriber installed by the
//! application receives the messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Severity of a log message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        })
    }
}

/// Anything that accepts `log(message, level)`.
pub trait Logger: Send + Sync {
    fn log(&self, message: &str, level: Level);
}

/// Loggers are shared between a stream and the plans it compiles.
pub type SharedLogger = Arc<dyn Logger>;

/// Forwards every message to the matching `tracing` macro.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn shared() -> SharedLogger {
        Arc::new(Self)
    }
}

impl Logger for TracingLogger {
    fn log(&self, message: &str, level: Level) {
        match level {
            Level::Debug => tracing::debug!(target: "tabstream", "{message}"),
            Level::Info => tracing::info!(target: "tabstream", "{message}"),
            Level::Warn => tracing::warn!(target: "tabstream", "{message}"),
            Level::Error => tracing::error!(target: "tabstream", "{message}"),
        }
    }
}

/// Swallows everything. Attaching it makes an operation lenient without any output.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _message: &str, _level: Level) {}
}

impl<F> Logger for F
where
    F: Fn(&str, Level) + Send + Sync,
{
    fn log(&self, message: &str, level: Level) {
        self(message, level);
    }
}
