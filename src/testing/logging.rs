//! A logger that keeps what it receives.

use crate::logger::{Level, Logger, SharedLogger};
use std::sync::{Arc, Mutex, PoisonError};

/// Records every message for later inspection.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    messages: Mutex<Vec<(Level, String)>>,
}

impl RecordingLogger {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The same logger as a [`SharedLogger`] for attaching to streams and selections.
    #[must_use]
    pub fn shared(self: &Arc<Self>) -> SharedLogger {
        Arc::clone(self) as SharedLogger
    }

    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Messages logged at `level` or above.
    pub fn at_least(&self, level: Level) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(l, _)| *l >= level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, message: &str, level: Level) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_string()));
    }
}
