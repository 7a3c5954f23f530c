//! Installer-facing progress trail.
//!
//! Separate from `tracing` diagnostics: this is the human-readable log an
//! operator reads after an upgrade, so every sink receives plain messages.

use parking_lot::Mutex;
use std::sync::Arc;

/// Sink for installer-facing progress messages.
pub trait InstallLog: Send + Sync {
    /// Append a message.
    fn log(&self, message: &str);
}

/// Forwards messages to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInstallLog;

impl InstallLog for TracingInstallLog {
    fn log(&self, message: &str) {
        tracing::info!(target: "schemaflow::install", "{}", message);
    }
}

/// In-memory log for testing.
#[derive(Debug, Default, Clone)]
pub struct MemoryInstallLog {
    messages: Arc<Mutex<Vec<String>>>,
}

impl MemoryInstallLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages logged so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Whether any message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.messages.lock().iter().any(|m| m.contains(needle))
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl InstallLog for MemoryInstallLog {
    fn log(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

/// Discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullInstallLog;

impl InstallLog for NullInstallLog {
    fn log(&self, _message: &str) {}
}
