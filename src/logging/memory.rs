//! In-memory sink that records every call, for tests and embedding

use std::sync::Mutex;

use super::RelayLog;

/// One recorded call on the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Info(String),
    Warning(String),
    Error { message: String, cause: String },
    Chunk { direction: String, data: Vec<u8> },
}

/// Sink that keeps every call in memory so tests can assert on them
#[derive(Debug, Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages passed to `warning`, in order
    pub fn warnings(&self) -> Vec<String> {
        self.filter(|e| match e {
            LogEntry::Warning(m) => Some(m.clone()),
            _ => None,
        })
    }

    /// Messages passed to `info`, in order
    pub fn infos(&self) -> Vec<String> {
        self.filter(|e| match e {
            LogEntry::Info(m) => Some(m.clone()),
            _ => None,
        })
    }

    /// `error` calls rendered as `message: cause`
    pub fn errors(&self) -> Vec<String> {
        self.filter(|e| match e {
            LogEntry::Error { message, cause } => Some(format!("{}: {}", message, cause)),
            _ => None,
        })
    }

    /// Concatenated payload of every chunk logged under `direction`
    pub fn chunk_bytes(&self, direction: &str) -> Vec<u8> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                LogEntry::Chunk { direction: d, data } if d == direction => Some(data.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn filter<F>(&self, f: F) -> Vec<String>
    where
        F: Fn(&LogEntry) -> Option<String>,
    {
        self.lock().iter().filter_map(f).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn push(&self, entry: LogEntry) {
        self.lock().push(entry);
    }
}

impl RelayLog for RecordingLog {
    fn info(&self, message: &str) {
        self.push(LogEntry::Info(message.to_string()));
    }

    fn warning(&self, message: &str) {
        self.push(LogEntry::Warning(message.to_string()));
    }

    fn error(&self, message: &str, cause: &(dyn std::error::Error + 'static)) {
        self.push(LogEntry::Error {
            message: message.to_string(),
            cause: cause.to_string(),
        });
    }

    fn chunk(&self, direction: &str, data: &[u8]) {
        self.push(LogEntry::Chunk {
            direction: direction.to_string(),
            data: data.to_vec(),
        });
    }
}
