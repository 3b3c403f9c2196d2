//! Relay log sink
//!
//! The relay core reports everything it does through [`RelayLog`]. The
//! production sink forwards to `tracing` and can also append chunk dumps
//! to a data log file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;

use anyhow::Context;
use tracing::{debug, error, info, warn};

use super::hexdump::{hex_dump, hex_line};
use crate::config::LoggingConfig;
use crate::Result;

/// Log collaborator injected into the relay core
pub trait RelayLog: Send + Sync {
    fn info(&self, message: &str);

    fn warning(&self, message: &str);

    /// An unexpected failure together with its cause
    fn error(&self, message: &str, cause: &(dyn std::error::Error + 'static));

    /// One chunk moved in the given direction
    fn chunk(&self, direction: &str, data: &[u8]);
}

/// Sink backed by `tracing`, with an optional data log file
pub struct TracingLog {
    log_data: bool,
    data_file: Option<Mutex<BufWriter<File>>>,
}

impl TracingLog {
    pub fn new(log_data: bool) -> Self {
        Self {
            log_data,
            data_file: None,
        }
    }

    /// Sink matching the `[logging]` settings, opening the data log file if set
    pub fn from_config(config: &LoggingConfig) -> Result<Self> {
        let mut sink = Self::new(config.log_data);
        if let Some(path) = &config.data_log_file {
            sink = sink.with_data_file(path)?;
        }
        Ok(sink)
    }

    /// Append chunk dumps to `path`. Implies data logging.
    pub fn with_data_file(mut self, path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open data log file: {}", path.display()))?;
        self.log_data = true;
        self.data_file = Some(Mutex::new(BufWriter::new(file)));
        Ok(self)
    }

    fn write_data_file(&self, direction: &str, data: &[u8]) {
        let Some(file) = &self.data_file else {
            return;
        };
        let stamp = humantime::format_rfc3339_millis(SystemTime::now());
        let record = format!(
            "{} {} ({} bytes)\n{}\n",
            stamp,
            direction,
            data.len(),
            hex_dump(data)
        );

        let mut writer = match file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writer
            .write_all(record.as_bytes())
            .and_then(|_| writer.flush())
        {
            warn!("Failed to write data log: {}", e);
        }
    }
}

impl RelayLog for TracingLog {
    fn info(&self, message: &str) {
        info!("{}", message);
    }

    fn warning(&self, message: &str) {
        warn!("{}", message);
    }

    fn error(&self, message: &str, cause: &(dyn std::error::Error + 'static)) {
        let mut detail = cause.to_string();
        let mut source = cause.source();
        while let Some(inner) = source {
            detail.push_str(": ");
            detail.push_str(&inner.to_string());
            source = inner.source();
        }
        error!("{}: {}", message, detail);
    }

    fn chunk(&self, direction: &str, data: &[u8]) {
        if !self.log_data {
            return;
        }
        debug!("{} ({} bytes): {}", direction, data.len(), hex_line(data));
        self.write_data_file(direction, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_file_receives_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.log");

        let sink = TracingLog::new(false).with_data_file(&path).unwrap();
        sink.chunk("client -> 10.0.0.1:1000", b"PING");
        sink.chunk("10.0.0.1:1000 -> client", b"PONG");

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("client -> 10.0.0.1:1000 (4 bytes)"));
        assert!(content.contains("50 49 4E 47"));
        assert!(content.contains("PONG"));
    }

    #[test]
    fn test_chunks_ignored_without_data_logging() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.log");
        std::fs::write(&path, "").unwrap();

        let sink = TracingLog::new(false);
        sink.chunk("a -> b", b"xyz");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
