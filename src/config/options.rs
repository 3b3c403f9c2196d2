//! Configuration Option Schema
//!
//! Every externally settable option is a variant of [`ConfigOption`]. Each
//! variant knows its name, its environment variable, how to parse a raw
//! string, what makes the value valid, and which field it writes.

use anyhow::{bail, Context};
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ProxyConfig, RemoteEndpoint};
use crate::Result;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Upper bound on the relay buffer
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOption {
    Remotes,
    BindAddr,
    LocalPort,
    BufferSize,
    Timeout,
    LogLevel,
    LogData,
    DataLogFile,
}

impl ConfigOption {
    pub const ALL: [ConfigOption; 8] = [
        ConfigOption::Remotes,
        ConfigOption::BindAddr,
        ConfigOption::LocalPort,
        ConfigOption::BufferSize,
        ConfigOption::Timeout,
        ConfigOption::LogLevel,
        ConfigOption::LogData,
        ConfigOption::DataLogFile,
    ];

    /// Name used by `--set name=value`
    pub fn name(self) -> &'static str {
        match self {
            ConfigOption::Remotes => "remotes",
            ConfigOption::BindAddr => "bind_addr",
            ConfigOption::LocalPort => "local_port",
            ConfigOption::BufferSize => "buffer_size",
            ConfigOption::Timeout => "timeout",
            ConfigOption::LogLevel => "log_level",
            ConfigOption::LogData => "log_data",
            ConfigOption::DataLogFile => "data_log_file",
        }
    }

    pub fn env_var(self) -> &'static str {
        match self {
            ConfigOption::Remotes => "TCPRELAY_REMOTES",
            ConfigOption::BindAddr => "TCPRELAY_BIND_ADDR",
            ConfigOption::LocalPort => "TCPRELAY_LOCAL_PORT",
            ConfigOption::BufferSize => "TCPRELAY_BUFFER_SIZE",
            ConfigOption::Timeout => "TCPRELAY_TIMEOUT",
            ConfigOption::LogLevel => "TCPRELAY_LOG_LEVEL",
            ConfigOption::LogData => "TCPRELAY_LOG_DATA",
            ConfigOption::DataLogFile => "TCPRELAY_DATA_LOG_FILE",
        }
    }

    /// Parse, validate and store `value` in the field this option targets
    pub fn apply(self, config: &mut ProxyConfig, value: &str) -> Result<()> {
        let value = value.trim();
        match self {
            ConfigOption::Remotes => {
                let remotes = value
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(RemoteEndpoint::from_str)
                    .collect::<Result<Vec<_>>>()?;
                if remotes.is_empty() {
                    bail!("remotes needs at least one host:port entry");
                }
                config.remotes = remotes;
            }
            ConfigOption::BindAddr => {
                config.bind_addr = value
                    .parse::<IpAddr>()
                    .with_context(|| format!("invalid bind address '{}'", value))?;
            }
            ConfigOption::LocalPort => {
                config.local_port = value
                    .parse::<u16>()
                    .with_context(|| format!("invalid local port '{}'", value))?;
            }
            ConfigOption::BufferSize => {
                let size = value
                    .parse::<usize>()
                    .with_context(|| format!("invalid buffer size '{}'", value))?;
                validate_buffer_size(size)?;
                config.buffer_size = size;
            }
            ConfigOption::Timeout => {
                config.timeout = parse_timeout(value)?;
            }
            ConfigOption::LogLevel => {
                let level = value.to_lowercase();
                validate_log_level(&level)?;
                config.logging.level = level;
            }
            ConfigOption::LogData => {
                config.logging.log_data = value
                    .parse::<bool>()
                    .with_context(|| format!("invalid log_data flag '{}'", value))?;
            }
            ConfigOption::DataLogFile => {
                config.logging.data_log_file = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
        }
        Ok(())
    }
}

impl FromStr for ConfigOption {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_lowercase();
        ConfigOption::ALL
            .into_iter()
            .find(|opt| opt.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = ConfigOption::ALL.iter().map(|o| o.name()).collect();
                anyhow::anyhow!("unknown option '{}' (known: {})", s, known.join(", "))
            })
    }
}

/// Accepts plain seconds (`30`) or a humantime duration (`1m 30s`)
fn parse_timeout(value: &str) -> Result<std::time::Duration> {
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(std::time::Duration::from_secs(secs));
    }
    humantime::parse_duration(value).with_context(|| format!("invalid timeout '{}'", value))
}

pub(crate) fn validate_buffer_size(size: usize) -> Result<()> {
    if size == 0 {
        bail!("buffer_size must be greater than 0");
    }
    if size > MAX_BUFFER_SIZE {
        bail!("buffer_size cannot exceed 1MB");
    }
    Ok(())
}

pub(crate) fn validate_log_level(level: &str) -> Result<()> {
    if !VALID_LOG_LEVELS.contains(&level) {
        bail!("log level must be one of: {}", VALID_LOG_LEVELS.join(", "));
    }
    Ok(())
}

/// Apply a `name=value` assignment
pub fn apply_assignment(config: &mut ProxyConfig, assignment: &str) -> Result<()> {
    let (name, value) = assignment
        .split_once('=')
        .with_context(|| format!("expected name=value, got '{}'", assignment))?;
    let option: ConfigOption = name.parse()?;
    option
        .apply(config, value)
        .with_context(|| format!("failed to set {}", option.name()))
}
