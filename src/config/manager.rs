//! Configuration Manager

use super::options::{self, ConfigOption};
use super::{ProxyConfig, RemoteEndpoint};
use crate::Result;
use anyhow::Context;
use std::path::Path;

/// Manages configuration loading, validation and persistence
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from a settings file, falling back to defaults when it is missing
    pub fn load_from_file(path: &Path) -> Result<ProxyConfig> {
        Self::load_layered(path, |_| None)
    }

    /// Defaults, then `TCPRELAY_*` variables, then every key the settings file sets
    pub fn load_with_env(path: &Path) -> Result<ProxyConfig> {
        Self::load_layered(path, |name| std::env::var(name).ok())
    }

    /// Same as [`ConfigManager::load_with_env`] with an injectable lookup
    pub fn load_layered<F>(path: &Path, lookup: F) -> Result<ProxyConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut base = ProxyConfig::default();
        Self::apply_env_from(&mut base, lookup)?;

        if !path.exists() {
            tracing::warn!(
                "Configuration file not found at {}, using defaults and environment",
                path.display()
            );
            return Ok(base);
        }

        tracing::info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let file: toml::Value = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        let mut merged =
            toml::Value::try_from(&base).context("Failed to serialize configuration")?;
        overlay(&mut merged, file);
        let config = merged
            .try_into::<ProxyConfig>()
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        tracing::info!("Configuration loaded and validated successfully");
        Ok(config)
    }

    /// Overlay `TCPRELAY_*` values returned by `lookup` onto `config`
    pub fn apply_env_from<F>(config: &mut ProxyConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        for option in ConfigOption::ALL {
            if let Some(value) = lookup(option.env_var()) {
                option
                    .apply(config, &value)
                    .with_context(|| format!("Invalid {}: {}", option.env_var(), value))?;
            }
        }
        Ok(())
    }

    /// Write the configuration as TOML
    pub fn save_to_file(config: &ProxyConfig, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(config).context("Failed to serialize configuration")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// Replace values in `base` with those in `file`, descending into tables
fn overlay(base: &mut toml::Value, file: toml::Value) {
    match (base, file) {
        (toml::Value::Table(base), toml::Value::Table(file)) => {
            for (key, value) in file {
                match base.get_mut(&key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, value) => *base = value,
    }
}

impl ProxyConfig {
    /// Validate the configuration. An empty remote list is allowed here.
    pub fn validate(&self) -> Result<()> {
        options::validate_buffer_size(self.buffer_size)
            .with_context(|| "Server configuration validation failed")?;
        options::validate_log_level(&self.logging.level)
            .with_context(|| "Logging configuration validation failed")?;
        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        remotes: &[RemoteEndpoint],
        bind: Option<std::net::IpAddr>,
        port: Option<u16>,
        buffer_size: Option<usize>,
        timeout: Option<u64>,
    ) {
        if !remotes.is_empty() {
            self.remotes = remotes.to_vec();
            tracing::info!("CLI override: {} remote endpoint(s)", remotes.len());
        }

        if let Some(addr) = bind {
            self.bind_addr = addr;
            tracing::info!("CLI override: bind address set to {}", addr);
        }

        if let Some(port) = port {
            self.local_port = port;
            tracing::info!("CLI override: port set to {}", port);
        }

        if let Some(buffer_size) = buffer_size {
            self.buffer_size = buffer_size;
            tracing::info!("CLI override: buffer size set to {} bytes", buffer_size);
        }

        if let Some(timeout_secs) = timeout {
            self.timeout = std::time::Duration::from_secs(timeout_secs);
            tracing::info!("CLI override: timeout set to {}s", timeout_secs);
        }
    }
}
