//! Configuration Types

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

/// A remote address:port the relay forwards traffic to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteEndpoint {
    pub address: String,
    pub port: u16,
}

impl RemoteEndpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

impl FromStr for RemoteEndpoint {
    type Err = anyhow::Error;

    /// Parses `host:port`, `a.b.c.d:port` or `[v6]:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("endpoint '{}' must be in host:port form", s))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            bail!("endpoint '{}' has an empty host", s);
        }
        if host.contains(':') && host.parse::<std::net::Ipv6Addr>().is_err() {
            bail!("endpoint '{}' has an invalid IPv6 address", s);
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| anyhow!("endpoint '{}' has an invalid port '{}'", s, port))?;
        if port == 0 {
            bail!("endpoint '{}' uses port 0", s);
        }

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for RemoteEndpoint {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RemoteEndpoint> for String {
    fn from(endpoint: RemoteEndpoint) -> Self {
        endpoint.to_string()
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Forwarding destinations, in the order they were configured
    pub remotes: Vec<RemoteEndpoint>,
    pub bind_addr: IpAddr,
    pub local_port: u16,
    pub buffer_size: usize,
    /// Bounds connect, read and write. Zero disables it.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit a hex dump of every relayed chunk
    pub log_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_log_file: Option<std::path::PathBuf>,
}

impl ProxyConfig {
    /// The effective I/O timeout, `None` when disabled
    pub fn io_timeout(&self) -> Option<Duration> {
        if self.timeout.is_zero() {
            None
        } else {
            Some(self.timeout)
        }
    }

    pub fn listen_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.bind_addr, self.local_port)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            remotes: Vec::new(),
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
            local_port: 5000,
            buffer_size: 8192,
            timeout: Duration::from_secs(300),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_data: false,
            data_log_file: None,
        }
    }
}
