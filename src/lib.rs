//! tcprelay Library
//!
//! Transparent TCP relay: accepts clients on a local port and fans their
//! byte stream out to one or more remote endpoints, relaying every remote's
//! responses back to the client.

pub mod config;
pub mod connection;
pub mod logging;
pub mod prompt;
pub mod relay;
pub mod shutdown;

pub use config::{ProxyConfig, RemoteEndpoint};
pub use connection::{run_proxy_server, ConnectionManager};
pub use logging::{RelayLog, SharedLog, TracingLog};
pub use shutdown::{ShutdownCoordinator, ShutdownListener};

/// Common error type for the relay
pub type Result<T> = anyhow::Result<T>;
