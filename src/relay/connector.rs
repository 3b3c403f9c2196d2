//! Endpoint Connector

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::net::{lookup_host, TcpStream};
use tracing::debug;

use crate::config::{ProxyConfig, RemoteEndpoint};
use crate::logging::RelayLog;
use crate::shutdown::ShutdownListener;

/// Why a single endpoint could not be reached
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve {
        endpoint: RemoteEndpoint,
        #[source]
        source: io::Error,
    },

    #[error("connection to {endpoint} refused")]
    Refused {
        endpoint: RemoteEndpoint,
        #[source]
        source: io::Error,
    },

    #[error("connection to {endpoint} timed out after {timeout:?}")]
    TimedOut {
        endpoint: RemoteEndpoint,
        timeout: Duration,
    },

    #[error("connection to {endpoint} failed: {source}")]
    Io {
        endpoint: RemoteEndpoint,
        #[source]
        source: io::Error,
    },

    #[error("connection to {endpoint} cancelled by shutdown")]
    Cancelled { endpoint: RemoteEndpoint },
}

impl ConnectError {
    /// The endpoint that failed
    pub fn endpoint(&self) -> &RemoteEndpoint {
        match self {
            ConnectError::Resolve { endpoint, .. }
            | ConnectError::Refused { endpoint, .. }
            | ConnectError::TimedOut { endpoint, .. }
            | ConnectError::Io { endpoint, .. }
            | ConnectError::Cancelled { endpoint } => endpoint,
        }
    }

    /// Whether the attempt was abandoned because of shutdown
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConnectError::Cancelled { .. })
    }

    fn from_io(endpoint: &RemoteEndpoint, source: io::Error) -> Self {
        let endpoint = endpoint.clone();
        if source.kind() == io::ErrorKind::ConnectionRefused {
            ConnectError::Refused { endpoint, source }
        } else {
            ConnectError::Io { endpoint, source }
        }
    }
}

/// Opens outbound connections to remote endpoints. Never retries.
#[derive(Debug, Clone)]
pub struct EndpointConnector {
    timeout: Option<Duration>,
}

impl EndpointConnector {
    /// `None` lets a connect attempt wait as long as the OS does
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Connector using the configured I/O timeout
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.io_timeout())
    }

    /// Connect to one endpoint, bounded by the timeout and by shutdown
    pub async fn connect(
        &self,
        endpoint: &RemoteEndpoint,
        shutdown: &mut ShutdownListener,
    ) -> Result<TcpStream, ConnectError> {
        if shutdown.is_shutdown() {
            return Err(ConnectError::Cancelled {
                endpoint: endpoint.clone(),
            });
        }

        let attempt = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, Self::try_connect(endpoint))
                    .await
                    .unwrap_or_else(|_| {
                        Err(ConnectError::TimedOut {
                            endpoint: endpoint.clone(),
                            timeout: limit,
                        })
                    }),
                None => Self::try_connect(endpoint).await,
            }
        };

        tokio::select! {
            biased;
            _ = shutdown.recv() => Err(ConnectError::Cancelled { endpoint: endpoint.clone() }),
            result = attempt => result,
        }
    }

    /// Connect to every endpoint concurrently. Successes keep configuration order.
    pub async fn connect_all(
        &self,
        endpoints: &[RemoteEndpoint],
        shutdown: &ShutdownListener,
        log: &dyn RelayLog,
    ) -> Vec<(RemoteEndpoint, TcpStream)> {
        let attempts = endpoints.iter().map(|endpoint| {
            let mut listener = shutdown.resubscribe();
            async move { self.connect(endpoint, &mut listener).await }
        });
        let results = join_all(attempts).await;

        let mut connected = Vec::with_capacity(endpoints.len());
        for (endpoint, result) in endpoints.iter().zip(results) {
            match result {
                Ok(stream) => {
                    log.info(&format!("Connected to remote endpoint {}", endpoint));
                    connected.push((endpoint.clone(), stream));
                }
                Err(e) if e.is_cancelled() => {
                    debug!("Connect to {} abandoned: shutdown in progress", endpoint);
                }
                Err(e) => {
                    log.warning(&format!("Could not connect to {}: {}", endpoint, e));
                }
            }
        }
        connected
    }

    async fn try_connect(endpoint: &RemoteEndpoint) -> Result<TcpStream, ConnectError> {
        let addrs: Vec<SocketAddr> = lookup_host((endpoint.address.as_str(), endpoint.port))
            .await
            .map_err(|source| ConnectError::Resolve {
                endpoint: endpoint.clone(),
                source,
            })?
            .collect();

        let mut last_error = io::Error::new(io::ErrorKind::NotFound, "no addresses resolved");
        if addrs.is_empty() {
            return Err(ConnectError::Resolve {
                endpoint: endpoint.clone(),
                source: last_error,
            });
        }

        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Failed to set TCP_NODELAY towards {}: {}", addr, e);
                    }
                    debug!("Connected to {} via {}", endpoint, addr);
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("Failed to connect to {} via {}: {}", endpoint, addr, e);
                    last_error = e;
                }
            }
        }

        Err(ConnectError::from_io(endpoint, last_error))
    }
}
