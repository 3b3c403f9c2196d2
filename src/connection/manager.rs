//! Connection Manager Implementation
//!
//! Owns the listening socket and spawns one detached [`ConnectionSession`]
//! per accepted client. A session's outcome never reaches the accept loop;
//! only the log sink sees it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::ProxyConfig;
use crate::logging::SharedLog;
use crate::relay::ConnectionSession;
use crate::shutdown::ShutdownListener;
use crate::Result;

/// Decrements the active session count when a session task ends, even by panic
struct ActiveSessionGuard(Arc<AtomicUsize>);

impl ActiveSessionGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveSessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Accepts clients and hands each one to its own session
pub struct ConnectionManager {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<ProxyConfig>,
    log: SharedLog,
    active_sessions: Arc<AtomicUsize>,
    total_accepted: AtomicUsize,
}

impl ConnectionManager {
    /// Bind the listener on the configured address and port
    pub async fn bind(config: Arc<ProxyConfig>, log: SharedLog) -> Result<Self> {
        let bind_addr = config.listen_addr();
        info!("Binding TCP listener to {}", bind_addr);

        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind listener on {}", bind_addr))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read listener address")?;

        info!("Successfully bound to {}", local_addr);
        Ok(Self {
            listener,
            local_addr,
            config,
            log,
            active_sessions: Arc::new(AtomicUsize::new(0)),
            total_accepted: AtomicUsize::new(0),
        })
    }

    /// The address actually bound, useful when the configured port is 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sessions whose task has not finished yet
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    /// Clients accepted since the manager started
    pub fn total_accepted(&self) -> usize {
        self.total_accepted.load(Ordering::Relaxed)
    }

    /// Accept clients until shutdown fires. Never waits on a session.
    pub async fn run(&self, mut shutdown: ShutdownListener) -> Result<()> {
        if self.config.remotes.is_empty() {
            self.log.warning(
                "No remote endpoints configured, at least one is required; clients will be closed without relaying",
            );
        } else {
            let remotes: Vec<String> = self.config.remotes.iter().map(|r| r.to_string()).collect();
            self.log.info(&format!(
                "Relaying {} to {}",
                self.local_addr,
                remotes.join(", ")
            ));
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Received shutdown signal, stopping connection acceptance");
                    break;
                }
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            self.total_accepted.fetch_add(1, Ordering::Relaxed);
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                            }

                            let session_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
                            self.log.info(&format!("Accepted client {} (session {})", addr, session_id));

                            let session = ConnectionSession::new(
                                session_id,
                                addr,
                                Arc::clone(&self.config),
                                Arc::clone(&self.log),
                            );
                            let guard = ActiveSessionGuard::enter(&self.active_sessions);
                            let listener = shutdown.resubscribe();

                            tokio::spawn(async move {
                                let _guard = guard;
                                let summary = session.run(stream, listener).await;
                                debug!(
                                    "Session {} finished in state {} after {:?}",
                                    summary.session_id, summary.final_state, summary.duration
                                );
                            });
                        }
                        Err(e) => {
                            self.log.error("Error accepting connection", &e);
                            // Continue accepting connections even if one fails
                        }
                    }
                }
            }
        }

        info!("Connection acceptance loop stopped");
        Ok(())
    }

    /// Wait up to `timeout` for running sessions to unwind after shutdown
    pub async fn wait_for_sessions(&self, timeout: Duration) -> bool {
        let start_time = Instant::now();
        let mut last_count = self.active_sessions();
        if last_count > 0 {
            info!(
                "Waiting for {} active sessions to close (timeout: {:?})",
                last_count, timeout
            );
        }

        while last_count > 0 && start_time.elapsed() < timeout {
            tokio::time::sleep(Duration::from_millis(20)).await;

            let current_count = self.active_sessions();
            if current_count != last_count {
                debug!("Active sessions: {} -> {}", last_count, current_count);
                last_count = current_count;
            }
        }

        if last_count == 0 {
            info!("All sessions closed in {:?}", start_time.elapsed());
            true
        } else {
            warn!(
                "Shutdown timeout reached after {:?} with {} sessions still active",
                start_time.elapsed(),
                last_count
            );
            false
        }
    }
}

/// Bind and run the relay until shutdown fires. Returns early only if the
/// listener cannot be bound.
pub async fn run_proxy_server(
    config: Arc<ProxyConfig>,
    log: SharedLog,
    shutdown: ShutdownListener,
) -> Result<()> {
    let manager = ConnectionManager::bind(config, log).await?;
    manager.run(shutdown).await
}
