//! Graceful Shutdown Handling
//!
//! A single process-wide shutdown signal. The accept loop, every session and
//! every pump hold a [`ShutdownListener`] and stop at their next suspend
//! point once it fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::Result;

/// Owns the shutdown signal and fires it on request or on SIGINT/SIGTERM
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a listener for the shutdown signal
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.shutdown_tx.subscribe(),
            fired: Arc::clone(&self.fired),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Fire the signal. Calling it again is a no-op.
    pub fn trigger(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Broadcasting shutdown signal");
        // No receivers just means nothing is running yet
        let _ = self.shutdown_tx.send(());
    }

    /// Wait for SIGTERM, SIGINT or Ctrl+C, then fire the signal
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        if self.is_shutdown() {
            warn!("Shutdown signal already fired");
        }
        self.trigger();
        Ok(())
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of the shutdown signal
pub struct ShutdownListener {
    rx: broadcast::Receiver<()>,
    fired: Arc<AtomicBool>,
}

impl ShutdownListener {
    pub fn is_shutdown(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has fired, immediately if it already has
    pub async fn recv(&mut self) {
        if self.is_shutdown() {
            return;
        }
        // Closed or lagged both mean the sender is gone or has fired
        let _ = self.rx.recv().await;
    }

    /// An independent listener on the same signal
    pub fn resubscribe(&self) -> Self {
        Self {
            rx: self.rx.resubscribe(),
            fired: Arc::clone(&self.fired),
        }
    }
}
