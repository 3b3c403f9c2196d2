//! Session Statistics

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Direction of traffic relative to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Client to remotes
    Upstream,
    /// Remotes to client
    Downstream,
}

/// Live counters for one connection session
#[derive(Debug)]
pub struct SessionStats {
    pub session_id: String,
    pub client_addr: SocketAddr,
    pub start_time: Instant,
    bytes_up: AtomicU64,
    bytes_down: AtomicU64,
}

impl SessionStats {
    pub fn new(session_id: String, client_addr: SocketAddr) -> Self {
        Self {
            session_id,
            client_addr,
            start_time: Instant::now(),
            bytes_up: AtomicU64::new(0),
            bytes_down: AtomicU64::new(0),
        }
    }

    /// Bytes read from the client. Counted once, however many remotes receive them.
    pub fn bytes_up(&self) -> u64 {
        self.bytes_up.load(Ordering::Relaxed)
    }

    /// Bytes written to the client
    pub fn bytes_down(&self) -> u64 {
        self.bytes_down.load(Ordering::Relaxed)
    }

    /// Bytes moved in both directions
    pub fn total_bytes(&self) -> u64 {
        self.bytes_up() + self.bytes_down()
    }

    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Add `bytes` to the counter for `flow`
    pub fn record(&self, flow: Flow, bytes: usize) {
        let counter = match flow {
            Flow::Upstream => &self.bytes_up,
            Flow::Downstream => &self.bytes_down,
        };
        counter.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Human readable one-line summary
    pub fn summary_line(&self) -> String {
        format!(
            "Session {} from {} closed | Duration: {:?} | Up: {} bytes | Down: {} bytes | Total: {} bytes",
            self.session_id,
            self.client_addr,
            self.duration(),
            self.bytes_up(),
            self.bytes_down(),
            self.total_bytes()
        )
    }
}
