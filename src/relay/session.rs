//! Connection Session
//!
//! Lifecycle of one accepted client: connect to every remote endpoint, run
//! one fan-out pump (client -> remotes) and one relay pump per remote
//! (remote -> client), and tear everything down as soon as the first pump
//! stops.
//!
//! ```text
//! Connecting -> Relaying -> Draining -> Closed
//!      \_________________________________/
//!            (no remote reachable)
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::debug;

use super::connector::EndpointConnector;
use super::fanout::{FanOutPump, FanOutTarget};
use super::pump::{
    is_transport_closed, shared_writer, PumpOutcome, PumpSettings, RelayPump, SharedWriter,
};
use super::stats::SessionStats;
use crate::config::{ProxyConfig, RemoteEndpoint};
use crate::logging::SharedLog;
use crate::shutdown::ShutdownListener;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Relaying,
    Draining,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Relaying => "relaying",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What happened during a finished session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub client_addr: SocketAddr,
    pub remotes_connected: usize,
    pub pumps_started: usize,
    /// Direction label of the pump whose termination drained the session
    pub drained_by: Option<String>,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub duration: Duration,
    pub final_state: SessionState,
}

impl SessionSummary {
    /// Whether the session got as far as relaying
    pub fn relayed(&self) -> bool {
        self.pumps_started > 0
    }
}

/// One accepted client and everything it is relayed to
pub struct ConnectionSession {
    config: Arc<ProxyConfig>,
    log: SharedLog,
    stats: Arc<SessionStats>,
    state: SessionState,
    remotes_connected: usize,
    pumps_started: usize,
    drained_by: Option<String>,
}

impl ConnectionSession {
    pub fn new(
        session_id: String,
        client_addr: SocketAddr,
        config: Arc<ProxyConfig>,
        log: SharedLog,
    ) -> Self {
        Self {
            config,
            log,
            stats: Arc::new(SessionStats::new(session_id, client_addr)),
            state: SessionState::Connecting,
            remotes_connected: 0,
            pumps_started: 0,
            drained_by: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {}: {} -> {}", self.stats.session_id, self.state, next);
        self.state = next;
    }

    /// Drive the session to completion. Never fails: every path ends in `Closed`
    /// with the client and every remote socket closed.
    pub async fn run(mut self, client: TcpStream, shutdown: ShutdownListener) -> SessionSummary {
        let client_addr = self.stats.client_addr;

        if self.config.remotes.is_empty() {
            self.log.warning(&format!(
                "No remote endpoints configured, at least one is required; closing client {}",
                client_addr
            ));
            return self.close_unrelayed(client).await;
        }

        let connector = EndpointConnector::from_config(&self.config);
        let remotes = connector
            .connect_all(&self.config.remotes, &shutdown, self.log.as_ref())
            .await;

        if remotes.is_empty() {
            if !shutdown.is_shutdown() {
                self.log.warning(&format!(
                    "Could not connect to any remote endpoint; closing client {}",
                    client_addr
                ));
            }
            return self.close_unrelayed(client).await;
        }
        self.remotes_connected = remotes.len();

        self.transition(SessionState::Relaying);
        let writers = self.relay(client, remotes, &shutdown).await;

        close_all(&writers).await;
        drop(writers);

        self.log.info(&self.stats.summary_line());
        self.transition(SessionState::Closed);
        self.summary()
    }

    /// Start every pump, wait for the first to stop, stop the rest.
    /// Returns every writer so the caller can close them.
    async fn relay(
        &mut self,
        client: TcpStream,
        remotes: Vec<(RemoteEndpoint, TcpStream)>,
        shutdown: &ShutdownListener,
    ) -> Vec<SharedWriter<OwnedWriteHalf>> {
        let client_addr = self.stats.client_addr;
        let settings = PumpSettings::new(
            self.config.buffer_size,
            self.config.io_timeout(),
            Arc::clone(&self.log),
        )
        .with_stats(Arc::clone(&self.stats));

        let (client_read, client_write) = client.into_split();
        let client_writer = shared_writer(client_write);
        let mut writers = vec![Arc::clone(&client_writer)];
        let mut targets = Vec::with_capacity(remotes.len());
        let mut pumps = JoinSet::new();

        for (endpoint, stream) in remotes {
            let (remote_read, remote_write) = stream.into_split();
            let remote_writer = shared_writer(remote_write);
            writers.push(Arc::clone(&remote_writer));
            targets.push(FanOutTarget::new(endpoint.to_string(), remote_writer));

            let pump = RelayPump::new(
                remote_read,
                Arc::clone(&client_writer),
                format!("{} -> {}", endpoint, client_addr),
                settings.clone(),
            );
            let label = pump.direction().to_string();
            let listener = shutdown.resubscribe();
            pumps.spawn(async move { (label, pump.run(listener).await) });
        }

        let fan_out = FanOutPump::new(
            client_read,
            targets,
            format!("{} -> *", client_addr),
            settings,
        );
        let label = fan_out.direction().to_string();
        let listener = shutdown.resubscribe();
        pumps.spawn(async move { (label, fan_out.run(listener).await) });

        self.pumps_started = pumps.len();
        debug!(
            "Session {}: {} pumps running",
            self.stats.session_id, self.pumps_started
        );

        let first = pumps.join_next().await;
        self.transition(SessionState::Draining);
        match first {
            Some(Ok((label, outcome))) => {
                self.report_drain(&label, &outcome);
                self.drained_by = Some(label);
            }
            Some(Err(e)) => {
                self.log.error(
                    &format!("Session {}: relay pump failed unexpectedly", self.stats.session_id),
                    &e,
                );
            }
            None => {}
        }

        // Aborts the remaining pumps and waits for them, dropping their read halves
        pumps.shutdown().await;
        writers
    }

    fn report_drain(&self, label: &str, outcome: &PumpOutcome) {
        let id = &self.stats.session_id;
        let message = if matches!(outcome, PumpOutcome::Cancelled) {
            format!("Session {}: {} stopped for shutdown", id, label)
        } else if outcome.is_graceful() {
            format!("Session {}: {} ended, {}", id, label, outcome)
        } else {
            format!("Session {}: {} ended ({}), closing session", id, label, outcome)
        };
        self.log.info(&message);
    }

    async fn close_unrelayed(mut self, mut client: TcpStream) -> SessionSummary {
        if let Err(e) = client.shutdown().await {
            if !is_transport_closed(&e) {
                debug!("Session {}: client shutdown: {}", self.stats.session_id, e);
            }
        }
        drop(client);
        self.transition(SessionState::Closed);
        self.summary()
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.stats.session_id.clone(),
            client_addr: self.stats.client_addr,
            remotes_connected: self.remotes_connected,
            pumps_started: self.pumps_started,
            drained_by: self.drained_by.clone(),
            bytes_up: self.stats.bytes_up(),
            bytes_down: self.stats.bytes_down(),
            duration: self.stats.duration(),
            final_state: self.state,
        }
    }
}

/// Shut down every writer. Safe to call on writers that are already closed.
pub(crate) async fn close_all<W>(writers: &[SharedWriter<W>])
where
    W: AsyncWrite + Unpin,
{
    for writer in writers {
        let mut writer = writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            if !is_transport_closed(&e) {
                debug!("Ignoring error while closing socket: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::RecordingLog;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_close_all_is_idempotent() {
        let (a, _a_peer) = duplex(16);
        let (b, b_peer) = duplex(16);
        drop(b_peer);
        let writers = vec![shared_writer(a), shared_writer(b)];

        close_all(&writers).await;
        close_all(&writers).await;
    }

    #[test]
    fn test_drain_reports_are_info_level() {
        let log = Arc::new(RecordingLog::new());
        let session = ConnectionSession::new(
            "d1".to_string(),
            "127.0.0.1:4000".parse().unwrap(),
            Arc::new(ProxyConfig::default()),
            log.clone(),
        );

        session.report_drain("a -> *", &PumpOutcome::SourceClosed);
        session.report_drain("b -> a", &PumpOutcome::TimedOut);
        session.report_drain("c -> a", &PumpOutcome::Cancelled);

        assert_eq!(
            log.infos(),
            vec![
                "Session d1: a -> * ended, source closed".to_string(),
                "Session d1: b -> a ended (timed out), closing session".to_string(),
                "Session d1: c -> a stopped for shutdown".to_string(),
            ]
        );
        assert!(log.warnings().is_empty());
        assert!(log.errors().is_empty());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(SessionState::Connecting.to_string(), "connecting");
        assert_eq!(SessionState::Closed.to_string(), "closed");
    }
}
