//! Relay Pump
//!
//! Moves bytes from one source to one destination until the source closes,
//! an I/O error occurs, or shutdown fires. A pump never returns an error:
//! every way it can stop is a [`PumpOutcome`].

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::stats::{Flow, SessionStats};
use crate::logging::SharedLog;
use crate::shutdown::ShutdownListener;

/// A writer shared between the pumps that write to it and the session that closes it
pub type SharedWriter<W> = Arc<Mutex<W>>;

/// Wrap a writer so several pumps and the session can share it
pub fn shared_writer<W>(writer: W) -> SharedWriter<W> {
    Arc::new(Mutex::new(writer))
}

/// How a pump stopped
#[derive(Debug)]
pub enum PumpOutcome {
    /// EOF or the source transport was closed by the peer
    SourceClosed,
    /// The destination transport was closed by the peer
    DestinationClosed,
    /// Shutdown fired
    Cancelled,
    /// A read or write exceeded the configured timeout
    TimedOut,
    /// Any other I/O error
    Failed(io::Error),
}

impl PumpOutcome {
    /// Orderly stops, as opposed to timeouts and I/O failures
    pub fn is_graceful(&self) -> bool {
        matches!(
            self,
            PumpOutcome::SourceClosed | PumpOutcome::DestinationClosed | PumpOutcome::Cancelled
        )
    }
}

impl fmt::Display for PumpOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PumpOutcome::SourceClosed => write!(f, "source closed"),
            PumpOutcome::DestinationClosed => write!(f, "destination closed"),
            PumpOutcome::Cancelled => write!(f, "cancelled by shutdown"),
            PumpOutcome::TimedOut => write!(f, "timed out"),
            PumpOutcome::Failed(e) => write!(f, "I/O error: {}", e),
        }
    }
}

/// Settings shared by every pump of a session
#[derive(Clone)]
pub struct PumpSettings {
    pub buffer_size: usize,
    pub timeout: Option<Duration>,
    pub log: SharedLog,
    pub stats: Option<Arc<SessionStats>>,
}

impl PumpSettings {
    pub fn new(buffer_size: usize, timeout: Option<Duration>, log: SharedLog) -> Self {
        Self {
            buffer_size,
            timeout,
            log,
            stats: None,
        }
    }

    /// Count relayed bytes into `stats`
    pub fn with_stats(mut self, stats: Arc<SessionStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub(crate) fn record(&self, flow: Flow, bytes: usize) {
        if let Some(stats) = &self.stats {
            stats.record(flow, bytes);
        }
    }
}

/// Errors that mean the peer went away rather than something broke
pub(crate) fn is_transport_closed(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

/// Result of one read from a pump source
pub(crate) enum ReadStep {
    Data(usize),
    Stop(PumpOutcome),
}

pub(crate) async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> Result<io::Result<T>, ()>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| ()),
        None => Ok(fut.await),
    }
}

/// Read up to `buf.len()` bytes, observing timeout and shutdown
pub(crate) async fn read_chunk<R>(
    source: &mut R,
    buf: &mut [u8],
    timeout: Option<Duration>,
    shutdown: &mut ShutdownListener,
) -> ReadStep
where
    R: AsyncRead + Unpin,
{
    tokio::select! {
        biased;
        _ = shutdown.recv() => ReadStep::Stop(PumpOutcome::Cancelled),
        result = with_timeout(timeout, source.read(buf)) => match result {
            Ok(Ok(0)) => ReadStep::Stop(PumpOutcome::SourceClosed),
            Ok(Ok(n)) => ReadStep::Data(n),
            Ok(Err(e)) if is_transport_closed(&e) => ReadStep::Stop(PumpOutcome::SourceClosed),
            Ok(Err(e)) => ReadStep::Stop(PumpOutcome::Failed(e)),
            Err(()) => ReadStep::Stop(PumpOutcome::TimedOut),
        },
    }
}

/// Write the whole chunk and flush, holding the writer lock for the duration
pub(crate) async fn write_chunk<W>(
    destination: &SharedWriter<W>,
    chunk: &[u8],
    timeout: Option<Duration>,
) -> Result<(), PumpOutcome>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = destination.lock().await;
    let write = async {
        writer.write_all(chunk).await?;
        writer.flush().await
    };
    match with_timeout(timeout, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) if is_transport_closed(&e) => Err(PumpOutcome::DestinationClosed),
        Ok(Err(e)) => Err(PumpOutcome::Failed(e)),
        Err(()) => Err(PumpOutcome::TimedOut),
    }
}

/// One-to-one pump, used for every remote -> client leg
pub struct RelayPump<R, W> {
    source: R,
    destination: SharedWriter<W>,
    direction: String,
    settings: PumpSettings,
}

impl<R, W> RelayPump<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        source: R,
        destination: SharedWriter<W>,
        direction: impl Into<String>,
        settings: PumpSettings,
    ) -> Self {
        Self {
            source,
            destination,
            direction: direction.into(),
            settings,
        }
    }

    /// Label used for chunk logging and drain reporting
    pub fn direction(&self) -> &str {
        &self.direction
    }

    /// Relay until either side closes, a timeout expires or shutdown fires
    pub async fn run(mut self, mut shutdown: ShutdownListener) -> PumpOutcome {
        let mut buf = vec![0u8; self.settings.buffer_size.max(1)];

        loop {
            let timeout = self.settings.timeout;
            let n = match read_chunk(&mut self.source, &mut buf, timeout, &mut shutdown).await {
                ReadStep::Data(n) => n,
                ReadStep::Stop(outcome) => return outcome,
            };
            let chunk = &buf[..n];

            let write = write_chunk(&self.destination, chunk, self.settings.timeout);
            tokio::select! {
                biased;
                _ = shutdown.recv() => return PumpOutcome::Cancelled,
                result = write => {
                    if let Err(outcome) = result {
                        return outcome;
                    }
                }
            }

            self.settings.log.chunk(&self.direction, chunk);
            self.settings.record(Flow::Downstream, n);
        }
    }
}
