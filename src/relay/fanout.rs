//! Fan-Out Pump
//!
//! Reads from one source and writes each chunk to every destination
//! concurrently. A failing destination is logged and skipped for that chunk;
//! it is tried again with the next one. Only the source side, or shutdown,
//! stops the pump.

use futures::future::join_all;
use tokio::io::{AsyncRead, AsyncWrite};

use super::pump::{read_chunk, write_chunk, PumpOutcome, PumpSettings, ReadStep, SharedWriter};
use super::stats::Flow;
use crate::shutdown::ShutdownListener;

/// One destination of a fan-out, labelled for logging
pub struct FanOutTarget<W> {
    pub label: String,
    pub writer: SharedWriter<W>,
}

impl<W> FanOutTarget<W> {
    pub fn new(label: impl Into<String>, writer: SharedWriter<W>) -> Self {
        Self {
            label: label.into(),
            writer,
        }
    }
}

/// Pump copying one source to every target, one chunk at a time
pub struct FanOutPump<R, W> {
    source: R,
    targets: Vec<FanOutTarget<W>>,
    direction: String,
    settings: PumpSettings,
}

impl<R, W> FanOutPump<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        source: R,
        targets: Vec<FanOutTarget<W>>,
        direction: impl Into<String>,
        settings: PumpSettings,
    ) -> Self {
        Self {
            source,
            targets,
            direction: direction.into(),
            settings,
        }
    }

    /// Label used for chunk logging and drain reporting
    pub fn direction(&self) -> &str {
        &self.direction
    }

    /// Relay until the source closes or shutdown fires
    pub async fn run(mut self, mut shutdown: ShutdownListener) -> PumpOutcome {
        let mut buf = vec![0u8; self.settings.buffer_size.max(1)];
        let timeout = self.settings.timeout;

        loop {
            let n = match read_chunk(&mut self.source, &mut buf, timeout, &mut shutdown).await {
                ReadStep::Data(n) => n,
                ReadStep::Stop(outcome) => return outcome,
            };
            let chunk = &buf[..n];

            // Every write for this chunk completes before the next read
            let writes = join_all(
                self.targets
                    .iter()
                    .map(|target| write_chunk(&target.writer, chunk, timeout)),
            );
            let results = tokio::select! {
                biased;
                _ = shutdown.recv() => return PumpOutcome::Cancelled,
                results = writes => results,
            };

            let mut delivered = false;
            for (target, result) in self.targets.iter().zip(results) {
                match result {
                    Ok(()) => delivered = true,
                    Err(outcome) => self.settings.log.warning(&format!(
                        "{}: write to {} failed ({}), skipping this chunk",
                        self.direction, target.label, outcome
                    )),
                }
            }

            // A chunk nobody received is not logged as relayed
            if delivered {
                self.settings.log.chunk(&self.direction, chunk);
                self.settings.record(Flow::Upstream, n);
            }
        }
    }
}
