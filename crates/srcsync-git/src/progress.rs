//! Transport progress relay.
//!
//! libgit2 reports sideband progress as raw byte chunks: arbitrary
//! boundaries, carriage-return-only line endings from progress bars and the
//! occasional NUL. The transport thread pushes those bytes into a
//! [`ProgressSink`], which splits them into lines and hands each line to a
//! bounded channel. A [`ProgressRelay`] task on the async runtime drains the
//! channel in order, normalizes every line and emits one progress event per
//! non-empty line.
//!
//! Cancelling the governing token stops the relay and closes the channel;
//! the next write from the transport then returns `false`, which aborts the
//! transfer.

use std::io::Write;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::{EventLogger, EventRecord, STEP_PROGRESS, Severity, SharedLogger};

/// Capacity of the line channel between transport and relay.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Identifier attached to every progress message.
pub const PROGRESS_ID: &str = "fetch-source";

/// Strips CR, LF and NUL from a line; `None` when nothing remains.
pub fn normalize_line(raw: &str) -> Option<String> {
    let line: String = raw
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\0'))
        .collect();
    if line.trim().is_empty() { None } else { Some(line) }
}

/// Builds the structured progress event for one normalized line.
pub fn progress_event(line: &str) -> EventRecord {
    let message = serde_json::json!({ "progress": line, "id": PROGRESS_ID }).to_string();
    EventRecord::new(Severity::Debug, message, STEP_PROGRESS)
}

/// Incremental splitter turning a byte stream into lines.
#[derive(Debug, Default)]
pub(crate) struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    /// Consumes a chunk and returns every line it completed.
    pub(crate) fn push(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in data {
            match byte {
                b'\r' | b'\n' => {
                    if !self.pending.is_empty() {
                        lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                        self.pending.clear();
                    }
                },
                _ => self.pending.push(byte),
            }
        }
        lines
    }

    /// Returns the unterminated tail, if any.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            let line = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            Some(line)
        }
    }
}

enum SinkTarget {
    Relay {
        tx: mpsc::Sender<String>,
        splitter: LineSplitter,
    },
    Stdout,
    Discard,
}

/// Transport-side end of the progress pipeline.
///
/// Written from the blocking transport thread; never from async code.
pub struct ProgressSink {
    target: SinkTarget,
}

impl ProgressSink {
    /// A sink writing raw transport output to standard output.
    pub fn stdout() -> Self {
        Self {
            target: SinkTarget::Stdout,
        }
    }

    /// A sink dropping everything.
    pub fn discard() -> Self {
        Self {
            target: SinkTarget::Discard,
        }
    }

    /// Feeds a chunk of transport output.
    ///
    /// Returns `false` once the relay is gone; the transport should abort.
    pub fn write(&mut self, data: &[u8]) -> bool {
        match &mut self.target {
            SinkTarget::Relay { tx, splitter } => {
                for line in splitter.push(data) {
                    if tx.blocking_send(line).is_err() {
                        return false;
                    }
                }
                true
            },
            SinkTarget::Stdout => {
                let mut out = std::io::stdout().lock();
                if let Err(e) = out.write_all(data).and_then(|_| out.flush()) {
                    debug!("failed to write progress to stdout: {}", e);
                }
                true
            },
            SinkTarget::Discard => true,
        }
    }
}

impl Drop for ProgressSink {
    fn drop(&mut self) {
        if let SinkTarget::Relay { tx, splitter } = &mut self.target
            && let Some(tail) = splitter.finish()
            && tx.try_send(tail).is_err()
        {
            debug!("dropped trailing progress line");
        }
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = match self.target {
            SinkTarget::Relay { .. } => "relay",
            SinkTarget::Stdout => "stdout",
            SinkTarget::Discard => "discard",
        };
        f.debug_struct("ProgressSink").field("target", &target).finish()
    }
}

/// Async end of the progress pipeline.
#[derive(Debug)]
pub struct ProgressRelay {
    handle: Option<JoinHandle<usize>>,
}

impl ProgressRelay {
    /// Starts relaying progress for one sync.
    ///
    /// With a logger, spawns the relay task and returns a channel-backed
    /// sink. Without one, returns a stdout sink and spawns nothing.
    pub fn start(logger: &SharedLogger, cancel: CancellationToken) -> (Self, ProgressSink) {
        match logger {
            Some(logger) => {
                let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
                let handle = tokio::spawn(run(logger.clone(), rx, cancel));
                let sink = ProgressSink {
                    target: SinkTarget::Relay {
                        tx,
                        splitter: LineSplitter::default(),
                    },
                };
                (
                    Self {
                        handle: Some(handle),
                    },
                    sink,
                )
            },
            None => (Self { handle: None }, ProgressSink::stdout()),
        }
    }

    /// Waits for the relay to drain and stop; returns the number of events emitted.
    ///
    /// The relay ends when every sink is dropped or the token is cancelled.
    pub async fn finish(self) -> usize {
        match self.handle {
            Some(handle) => match handle.await {
                Ok(emitted) => emitted,
                Err(e) => {
                    warn!("progress relay task failed: {}", e);
                    0
                },
            },
            None => 0,
        }
    }
}

async fn run(
    logger: std::sync::Arc<dyn EventLogger>,
    mut rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) -> usize {
    let mut emitted = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                rx.close();
                debug!("progress relay cancelled after {} events", emitted);
                break;
            }
            line = rx.recv() => match line {
                Some(line) => {
                    if let Some(line) = normalize_line(&line) {
                        logger.record(progress_event(&line));
                        emitted += 1;
                    }
                },
                None => break,
            },
        }
    }
    emitted
}
