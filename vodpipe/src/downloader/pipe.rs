//! Byte conduit toward an external decoder process.
//!
//! Writes into an OS pipe block whenever the decoder falls behind. That block
//! is the backpressure between playback and the network, so it happens on a
//! dedicated feeder thread; the async side only waits on a small bounded queue.

use std::io::{ErrorKind, PipeReader, PipeWriter, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Final accounting of a closed pipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipeReport {
    /// Bytes accepted by the decoder side of the pipe.
    pub bytes_written: u64,
    /// Whether the read end went away before all bytes were delivered.
    pub broken: bool,
}

/// One pipe per segment: the read end goes to the decoder, the write end is
/// owned by the feeder thread.
pub struct StreamPipe {
    reader: Option<PipeReader>,
    tx: Option<mpsc::Sender<Bytes>>,
    done: Option<oneshot::Receiver<PipeReport>>,
    broken: Arc<AtomicBool>,
}

impl StreamPipe {
    /// Create the OS pipe with a best-effort `capacity` and start its feeder thread.
    ///
    /// `queue_depth` bounds the chunks waiting for the feeder; once it is full
    /// [`write`](Self::write) suspends until the decoder catches up.
    pub fn open(capacity: usize, queue_depth: usize) -> Result<Self> {
        let (reader, writer) = process_utils::open_pipe(capacity)?;
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let (done_tx, done_rx) = oneshot::channel();
        let broken = Arc::new(AtomicBool::new(false));

        let flag = broken.clone();
        std::thread::Builder::new()
            .name("pipe-feeder".to_string())
            .spawn(move || {
                let report = feed(writer, rx, &flag);
                let _ = done_tx.send(report);
            })?;

        Ok(Self {
            reader: Some(reader),
            tx: Some(tx),
            done: Some(done_rx),
            broken,
        })
    }

    /// Hand out the read end. Returns `None` after the first call.
    pub fn take_reader(&mut self) -> Option<PipeReader> {
        self.reader.take()
    }

    /// Whether the decoder closed its end of the pipe.
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    /// Queue a chunk for the decoder.
    ///
    /// Once the decoder has gone away chunks are discarded without error; the
    /// user may have stopped playback on purpose.
    pub async fn write(&self, chunk: Bytes) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::invalid_transition("closed", "writing"))?;
        if chunk.is_empty() || self.is_broken() {
            return Ok(());
        }
        if tx.send(chunk).await.is_err() {
            debug!("Pipe feeder already finished; dropping chunk");
        }
        Ok(())
    }

    /// Close the write end and wait for the feeder to deliver what is queued.
    ///
    /// The decoder observes end-of-stream afterwards. A read end that was never
    /// handed out is dropped first so the feeder cannot block on it.
    pub async fn close(&mut self) -> PipeReport {
        self.reader = None;
        self.tx = None;
        match self.done.take() {
            Some(done) => done.await.unwrap_or(PipeReport {
                bytes_written: 0,
                broken: true,
            }),
            None => PipeReport::default(),
        }
    }
}

fn feed(writer: PipeWriter, mut rx: mpsc::Receiver<Bytes>, broken: &AtomicBool) -> PipeReport {
    let mut writer = Some(writer);
    let mut bytes_written = 0u64;

    while let Some(chunk) = rx.blocking_recv() {
        let Some(w) = writer.as_mut() else {
            // Decoder is gone; drain the queue so senders never block.
            continue;
        };
        match w.write_all(&chunk) {
            Ok(()) => bytes_written += chunk.len() as u64,
            Err(e) => {
                if e.kind() == ErrorKind::BrokenPipe {
                    debug!(bytes_written, "Decoder closed its input");
                } else {
                    warn!(error = %e, bytes_written, "Pipe write failed");
                }
                broken.store(true, Ordering::Release);
                writer = None;
            }
        }
    }

    // Dropping the writer here signals EOF to the decoder.
    drop(writer);
    PipeReport {
        bytes_written,
        broken: broken.load(Ordering::Acquire),
    }
}
