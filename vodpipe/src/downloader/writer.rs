//! Queue-backed disk writer.
//!
//! The fetch loop only ever appends to an in-memory buffer and enqueues full
//! buffers; a dedicated OS thread drains the queue into the file. A slow disk
//! therefore delays nothing but that thread.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{Error, Result};

/// What the worker thread observed once the queue was drained.
#[derive(Debug)]
struct WorkerOutcome {
    bytes_written: u64,
    error: Option<std::io::Error>,
}

/// Buffered, order-preserving writer backed by one worker thread.
pub struct BufferedDiskWriter {
    path: PathBuf,
    buffer: BytesMut,
    capacity: usize,
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    worker: Option<JoinHandle<WorkerOutcome>>,
    bytes_written: u64,
}

impl BufferedDiskWriter {
    /// Create (or truncate) `path` and start the writer thread.
    pub fn create(path: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(|e| Error::io_path("creating", &path, e))?;
        Self::from_file(file, path, capacity)
    }

    /// Async counterpart of [`create`](Self::create); the file is opened on the
    /// blocking pool so the caller's runtime thread never touches the disk.
    pub async fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let path = path.into();
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| Error::io_path("creating", &path, e))?
            .into_std()
            .await;
        Self::from_file(file, path, capacity)
    }

    /// Wrap an already opened file. `path` is only used for diagnostics.
    pub fn from_file(file: File, path: PathBuf, capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::unbounded_channel();

        let worker_path = path.clone();
        let worker = std::thread::Builder::new()
            .name("disk-writer".to_string())
            .spawn(move || drain_queue(file, rx, &worker_path))
            .map_err(|e| Error::io_path("spawning writer for", &path, e))?;

        Ok(Self {
            path,
            buffer: BytesMut::with_capacity(capacity),
            capacity,
            tx: Some(tx),
            worker: Some(worker),
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append bytes. Never waits on disk I/O.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.tx.is_none() {
            return Err(Error::invalid_transition("stopped", "writing"));
        }
        self.buffer.extend_from_slice(data);
        if self.buffer.len() >= self.capacity {
            self.submit()?;
        }
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = self.buffer.split().freeze();
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::invalid_transition("stopped", "writing"))?;
        tx.send(chunk).map_err(|_| {
            Error::io_path(
                "queueing write for",
                &self.path,
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "disk writer thread exited"),
            )
        })
    }

    /// Flush the partial buffer, wait until every queued buffer is on disk and
    /// terminate the worker.
    ///
    /// Blocks the calling thread; from async code use [`finish`](Self::finish).
    /// The first call reports a write failure if one occurred; later calls
    /// return the byte count written.
    pub fn stop(&mut self) -> Result<u64> {
        if self.tx.is_some() {
            if let Err(e) = self.submit() {
                warn!(path = %self.path.display(), error = %e, "Failed to queue final buffer");
            }
        }
        // Dropping the sender ends the worker loop once the queue is empty.
        self.tx = None;

        let Some(worker) = self.worker.take() else {
            return Ok(self.bytes_written);
        };

        let outcome = worker.join().map_err(|_| {
            Error::io_path(
                "writing",
                &self.path,
                std::io::Error::other("disk writer thread panicked"),
            )
        })?;
        self.bytes_written = outcome.bytes_written;

        match outcome.error {
            Some(e) => Err(Error::io_path("writing", &self.path, e)),
            None => Ok(outcome.bytes_written),
        }
    }

    /// [`stop`](Self::stop) on the blocking pool.
    pub async fn finish(mut self) -> Result<u64> {
        tokio::task::spawn_blocking(move || self.stop())
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }

    /// Stop the writer and release the file handle.
    pub async fn close(self) -> Result<u64> {
        // The worker owns the file; it is dropped when the thread exits.
        self.finish().await
    }
}

impl Drop for BufferedDiskWriter {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.stop() {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Disk writer dropped with a failed write"
                );
            }
        }
    }
}

fn drain_queue(
    mut file: File,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    path: &Path,
) -> WorkerOutcome {
    let mut bytes_written = 0u64;
    let mut error = None;

    while let Some(chunk) = rx.blocking_recv() {
        // Best effort: keep attempting later buffers after a failure.
        match file.write_all(&chunk) {
            Ok(()) => bytes_written += chunk.len() as u64,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Disk write failed");
                error.get_or_insert(e);
            }
        }
    }

    if let Err(e) = file.flush().and_then(|_| file.sync_data()) {
        warn!(path = %path.display(), error = %e, "Failed to sync file");
        error.get_or_insert(e);
    }

    debug!(path = %path.display(), bytes_written, "Disk writer drained");
    WorkerOutcome {
        bytes_written,
        error,
    }
}
