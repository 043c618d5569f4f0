//! Single-segment read loop with disk and decoder tee.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::progress::ProgressTracker;
use super::source::ByteSource;
use super::writer::BufferedDiskWriter;
use crate::config::PipelineConfig;
use crate::domain::SegmentDescriptor;
use crate::utils::format::{format_bytes, format_rate};
use crate::utils::fs::remove_file_if_exists;
use crate::{Error, Result};

/// Live playback side of the tee.
#[async_trait]
pub trait LiveTarget: Send {
    /// Called once, right before the first non-empty chunk is forwarded.
    async fn start(&mut self) -> Result<()>;

    async fn write(&mut self, chunk: Bytes) -> Result<()>;
}

/// Outcome of a fully drained segment.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSummary {
    pub order: u32,
    pub bytes: u64,
    pub declared: u64,
    pub elapsed: Duration,
    /// Average bytes per second.
    pub average: f64,
}

impl fmt::Display for FetchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "segment {}: {} bytes ({} of {}) in {:.2}s, avg {}",
            self.order,
            self.bytes,
            format_bytes(self.bytes),
            format_bytes(self.declared),
            self.elapsed.as_secs_f64(),
            format_rate(self.average)
        )
    }
}

/// Reads one segment to completion, forwarding every chunk to disk and,
/// optionally, to a live target.
pub struct SegmentFetcher<'a> {
    segment: &'a SegmentDescriptor,
    config: &'a PipelineConfig,
    cancel: CancellationToken,
}

impl<'a> SegmentFetcher<'a> {
    pub fn new(
        segment: &'a SegmentDescriptor,
        config: &'a PipelineConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            segment,
            config,
            cancel,
        }
    }

    /// Drain `source` into the outputs.
    ///
    /// Either the whole segment is delivered or an error is returned; on any
    /// failure, cancellation included, the partially written `disk` file is
    /// removed.
    pub async fn fetch(
        &self,
        source: &mut dyn ByteSource,
        disk: Option<&Path>,
        live: Option<&mut dyn LiveTarget>,
    ) -> Result<FetchSummary> {
        let mut writer = match disk {
            Some(path) => Some(BufferedDiskWriter::open(path, self.config.writer_capacity).await?),
            None => None,
        };

        let mut tracker = ProgressTracker::new(self.segment.size);
        tracker.start();

        let pumped = self.pump(source, writer.as_mut(), live, &mut tracker).await;
        let finished = match writer {
            Some(writer) => writer.close().await.map(Some),
            None => Ok(None),
        };

        let outcome = match (pumped, finished) {
            (Ok(()), Ok(_)) => Ok(()),
            (Err(e), _) | (Ok(()), Err(e)) => Err(e),
        };

        if let Err(e) = outcome {
            if let Some(path) = disk {
                match remove_file_if_exists(path).await {
                    Ok(true) => debug!(path = %path.display(), "Removed partial segment file"),
                    Ok(false) => {}
                    Err(rm) => warn!(error = %rm, "Failed to remove partial segment file"),
                }
            }
            if e.is_cancelled() {
                info!(
                    order = self.segment.order,
                    transferred = tracker.transferred(),
                    "Segment fetch cancelled"
                );
            } else {
                warn!(order = self.segment.order, error = %e, "Segment fetch failed");
            }
            return Err(e);
        }

        tracker.end();
        info!(order = self.segment.order, "{}", tracker.status());

        Ok(FetchSummary {
            order: self.segment.order,
            bytes: tracker.transferred(),
            declared: self.segment.size,
            elapsed: tracker.elapsed(),
            average: tracker.average_throughput(),
        })
    }

    async fn pump(
        &self,
        source: &mut dyn ByteSource,
        mut writer: Option<&mut BufferedDiskWriter>,
        mut live: Option<&mut dyn LiveTarget>,
        tracker: &mut ProgressTracker,
    ) -> Result<()> {
        let threshold = self.config.stall_threshold();
        let mut live_started = false;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                chunk = source.read_chunk(self.config.block_size) => chunk?,
            };
            if chunk.is_empty() {
                return Ok(());
            }

            tracker.record(chunk.len());
            if let Some(writer) = writer.as_deref_mut() {
                writer.write(&chunk)?;
            }

            if let Some(target) = live.as_deref_mut() {
                if !live_started {
                    target.start().await?;
                    live_started = true;
                }
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                    written = target.write(chunk) => written?,
                }
            }

            if tracker.is_stalled(threshold) {
                info!(order = self.segment.order, "{}", tracker.status());
            }
        }
    }
}
