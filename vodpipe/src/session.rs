//! Per-request façade over the store, resolver and playback machinery.
//!
//! A session looks the video up in the store and picks local replay when every
//! segment is already on disk, live acquisition otherwise. It is the only
//! component that writes the video's store record.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::database::repositories::VideoRepository;
use crate::domain::{
    DownloadStatus, SegmentDescriptor, VideoMetadata, VideoRecord, sort_segments,
};
use crate::downloader::{SegmentFetcher, SegmentOpener};
use crate::player::{
    DecoderHost, LiveStrategy, LocalStrategy, PlaybackController, PlaybackFinished, PlaybackMode,
    PlaybackStrategy, SegmentLedger,
};
use crate::resolver::Resolver;
use crate::utils::filename::sanitize_component;
use crate::utils::fs::ensure_dir_all;
use crate::{Error, Result};

/// Local replay requires a completed download with a non-empty segment list.
pub fn classify(record: Option<&VideoRecord>) -> PlaybackMode {
    match record {
        Some(record) if record.is_replayable() => PlaybackMode::Local,
        _ => PlaybackMode::Live,
    }
}

/// Collaborators shared by every session of a process.
#[derive(Clone)]
pub struct SessionContext {
    pub store: Arc<dyn VideoRepository>,
    pub resolver: Arc<dyn Resolver>,
    pub opener: Arc<dyn SegmentOpener>,
    /// Parent of the per-video directories.
    pub output_dir: PathBuf,
    pub pipeline: PipelineConfig,
}

/// Everything a controller needs, decided before it is built.
struct Prepared {
    mode: PlaybackMode,
    metadata: Option<VideoMetadata>,
    segments: Vec<SegmentDescriptor>,
}

pub struct VideoSession {
    video_id: String,
    url: String,
    ctx: SessionContext,
    video_dir: PathBuf,
    cancel: CancellationToken,
}

impl VideoSession {
    /// Identify the video behind `url`. No network or store access happens yet.
    pub fn new(ctx: SessionContext, url: &str) -> Result<Self> {
        let video_id = ctx.resolver.identify(url)?;
        let video_dir = ctx.output_dir.join(sanitize_component(&video_id));
        Ok(Self {
            video_id,
            url: url.to_string(),
            ctx,
            video_dir,
            cancel: CancellationToken::new(),
        })
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn video_dir(&self) -> &std::path::Path {
        &self.video_dir
    }

    /// Abort a running [`download_only`](Self::download_only).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn record(&self) -> Result<Option<VideoRecord>> {
        self.ctx.store.get_video(&self.video_id).await
    }

    /// Build a playback controller for the video.
    ///
    /// For a video not yet on disk this first marks it `Downloading` and asks
    /// the resolver for fresh metadata and segments. `after` receives exactly
    /// one notice when the controller's run ends.
    #[instrument(skip(self, host, after), fields(video_id = %self.video_id))]
    pub async fn get_player(
        &self,
        host: Arc<dyn DecoderHost>,
        after: Option<oneshot::Sender<PlaybackFinished>>,
    ) -> Result<PlaybackController> {
        let prepared = self.prepare().await?;
        let ledger: Arc<dyn SegmentLedger> = Arc::new(StoreLedger {
            store: self.ctx.store.clone(),
            video_id: self.video_id.clone(),
        });

        let strategy: Box<dyn PlaybackStrategy> = match prepared.mode {
            PlaybackMode::Local => Box::new(LocalStrategy::new(&self.video_dir, ledger)),
            PlaybackMode::Live => Box::new(LiveStrategy::new(
                self.ctx.opener.clone(),
                self.referer(prepared.metadata.as_ref()),
                &self.video_dir,
                ledger,
            )),
        };

        Ok(PlaybackController::new(
            self.video_id.clone(),
            prepared.segments,
            prepared.metadata,
            strategy,
            host,
            self.ctx.pipeline.clone(),
            after,
        ))
    }

    /// Fetch every segment to disk without a decoder.
    ///
    /// Returns `"local: ..."` when the video was already downloaded and
    /// `"online: ..."` with per-segment statistics otherwise.
    #[instrument(skip(self), fields(video_id = %self.video_id))]
    pub async fn download_only(&self) -> Result<String> {
        self.download_inner()
            .await
            .map_err(|e| Error::download(self.video_id.clone(), e))
    }

    async fn download_inner(&self) -> Result<String> {
        let prepared = self.prepare().await?;

        if prepared.mode == PlaybackMode::Local {
            let described: Vec<String> =
                prepared.segments.iter().map(ToString::to_string).collect();
            return Ok(format!("local: {}", described.join("; ")));
        }

        let referer = self.referer(prepared.metadata.as_ref());
        let mut summaries = Vec::with_capacity(prepared.segments.len());
        for segment in &prepared.segments {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let mut source = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                source = self.ctx.opener.open(segment, &referer) => source?,
            };
            let path = self.video_dir.join(segment.file_name());
            let fetcher =
                SegmentFetcher::new(segment, &self.ctx.pipeline, self.cancel.child_token());
            let summary = fetcher.fetch(source.as_mut(), Some(&path), None).await?;
            summaries.push(summary.to_string());
        }

        StoreLedger {
            store: self.ctx.store.clone(),
            video_id: self.video_id.clone(),
        }
        .commit(&prepared.segments)
        .await?;

        info!(segments = summaries.len(), "Download complete");
        Ok(format!("online: {}", summaries.join("\n")))
    }

    async fn prepare(&self) -> Result<Prepared> {
        let existing = self.ctx.store.get_video(&self.video_id).await?;
        let mode = classify(existing.as_ref());

        if let (PlaybackMode::Local, Some(record)) = (mode, existing.as_ref()) {
            info!(segments = record.segments.len(), "Replaying from disk");
            return Ok(Prepared {
                mode,
                metadata: record.metadata.clone(),
                segments: record.segments.clone(),
            });
        }

        // Whatever was on disk before is not trusted: start over from segment zero.
        let mut record = existing.unwrap_or_else(|| VideoRecord::new(self.video_id.clone()));
        record.status = DownloadStatus::Downloading;
        record.segments.clear();
        self.ctx.store.upsert_video(&record).await.map_err(storage)?;

        let mut resolved = self.ctx.resolver.resolve_segments(&self.url).await?;
        sort_segments(&mut resolved.segments);
        info!(
            segments = resolved.segments.len(),
            title = %resolved.metadata.title,
            "Resolved video"
        );

        record.metadata = Some(resolved.metadata.clone());
        self.ctx.store.upsert_video(&record).await.map_err(storage)?;
        ensure_dir_all(&self.video_dir).await?;

        Ok(Prepared {
            mode,
            metadata: Some(resolved.metadata),
            segments: resolved.segments,
        })
    }

    fn referer(&self, metadata: Option<&VideoMetadata>) -> String {
        metadata
            .map(|m| m.url.clone())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.url.clone())
    }
}

fn storage(e: Error) -> Error {
    match e {
        Error::Storage(_) => e,
        other => Error::storage(other.to_string()),
    }
}

/// Writes a session's progress into the store, always as whole records.
struct StoreLedger {
    store: Arc<dyn VideoRepository>,
    video_id: String,
}

impl StoreLedger {
    async fn current(&self) -> Result<VideoRecord> {
        Ok(self
            .store
            .get_video(&self.video_id)
            .await
            .map_err(storage)?
            .unwrap_or_else(|| VideoRecord::new(self.video_id.clone())))
    }
}

#[async_trait]
impl SegmentLedger for StoreLedger {
    async fn commit(&self, segments: &[SegmentDescriptor]) -> Result<()> {
        let record = self
            .current()
            .await?
            .with_status(DownloadStatus::Downloaded)
            .with_segments(segments.to_vec());
        self.store.upsert_video(&record).await.map_err(|e| {
            warn!(video_id = %self.video_id, error = %e, "Failed to mark video downloaded");
            storage(e)
        })
    }

    async fn set_playing(&self, playing: bool) -> Result<()> {
        let mut record = self.current().await?;
        record.playing = playing;
        self.store.upsert_video(&record).await.map_err(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContainerFormat;

    fn segment(order: u32) -> SegmentDescriptor {
        SegmentDescriptor {
            order,
            url: format!("https://cdn.example.com/{order}.flv"),
            size: 1,
            duration_ms: 1,
            format: ContainerFormat::Flv,
        }
    }

    #[test]
    fn test_classification_covers_every_combination() {
        assert_eq!(classify(None), PlaybackMode::Live);
        for status in [
            DownloadStatus::New,
            DownloadStatus::Downloading,
            DownloadStatus::Downloaded,
        ] {
            for segments in [vec![], vec![segment(0), segment(1)]] {
                let has_segments = !segments.is_empty();
                let record = VideoRecord::new("av1").with_status(status).with_segments(segments);
                let expected = if status == DownloadStatus::Downloaded && has_segments {
                    PlaybackMode::Local
                } else {
                    PlaybackMode::Live
                };
                assert_eq!(classify(Some(&record)), expected, "{status} / {has_segments}");
            }
        }
    }

    #[test]
    fn test_playing_flag_does_not_affect_classification() {
        let mut record = VideoRecord::new("av1")
            .with_status(DownloadStatus::Downloaded)
            .with_segments(vec![segment(0)]);
        record.playing = true;
        assert_eq!(classify(Some(&record)), PlaybackMode::Local);
    }
}
