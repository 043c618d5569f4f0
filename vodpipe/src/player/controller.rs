//! Playback state machine.
//!
//! One controller plays one video: segments are processed strictly in order,
//! each through its own [`StreamPipe`] and decoder process. The strategy
//! decides whether bytes come from disk or from the network.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::decoder::{DecoderExit, DecoderHandle, DecoderHost};
use super::strategy::{PlaybackMode, PlaybackStrategy, SegmentInput};
use crate::config::PipelineConfig;
use crate::domain::{SegmentDescriptor, VideoMetadata, sort_segments};
use crate::downloader::{FetchSummary, LiveTarget, SegmentFetcher, StreamPipe};
use crate::{Error, Result};

/// `Idle -> Buffering -> Playing -> {Stopped, Done}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Buffering,
    Playing,
    Stopped,
    Done,
}

impl PlaybackState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Done)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Buffering => "buffering",
            Self::Playing => "playing",
            Self::Stopped => "stopped",
            Self::Done => "done",
        })
    }
}

/// Completion notice delivered to the caller's scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackFinished {
    pub video_id: String,
    pub state: PlaybackState,
    /// Set when playback ended because of an error.
    pub error: Option<String>,
}

/// What a finished `run` delivered.
#[derive(Debug, Clone)]
pub struct PlaybackReport {
    pub state: PlaybackState,
    pub summaries: Vec<FetchSummary>,
}

impl PlaybackReport {
    pub fn bytes(&self) -> u64 {
        self.summaries.iter().map(|s| s.bytes).sum()
    }
}

pub struct PlaybackController {
    video_id: String,
    segments: Vec<SegmentDescriptor>,
    metadata: Option<VideoMetadata>,
    strategy: Box<dyn PlaybackStrategy>,
    host: Arc<dyn DecoderHost>,
    config: PipelineConfig,
    cancel: CancellationToken,
    state: Mutex<PlaybackState>,
    decoder: Mutex<Option<Arc<dyn DecoderHandle>>>,
    playing_marked: AtomicBool,
    after: Mutex<Option<oneshot::Sender<PlaybackFinished>>>,
}

impl PlaybackController {
    pub fn new(
        video_id: impl Into<String>,
        mut segments: Vec<SegmentDescriptor>,
        metadata: Option<VideoMetadata>,
        strategy: Box<dyn PlaybackStrategy>,
        host: Arc<dyn DecoderHost>,
        config: PipelineConfig,
        after: Option<oneshot::Sender<PlaybackFinished>>,
    ) -> Self {
        sort_segments(&mut segments);
        Self {
            video_id: video_id.into(),
            segments,
            metadata,
            strategy,
            host,
            config,
            cancel: CancellationToken::new(),
            state: Mutex::new(PlaybackState::Idle),
            decoder: Mutex::new(None),
            playing_marked: AtomicBool::new(false),
            after: Mutex::new(after),
        }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn mode(&self) -> PlaybackMode {
        self.strategy.mode()
    }

    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.segments
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.lock()
    }

    /// Whether the last decoder reached end of stream on its own.
    pub fn is_done(&self) -> bool {
        self.state() == PlaybackState::Done
    }

    /// Total duration in seconds, zero without metadata.
    pub fn duration(&self) -> u64 {
        self.metadata.as_ref().map_or(0, |m| m.duration_secs)
    }

    pub fn title(&self) -> &str {
        self.metadata.as_ref().map_or("", |m| m.title.as_str())
    }

    pub fn uploader(&self) -> &str {
        self.metadata.as_ref().map_or("", |m| m.uploader.as_str())
    }

    /// Request cancellation and terminate the running decoder.
    ///
    /// A pending [`run`](Self::run) returns once the in-flight block is done.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.stop_decoder();
    }

    /// Feed every segment to the decoder, in order.
    ///
    /// Cancellation through [`stop`](Self::stop) is not an error: the report
    /// then carries [`PlaybackState::Stopped`]. The decoder is always stopped
    /// before this returns.
    pub async fn run(&self) -> Result<PlaybackReport> {
        {
            let mut state = self.state.lock();
            if *state != PlaybackState::Idle {
                return Err(Error::invalid_transition(*state, PlaybackState::Buffering));
            }
            *state = PlaybackState::Buffering;
        }

        info!(
            video_id = %self.video_id,
            mode = %self.mode(),
            segments = self.segments.len(),
            "Playback starting"
        );

        let mut summaries = Vec::with_capacity(self.segments.len());
        let result = self.play_segments(&mut summaries).await;
        self.teardown().await;

        let (state, outcome) = match result {
            Ok(()) => (PlaybackState::Done, Ok(())),
            Err(e) if e.is_cancelled() => (PlaybackState::Stopped, Ok(())),
            Err(e) => {
                error!(video_id = %self.video_id, error = %e, "Playback failed");
                (PlaybackState::Stopped, Err(e))
            }
        };
        *self.state.lock() = state;
        info!(video_id = %self.video_id, state = %state, "Playback finished");

        self.notify_after(state, outcome.as_ref().err());
        outcome.map(|()| PlaybackReport { state, summaries })
    }

    async fn play_segments(&self, summaries: &mut Vec<FetchSummary>) -> Result<()> {
        for segment in &self.segments {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            debug!(video_id = %self.video_id, order = segment.order, "{}", segment);

            let SegmentInput { mut source, tee } = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                input = self.strategy.next_byte_source(segment) => input?,
            };

            let mut pipe =
                StreamPipe::open(self.config.pipe_capacity, self.config.feed_queue_depth)?;
            let fetched = {
                let mut feed = DecoderFeed {
                    controller: self,
                    pipe: &mut pipe,
                    label: format!("{}#{}", self.video_id, segment.order),
                };
                SegmentFetcher::new(segment, &self.config, self.cancel.child_token())
                    .fetch(source.as_mut(), tee.as_deref(), Some(&mut feed))
                    .await
            };
            if fetched.is_err() {
                // A decoder that stopped reading would keep the feeder blocked on a
                // full pipe; killing it breaks the pipe so `close` can return.
                self.stop_decoder();
            }
            let report = pipe.close().await;
            let summary = fetched?;
            debug!(
                order = segment.order,
                piped = report.bytes_written,
                broken = report.broken,
                "Segment pipe closed"
            );

            self.wait_for_decoder().await?;
            summaries.push(summary);
        }

        if let Err(e) = self.strategy.complete(&self.segments).await {
            // The store keeps its previous status, so a later request starts over.
            error!(video_id = %self.video_id, error = %e, "Failed to record completed download");
        }
        Ok(())
    }

    async fn wait_for_decoder(&self) -> Result<()> {
        let handle = self.decoder.lock().clone();
        let Some(handle) = handle else {
            // Empty segment: nothing was ever started.
            return Ok(());
        };

        let exit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                handle.stop();
                handle.wait().await;
                return Err(Error::Cancelled);
            }
            exit = handle.wait() => exit,
        };
        *self.decoder.lock() = None;

        match exit {
            exit if exit.is_success() => Ok(()),
            DecoderExit::Stopped => Err(Error::Cancelled),
            DecoderExit::Finished(code) => Err(Error::decoder(format!(
                "decoder exited with status {}",
                code.map_or_else(|| "signal".to_string(), |c| c.to_string())
            ))),
        }
    }

    fn stop_decoder(&self) {
        let handle = self.decoder.lock().clone();
        if let Some(handle) = handle {
            handle.stop();
        }
    }

    fn attach_decoder(&self, handle: Arc<dyn DecoderHandle>) {
        if self.cancel.is_cancelled() {
            handle.stop();
        }
        *self.decoder.lock() = Some(handle);

        let mut state = self.state.lock();
        if *state == PlaybackState::Buffering {
            *state = PlaybackState::Playing;
        }
    }

    async fn mark_playing(&self, playing: bool) {
        if self.playing_marked.swap(playing, Ordering::AcqRel) == playing {
            return;
        }
        if let Err(e) = self.strategy.set_playing(playing).await {
            warn!(video_id = %self.video_id, error = %e, "Failed to update playing flag");
        }
    }

    async fn teardown(&self) {
        let handle = self.decoder.lock().take();
        if let Some(handle) = handle {
            handle.stop();
            let exit = handle.wait().await;
            debug!(video_id = %self.video_id, ?exit, "Decoder torn down");
        }
        self.mark_playing(false).await;
    }

    fn notify_after(&self, state: PlaybackState, error: Option<&Error>) {
        let Some(tx) = self.after.lock().take() else {
            return;
        };
        let finished = PlaybackFinished {
            video_id: self.video_id.clone(),
            state,
            error: error.map(|e| e.to_string()),
        };
        if tx.send(finished).is_err() {
            debug!(video_id = %self.video_id, "Playback completion receiver dropped");
        }
    }
}

/// Starts the decoder on the first chunk and forwards chunks into the pipe.
struct DecoderFeed<'a> {
    controller: &'a PlaybackController,
    pipe: &'a mut StreamPipe,
    label: String,
}

#[async_trait]
impl LiveTarget for DecoderFeed<'_> {
    async fn start(&mut self) -> Result<()> {
        let reader = self
            .pipe
            .take_reader()
            .ok_or_else(|| Error::invalid_transition("decoding", "starting decoder"))?;
        let handle = self.controller.host.start(reader, &self.label)?;
        self.controller.attach_decoder(handle);
        self.controller.mark_playing(true).await;
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.pipe.write(chunk).await
    }
}
