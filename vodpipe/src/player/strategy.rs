//! Where a controller's segment bytes come from.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::domain::SegmentDescriptor;
use crate::downloader::{ByteSource, FileByteSource, SegmentOpener};

/// Local replay or live acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Local,
    Live,
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Live => "live",
        })
    }
}

/// Bytes of one segment plus an optional file to tee them into.
pub struct SegmentInput {
    pub source: Box<dyn ByteSource>,
    pub tee: Option<PathBuf>,
}

/// Durable bookkeeping the strategies report into.
#[async_trait]
pub trait SegmentLedger: Send + Sync {
    /// Record that every segment is on disk.
    async fn commit(&self, segments: &[SegmentDescriptor]) -> Result<()>;

    async fn set_playing(&self, playing: bool) -> Result<()>;
}

#[async_trait]
pub trait PlaybackStrategy: Send + Sync {
    fn mode(&self) -> PlaybackMode;

    async fn next_byte_source(&self, segment: &SegmentDescriptor) -> Result<SegmentInput>;

    /// Called once after every segment was delivered.
    async fn complete(&self, segments: &[SegmentDescriptor]) -> Result<()>;

    async fn set_playing(&self, playing: bool) -> Result<()>;
}

/// Replays segment files from the video directory.
pub struct LocalStrategy {
    dir: PathBuf,
    ledger: Arc<dyn SegmentLedger>,
}

impl LocalStrategy {
    pub fn new(dir: impl Into<PathBuf>, ledger: Arc<dyn SegmentLedger>) -> Self {
        Self {
            dir: dir.into(),
            ledger,
        }
    }
}

#[async_trait]
impl PlaybackStrategy for LocalStrategy {
    fn mode(&self) -> PlaybackMode {
        PlaybackMode::Local
    }

    async fn next_byte_source(&self, segment: &SegmentDescriptor) -> Result<SegmentInput> {
        let source = FileByteSource::open(&self.dir.join(segment.file_name())).await?;
        Ok(SegmentInput {
            source: Box::new(source),
            tee: None,
        })
    }

    async fn complete(&self, _segments: &[SegmentDescriptor]) -> Result<()> {
        Ok(())
    }

    async fn set_playing(&self, playing: bool) -> Result<()> {
        self.ledger.set_playing(playing).await
    }
}

/// Fetches segments from the network, teeing them into the video directory.
pub struct LiveStrategy {
    opener: Arc<dyn SegmentOpener>,
    referer: String,
    dir: PathBuf,
    ledger: Arc<dyn SegmentLedger>,
}

impl LiveStrategy {
    pub fn new(
        opener: Arc<dyn SegmentOpener>,
        referer: impl Into<String>,
        dir: impl Into<PathBuf>,
        ledger: Arc<dyn SegmentLedger>,
    ) -> Self {
        Self {
            opener,
            referer: referer.into(),
            dir: dir.into(),
            ledger,
        }
    }
}

#[async_trait]
impl PlaybackStrategy for LiveStrategy {
    fn mode(&self) -> PlaybackMode {
        PlaybackMode::Live
    }

    async fn next_byte_source(&self, segment: &SegmentDescriptor) -> Result<SegmentInput> {
        let source = self.opener.open(segment, &self.referer).await?;
        Ok(SegmentInput {
            source,
            tee: Some(self.dir.join(segment.file_name())),
        })
    }

    async fn complete(&self, segments: &[SegmentDescriptor]) -> Result<()> {
        self.ledger.commit(segments).await
    }

    async fn set_playing(&self, playing: bool) -> Result<()> {
        self.ledger.set_playing(playing).await
    }
}
