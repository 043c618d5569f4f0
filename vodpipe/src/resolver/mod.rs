//! Turning a video URL into metadata and a segment list.
//!
//! Site scraping lives outside this crate. [`ManifestResolver`] reads a JSON
//! manifest in the same document shapes the store uses:
//!
//! ```json
//! {
//!   "video": {"title": "...", "uploader": "...", "description": "...",
//!             "uploadTime": 1528000000, "duration": 245, "url": "..."},
//!   "segments": [{"order": 0, "format": "flv", "url": "...", "size": 1000, "length": 60000}]
//! }
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::domain::{
    SegmentDescriptor, SegmentDocument, VideoInfoDocument, VideoMetadata, sort_segments,
};
use crate::utils::filename::sanitize_component;
use crate::{Error, Result};

/// Metadata plus segments, in playback order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVideo {
    pub metadata: VideoMetadata,
    pub segments: Vec<SegmentDescriptor>,
}

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Derive the stable video identifier without touching the network.
    fn identify(&self, url: &str) -> Result<String>;

    /// Fetch fresh metadata and segment descriptors.
    ///
    /// Fails with `NotFound` when the URL is not a supported video and with
    /// `Upstream` when the remote service misbehaves.
    async fn resolve_segments(&self, url: &str) -> Result<ResolvedVideo>;
}

#[derive(Debug, Deserialize)]
struct ManifestDocument {
    #[serde(default)]
    video: Option<VideoInfoDocument>,
    segments: Vec<SegmentDocument>,
}

pub struct ManifestResolver {
    client: reqwest::Client,
}

impl ManifestResolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Parse a manifest body fetched from `url`.
pub fn parse_manifest(url: &str, body: &str) -> Result<ResolvedVideo> {
    let doc: ManifestDocument = serde_json::from_str(body)
        .map_err(|e| Error::upstream(format!("invalid manifest at {url}: {e}")))?;
    if doc.segments.is_empty() {
        return Err(Error::not_found(format!("{url} lists no segments")));
    }

    let mut metadata: VideoMetadata = doc.video.map(Into::into).unwrap_or_default();
    if metadata.url.is_empty() {
        metadata.url = url.to_string();
    }
    let mut segments: Vec<SegmentDescriptor> = doc.segments.into_iter().map(Into::into).collect();
    sort_segments(&mut segments);

    Ok(ResolvedVideo { metadata, segments })
}

#[async_trait]
impl Resolver for ManifestResolver {
    fn identify(&self, url: &str) -> Result<String> {
        let parsed =
            url::Url::parse(url).map_err(|_| Error::not_found(format!("not a URL: {url}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::not_found(format!("unsupported scheme: {url}")));
        }

        let last = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .ok_or_else(|| Error::not_found(format!("no video identifier in {url}")))?;
        let stem = match last.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => last,
        };
        Ok(sanitize_component(stem))
    }

    async fn resolve_segments(&self, url: &str) -> Result<ResolvedVideo> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("requesting {url}: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::not_found(format!("{url} returned 404")));
        }
        if !status.is_success() {
            return Err(Error::upstream(format!("{url} returned HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::upstream(format!("reading {url}: {e}")))?;
        let resolved = parse_manifest(url, &body)?;
        debug!(url, segments = resolved.segments.len(), "Manifest resolved");
        Ok(resolved)
    }
}
