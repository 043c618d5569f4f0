//! Serialized representations of video metadata and segment lists.
//!
//! The in-memory types in [`super::video`] never derive serde; these documents
//! are the only shape written to the store or read from a manifest, so the
//! storage format can evolve without touching the domain types.

use serde::{Deserialize, Serialize};

use super::video::{ContainerFormat, SegmentDescriptor, VideoMetadata};
use crate::Result;

/// JSON document for [`VideoMetadata`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfoDocument {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub uploader: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub upload_time: i64,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub url: String,
}

impl From<&VideoMetadata> for VideoInfoDocument {
    fn from(meta: &VideoMetadata) -> Self {
        Self {
            title: meta.title.clone(),
            uploader: meta.uploader.clone(),
            description: meta.description.clone(),
            upload_time: meta.upload_time,
            duration: meta.duration_secs,
            url: meta.url.clone(),
        }
    }
}

impl From<VideoInfoDocument> for VideoMetadata {
    fn from(doc: VideoInfoDocument) -> Self {
        Self {
            url: doc.url,
            title: doc.title,
            uploader: doc.uploader,
            description: doc.description,
            upload_time: doc.upload_time,
            duration_secs: doc.duration,
        }
    }
}

/// JSON document for one [`SegmentDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDocument {
    pub order: u32,
    pub format: String,
    pub url: String,
    pub size: u64,
    /// Duration in milliseconds.
    pub length: u64,
}

impl From<&SegmentDescriptor> for SegmentDocument {
    fn from(segment: &SegmentDescriptor) -> Self {
        Self {
            order: segment.order,
            format: segment.format.extension().to_string(),
            url: segment.url.clone(),
            size: segment.size,
            length: segment.duration_ms,
        }
    }
}

impl From<SegmentDocument> for SegmentDescriptor {
    fn from(doc: SegmentDocument) -> Self {
        Self {
            order: doc.order,
            url: doc.url,
            size: doc.size,
            duration_ms: doc.length,
            format: ContainerFormat::from_hint(&doc.format),
        }
    }
}

pub fn encode_metadata(meta: &VideoMetadata) -> Result<String> {
    Ok(serde_json::to_string(&VideoInfoDocument::from(meta))?)
}

pub fn decode_metadata(json: &str) -> Result<VideoMetadata> {
    let doc: VideoInfoDocument = serde_json::from_str(json)?;
    Ok(doc.into())
}

pub fn encode_segments(segments: &[SegmentDescriptor]) -> Result<String> {
    let docs: Vec<SegmentDocument> = segments.iter().map(SegmentDocument::from).collect();
    Ok(serde_json::to_string(&docs)?)
}

/// Decode a segment list, returned in playback order.
pub fn decode_segments(json: &str) -> Result<Vec<SegmentDescriptor>> {
    let docs: Vec<SegmentDocument> = serde_json::from_str(json)?;
    let mut segments: Vec<SegmentDescriptor> = docs.into_iter().map(Into::into).collect();
    super::video::sort_segments(&mut segments);
    Ok(segments)
}
