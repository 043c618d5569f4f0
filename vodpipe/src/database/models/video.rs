//! Video row model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::Result;
use crate::domain::{
    DownloadStatus, VideoRecord, decode_metadata, decode_segments, encode_metadata,
    encode_segments,
};

/// Video database model.
/// One row per video identifier, always written whole.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VideoDbModel {
    pub video_id: String,
    /// 1 = new, 2 = downloading, 10 = downloaded
    pub status: i64,
    pub playing: bool,
    /// JSON metadata document (null until resolved)
    pub video_info: Option<String>,
    /// JSON segment list (null until every segment is on disk)
    pub segment_info: Option<String>,
    /// ISO 8601 timestamp of the last write
    pub updated_at: String,
}

impl VideoDbModel {
    /// Encode a domain record into a row.
    pub fn from_record(record: &VideoRecord) -> Result<Self> {
        let video_info = record.metadata.as_ref().map(encode_metadata).transpose()?;
        let segment_info = if record.segments.is_empty() {
            None
        } else {
            Some(encode_segments(&record.segments)?)
        };

        Ok(Self {
            video_id: record.video_id.clone(),
            status: record.status.code(),
            playing: record.playing,
            video_info,
            segment_info,
            updated_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Decode the row back into a domain record.
    pub fn into_record(self) -> Result<VideoRecord> {
        let metadata = self.video_info.as_deref().map(decode_metadata).transpose()?;
        let segments = match self.segment_info.as_deref() {
            Some(json) => decode_segments(json)?,
            None => Vec::new(),
        };

        Ok(VideoRecord {
            video_id: self.video_id,
            status: DownloadStatus::from_code(self.status),
            playing: self.playing,
            metadata,
            segments,
        })
    }
}
