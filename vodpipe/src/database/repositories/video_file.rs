//! Video repository backed by JSON documents inside each video directory.
//!
//! Layout under the store root, one directory per video:
//!
//! ```text
//! <root>/<video_id>/videoinfo.json   metadata document
//! <root>/<video_id>/segments.json    segment list, present once every segment is on disk
//! <root>/<video_id>/state.json       status and playing flag, written last
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::VideoRepository;
use crate::domain::{
    DownloadStatus, VideoRecord, decode_metadata, decode_segments, encode_metadata,
    encode_segments,
};
use crate::utils::filename::sanitize_component;
use crate::utils::fs::{ensure_dir_all, remove_file_if_exists, write_atomic};
use crate::{Error, Result};

const VIDEO_INFO_FILE: &str = "videoinfo.json";
const SEGMENTS_FILE: &str = "segments.json";
const STATE_FILE: &str = "state.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateDocument {
    video_id: String,
    status: i64,
    #[serde(default)]
    playing: bool,
}

/// File-per-document implementation of VideoRepository.
pub struct FileVideoRepository {
    root: PathBuf,
}

impl FileVideoRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the documents (and segment files) of a video.
    pub fn video_dir(&self, video_id: &str) -> PathBuf {
        self.root.join(sanitize_component(video_id))
    }

    async fn read_dir_record(&self, dir: &Path, fallback_id: &str) -> Result<Option<VideoRecord>> {
        let state = read_optional(&dir.join(STATE_FILE)).await?;
        let video_info = read_optional(&dir.join(VIDEO_INFO_FILE)).await?;
        let segment_info = read_optional(&dir.join(SEGMENTS_FILE)).await?;

        let (video_id, status, playing) = match state {
            Some(raw) => {
                let doc: StateDocument = serde_json::from_str(&raw).map_err(|e| {
                    Error::storage(format!("unreadable {}: {e}", dir.join(STATE_FILE).display()))
                })?;
                (doc.video_id, DownloadStatus::from_code(doc.status), doc.playing)
            }
            // Directories written before state.json existed: a segment list meant complete.
            None if segment_info.is_some() => {
                (fallback_id.to_string(), DownloadStatus::Downloaded, false)
            }
            None if video_info.is_some() => (fallback_id.to_string(), DownloadStatus::New, false),
            None => return Ok(None),
        };

        let metadata = video_info
            .as_deref()
            .map(decode_metadata)
            .transpose()
            .map_err(|e| Error::storage(format!("unreadable metadata for {video_id}: {e}")))?;
        let segments = match segment_info.as_deref() {
            Some(json) => decode_segments(json)
                .map_err(|e| Error::storage(format!("unreadable segments for {video_id}: {e}")))?,
            None => Vec::new(),
        };

        Ok(Some(VideoRecord {
            video_id,
            status,
            playing,
            metadata,
            segments,
        }))
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io_path("reading", path, e)),
    }
}

#[async_trait]
impl VideoRepository for FileVideoRepository {
    async fn get_video(&self, video_id: &str) -> Result<Option<VideoRecord>> {
        let dir = self.video_dir(video_id);
        self.read_dir_record(&dir, video_id).await
    }

    async fn upsert_video(&self, record: &VideoRecord) -> Result<()> {
        let dir = self.video_dir(&record.video_id);
        ensure_dir_all(&dir).await?;

        match &record.metadata {
            Some(meta) => {
                write_atomic(&dir.join(VIDEO_INFO_FILE), encode_metadata(meta)?.as_bytes()).await?
            }
            None => {
                remove_file_if_exists(&dir.join(VIDEO_INFO_FILE)).await?;
            }
        }

        if record.segments.is_empty() {
            remove_file_if_exists(&dir.join(SEGMENTS_FILE)).await?;
        } else {
            let segments = encode_segments(&record.segments)?;
            write_atomic(&dir.join(SEGMENTS_FILE), segments.as_bytes()).await?;
        }

        let state = StateDocument {
            video_id: record.video_id.clone(),
            status: record.status.code(),
            playing: record.playing,
        };
        write_atomic(&dir.join(STATE_FILE), &serde_json::to_vec(&state)?).await?;

        debug!(video_id = %record.video_id, status = %record.status, "Stored video record");
        Ok(())
    }

    async fn delete_video(&self, video_id: &str) -> Result<()> {
        let dir = self.video_dir(video_id);
        // segments.json goes first so a partial delete never reads as a complete download.
        for name in [SEGMENTS_FILE, STATE_FILE, VIDEO_INFO_FILE] {
            remove_file_if_exists(&dir.join(name)).await?;
        }
        Ok(())
    }

    async fn list_videos(&self) -> Result<Vec<VideoRecord>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io_path("listing", &self.root, e)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io_path("listing", &self.root, e))?
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let fallback_id = entry.file_name().to_string_lossy().into_owned();
            match self.read_dir_record(&path, &fallback_id).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    warn!(dir = %path.display(), error = %e, "Skipping unreadable video directory")
                }
            }
        }

        records.sort_by(|a, b| a.video_id.cmp(&b.video_id));
        Ok(records)
    }
}
