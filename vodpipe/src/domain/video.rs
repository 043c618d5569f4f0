//! Video, segment and download-status domain types.

use std::fmt;

use crate::utils::format::format_bytes;

/// Container format of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    Flv,
    Mp4,
}

impl ContainerFormat {
    /// Derive the container from a remote format hint such as `"flv720"` or `"mp4"`.
    ///
    /// Any hint mentioning `flv` is FLV; everything else is treated as MP4.
    pub fn from_hint(hint: &str) -> Self {
        if hint.to_ascii_lowercase().contains("flv") {
            Self::Flv
        } else {
            Self::Mp4
        }
    }

    /// File extension (and serialized name) of the container.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Flv => "flv",
            Self::Mp4 => "mp4",
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One independently fetchable chunk of a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// Sequence position; defines playback order.
    pub order: u32,
    /// Remote locator of the segment bytes.
    pub url: String,
    /// Declared total size in bytes (may be approximate).
    pub size: u64,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    pub format: ContainerFormat,
}

impl SegmentDescriptor {
    /// On-disk file name of the segment, e.g. `0.flv`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.order, self.format.extension())
    }
}

impl fmt::Display for SegmentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.duration_ms / 1000;
        write!(
            f,
            "format: {} size: {} length: {}m {}s",
            self.format,
            format_bytes(self.size),
            secs / 60,
            secs % 60
        )
    }
}

/// Sort segments into playback order.
pub fn sort_segments(segments: &mut [SegmentDescriptor]) {
    segments.sort_by_key(|s| s.order);
}

/// Descriptive metadata of a video.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoMetadata {
    /// Canonical URL of the video page.
    pub url: String,
    pub title: String,
    pub uploader: String,
    pub description: String,
    /// Upload time as a unix timestamp in seconds.
    pub upload_time: i64,
    /// Total duration in seconds.
    pub duration_secs: u64,
}

impl fmt::Display for VideoMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "title: {} uploader: {} \ndescription: {}",
            self.title, self.uploader, self.description
        )
    }
}

/// Download lifecycle of a video.
///
/// `New -> Downloading -> Downloaded`; only `Downloaded` allows replay from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DownloadStatus {
    #[default]
    New,
    Downloading,
    Downloaded,
}

impl DownloadStatus {
    /// Stable numeric code used by the store.
    pub fn code(&self) -> i64 {
        match self {
            Self::New => 1,
            Self::Downloading => 2,
            Self::Downloaded => 10,
        }
    }

    /// Parse a stored code. Unknown codes read as `New` so the video is fetched again.
    pub fn from_code(code: i64) -> Self {
        match code {
            2 => Self::Downloading,
            10 => Self::Downloaded,
            _ => Self::New,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent-store entry for one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRecord {
    pub video_id: String,
    pub status: DownloadStatus,
    /// Orthogonal to `status`: set while a playback of the video is in progress.
    pub playing: bool,
    pub metadata: Option<VideoMetadata>,
    /// Segments in playback order. Only populated once every segment is on disk.
    pub segments: Vec<SegmentDescriptor>,
}

impl VideoRecord {
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            status: DownloadStatus::New,
            playing: false,
            metadata: None,
            segments: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: DownloadStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_metadata(mut self, metadata: VideoMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_segments(mut self, mut segments: Vec<SegmentDescriptor>) -> Self {
        sort_segments(&mut segments);
        self.segments = segments;
        self
    }

    /// Whether every segment is durably on disk and may be replayed locally.
    pub fn is_replayable(&self) -> bool {
        self.status == DownloadStatus::Downloaded && !self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(order: u32) -> SegmentDescriptor {
        SegmentDescriptor {
            order,
            url: format!("https://cdn.example.com/{order}.flv"),
            size: 1536,
            duration_ms: 200_000,
            format: ContainerFormat::Flv,
        }
    }

    #[test]
    fn test_container_from_hint() {
        assert_eq!(ContainerFormat::from_hint("flv720"), ContainerFormat::Flv);
        assert_eq!(ContainerFormat::from_hint("hdflv2"), ContainerFormat::Flv);
        assert_eq!(ContainerFormat::from_hint("mp4"), ContainerFormat::Mp4);
        assert_eq!(ContainerFormat::from_hint(""), ContainerFormat::Mp4);
    }

    #[test]
    fn test_segment_file_name_and_display() {
        let s = segment(3);
        assert_eq!(s.file_name(), "3.flv");
        assert_eq!(s.to_string(), "format: flv size: 1.5KiB length: 3m 20s");
    }

    #[test]
    fn test_status_codes() {
        for status in [
            DownloadStatus::New,
            DownloadStatus::Downloading,
            DownloadStatus::Downloaded,
        ] {
            assert_eq!(DownloadStatus::from_code(status.code()), status);
        }
        // Legacy rows were inserted with status 0; the "playing" code 3 is now a flag.
        assert_eq!(DownloadStatus::from_code(0), DownloadStatus::New);
        assert_eq!(DownloadStatus::from_code(3), DownloadStatus::New);
    }

    #[test]
    fn test_record_sorts_segments() {
        let record =
            VideoRecord::new("av1").with_segments(vec![segment(2), segment(0), segment(1)]);
        let orders: Vec<u32> = record.segments.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn test_replayable_requires_status_and_segments() {
        assert!(!VideoRecord::new("av1").is_replayable());
        assert!(
            !VideoRecord::new("av1")
                .with_status(DownloadStatus::Downloaded)
                .is_replayable()
        );
        assert!(
            VideoRecord::new("av1")
                .with_status(DownloadStatus::Downloaded)
                .with_segments(vec![segment(0)])
                .is_replayable()
        );
    }
}
