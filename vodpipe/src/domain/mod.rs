//! Domain types of the acquisition pipeline.

pub mod codec;
pub mod video;

pub use codec::{
    SegmentDocument, VideoInfoDocument, decode_metadata, decode_segments, encode_metadata,
    encode_segments,
};
pub use video::{
    ContainerFormat, DownloadStatus, SegmentDescriptor, VideoMetadata, VideoRecord, sort_segments,
};
