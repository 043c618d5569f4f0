//! Segment acquisition: network and file byte sources, progress accounting,
//! the queue-backed disk writer and the decoder pipe.

pub mod fetcher;
pub mod pipe;
pub mod progress;
pub mod source;
pub mod writer;

pub use fetcher::{FetchSummary, LiveTarget, SegmentFetcher};
pub use pipe::{PipeReport, StreamPipe};
pub use progress::ProgressTracker;
pub use source::{ByteSource, FileByteSource, HttpByteSource, HttpSegmentOpener, SegmentOpener};
pub use writer::BufferedDiskWriter;
