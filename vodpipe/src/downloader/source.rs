//! Per-segment byte sources.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{HeaderValue, ORIGIN, RANGE, REFERER};
use tokio::io::AsyncReadExt;
use tracing::{debug, trace};

use crate::domain::SegmentDescriptor;
use crate::{Error, Result};

/// A readable stream of one segment's bytes.
#[async_trait]
pub trait ByteSource: Send {
    /// Read at most `max_bytes`. An empty result marks end of stream.
    async fn read_chunk(&mut self, max_bytes: usize) -> Result<Bytes>;
}

/// Opens the network byte source of a segment.
#[async_trait]
pub trait SegmentOpener: Send + Sync {
    /// `referer` is the canonical page URL of the video the segment belongs to.
    async fn open(&self, segment: &SegmentDescriptor, referer: &str) -> Result<Box<dyn ByteSource>>;
}

/// HTTP response body read chunk by chunk.
pub struct HttpByteSource {
    stream: BoxStream<'static, reqwest::Result<Bytes>>,
    pending: Bytes,
    url: String,
}

impl HttpByteSource {
    pub fn new(response: reqwest::Response) -> Self {
        let url = response.url().to_string();
        Self {
            stream: response.bytes_stream().boxed(),
            pending: Bytes::new(),
            url,
        }
    }
}

#[async_trait]
impl ByteSource for HttpByteSource {
    async fn read_chunk(&mut self, max_bytes: usize) -> Result<Bytes> {
        while self.pending.is_empty() {
            match self.stream.next().await {
                Some(Ok(frame)) => self.pending = frame,
                Some(Err(e)) => {
                    return Err(Error::transfer(format!("reading {}: {e}", self.url)));
                }
                None => return Ok(Bytes::new()),
            }
        }
        let n = max_bytes.max(1).min(self.pending.len());
        Ok(self.pending.split_to(n))
    }
}

/// Opens segments over HTTP with the headers the CDN expects.
pub struct HttpSegmentOpener {
    client: reqwest::Client,
}

impl HttpSegmentOpener {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn origin_of(referer: &str) -> Option<HeaderValue> {
    let url = url::Url::parse(referer).ok()?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return None;
    }
    HeaderValue::from_str(&origin.ascii_serialization()).ok()
}

#[async_trait]
impl SegmentOpener for HttpSegmentOpener {
    async fn open(
        &self,
        segment: &SegmentDescriptor,
        referer: &str,
    ) -> Result<Box<dyn ByteSource>> {
        let mut request = self
            .client
            .get(&segment.url)
            .header(RANGE, HeaderValue::from_static("bytes=0-"));
        if !referer.is_empty() {
            request = request.header(REFERER, referer);
            if let Some(origin) = origin_of(referer) {
                request = request.header(ORIGIN, origin);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::transfer(format!("requesting segment {}: {e}", segment.order)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::not_found(format!("segment {} returned 404", segment.order)));
        }
        if !status.is_success() {
            return Err(Error::transfer(format!(
                "segment {} returned HTTP {status}",
                segment.order
            )));
        }

        debug!(
            order = segment.order,
            status = %status,
            content_length = ?response.content_length(),
            "Segment response received"
        );
        Ok(Box::new(HttpByteSource::new(response)))
    }
}

/// Segment file already on disk.
pub struct FileByteSource {
    file: tokio::fs::File,
    path: PathBuf,
}

impl FileByteSource {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| Error::io_path("opening", path, e))?;
        trace!(path = %path.display(), "Opened local segment");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

#[async_trait]
impl ByteSource for FileByteSource {
    async fn read_chunk(&mut self, max_bytes: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(max_bytes.max(1));
        let n = self
            .file
            .read(&mut buf)
            .await
            .map_err(|e| Error::io_path("reading", &self.path, e))?;
        buf.truncate(n);
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_source_reads_in_blocks_until_eof() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("0.flv");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, &data).await.unwrap();

        let mut source = FileByteSource::open(&path).await.unwrap();
        let mut received = Vec::new();
        loop {
            let chunk = source.read_chunk(4096).await.unwrap();
            if chunk.is_empty() {
                break;
            }
            assert!(chunk.len() <= 4096);
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = FileByteSource::open(&temp.path().join("9.mp4")).await.err().unwrap();
        assert!(matches!(err, Error::IoPath { .. }));
    }

    #[test]
    fn test_origin_of_referer() {
        assert_eq!(
            origin_of("https://www.example.com/video/av1?p=2").unwrap(),
            "https://www.example.com"
        );
        assert!(origin_of("not a url").is_none());
    }
}
