//! Stub collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{PipeReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;

use vodpipe::config::PipelineConfig;
use vodpipe::database::repositories::{SqlxVideoRepository, VideoRepository};
use vodpipe::database::{init_pool, run_migrations};
use vodpipe::domain::{ContainerFormat, SegmentDescriptor, VideoMetadata};
use vodpipe::downloader::{ByteSource, SegmentOpener};
use vodpipe::player::{DecoderExit, DecoderHandle, DecoderHost};
use vodpipe::resolver::{ResolvedVideo, Resolver};
use vodpipe::session::SessionContext;
use vodpipe::{Error, Result};

pub const VIDEO_URL: &str = "https://videos.example.com/watch/av170001";
pub const VIDEO_ID: &str = "av170001";

/// Deterministic payload of `len` bytes for segment `order`.
pub fn payload(order: u32, len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i as u32 * 31 + order * 7) % 251) as u8).collect()
}

pub fn segment(order: u32, size: u64) -> SegmentDescriptor {
    SegmentDescriptor {
        order,
        url: format!("memory://{VIDEO_ID}/{order}"),
        size,
        duration_ms: 1000 * (order as u64 + 1),
        format: ContainerFormat::Flv,
    }
}

pub fn metadata() -> VideoMetadata {
    VideoMetadata {
        url: VIDEO_URL.to_string(),
        title: "【MV】虹之间".to_string(),
        uploader: "someone".to_string(),
        description: "two segments".to_string(),
        upload_time: 1_528_000_000,
        duration_secs: 3,
    }
}

/// Resolver returning a fixed video and counting resolutions.
pub struct CountingResolver {
    resolved: Result<ResolvedVideo>,
    pub calls: AtomicUsize,
}

impl CountingResolver {
    pub fn new(segments: Vec<SegmentDescriptor>) -> Self {
        Self {
            resolved: Ok(ResolvedVideo {
                metadata: metadata(),
                segments,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn not_found() -> Self {
        Self {
            resolved: Err(Error::not_found("no such video")),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for CountingResolver {
    fn identify(&self, url: &str) -> Result<String> {
        url.rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| Error::not_found(url.to_string()))
    }

    async fn resolve_segments(&self, _url: &str) -> Result<ResolvedVideo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.resolved {
            Ok(resolved) => Ok(resolved.clone()),
            Err(e) => Err(Error::not_found(e.to_string())),
        }
    }
}

/// How an in-memory segment behaves.
#[derive(Clone)]
pub enum Body {
    Bytes(Vec<u8>),
    /// Delivers the bytes, then fails with a transfer error.
    FailAfter(Vec<u8>),
    /// Never ends; each chunk arrives after `delay`.
    Endless { chunk: usize, delay: Duration },
}

/// Serves segment bodies from memory, keyed by segment order.
#[derive(Default)]
pub struct MemoryOpener {
    bodies: Mutex<HashMap<u32, Body>>,
    pub opened: AtomicUsize,
    pub referers: Mutex<Vec<String>>,
    /// Segment orders in the sequence they were opened.
    pub orders: Mutex<Vec<u32>>,
}

impl MemoryOpener {
    pub fn with(bodies: impl IntoIterator<Item = (u32, Body)>) -> Self {
        let opener = Self::default();
        opener.bodies.lock().extend(bodies);
        opener
    }
}

#[async_trait]
impl SegmentOpener for MemoryOpener {
    async fn open(
        &self,
        segment: &SegmentDescriptor,
        referer: &str,
    ) -> Result<Box<dyn ByteSource>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.referers.lock().push(referer.to_string());
        self.orders.lock().push(segment.order);
        let body = self
            .bodies
            .lock()
            .get(&segment.order)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("segment {}", segment.order)))?;
        Ok(Box::new(MemorySource {
            body,
            offset: 0,
        }))
    }
}

struct MemorySource {
    body: Body,
    offset: usize,
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn read_chunk(&mut self, max_bytes: usize) -> Result<Bytes> {
        match &self.body {
            Body::Bytes(data) | Body::FailAfter(data) => {
                let end = (self.offset + max_bytes).min(data.len());
                let chunk = Bytes::copy_from_slice(&data[self.offset..end]);
                self.offset = end;
                if chunk.is_empty() && matches!(self.body, Body::FailAfter(_)) {
                    return Err(Error::transfer("connection reset by peer"));
                }
                Ok(chunk)
            }
            Body::Endless { chunk, delay } => {
                tokio::time::sleep(*delay).await;
                Ok(Bytes::from(vec![0xAB; (*chunk).min(max_bytes)]))
            }
        }
    }
}

/// Decoder stand-in: drains the pipe on a thread and records every byte.
#[derive(Default)]
pub struct DrainingDecoderHost {
    pub received: Arc<Mutex<Vec<u8>>>,
    pub starts: AtomicUsize,
}

impl DrainingDecoderHost {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

impl DecoderHost for DrainingDecoderHost {
    fn start(&self, mut input: PipeReader, _label: &str) -> Result<Arc<dyn DecoderHandle>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = watch::channel(None);
        let received = self.received.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match input.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => received.lock().extend_from_slice(&buf[..n]),
                }
            }
            let _ = tx.send(Some(DecoderExit::Finished(Some(0))));
        });
        Ok(Arc::new(DrainingHandle {
            exit: rx,
            stopped: AtomicBool::new(false),
        }))
    }
}

struct DrainingHandle {
    exit: watch::Receiver<Option<DecoderExit>>,
    stopped: AtomicBool,
}

#[async_trait]
impl DecoderHandle for DrainingHandle {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    async fn wait(&self) -> DecoderExit {
        if self.stopped.load(Ordering::SeqCst) {
            // A stopped decoder exits immediately.
            return DecoderExit::Stopped;
        }
        let mut rx = self.exit.clone();
        rx.wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|exit| *exit)
            .unwrap_or(DecoderExit::Stopped)
    }
}

pub async fn sqlite_store(dir: &Path) -> Arc<dyn VideoRepository> {
    let url = format!("sqlite:{}?mode=rwc", dir.join("vodpipe.db").display());
    let pool = init_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    Arc::new(SqlxVideoRepository::new(pool))
}

pub fn context(
    store: Arc<dyn VideoRepository>,
    resolver: Arc<CountingResolver>,
    opener: Arc<MemoryOpener>,
    output_dir: &Path,
) -> SessionContext {
    SessionContext {
        store,
        resolver,
        opener,
        output_dir: output_dir.to_path_buf(),
        pipeline: PipelineConfig {
            block_size: 256,
            writer_capacity: 512,
            pipe_capacity: 64 * 1024,
            ..Default::default()
        },
    }
}
