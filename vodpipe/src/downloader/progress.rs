//! Transfer progress accounting for a single segment fetch.

use std::time::Duration;

use tokio::time::Instant;

use crate::utils::format::{format_bytes, format_rate};

/// Bytes-transferred bookkeeping for one fetch.
///
/// Purely in-memory; nothing here blocks or performs I/O. The sample window
/// (`sample_at`, `sample_bytes`) is what [`status`](Self::status) measures the
/// instantaneous rate over, and is reset by every call to it.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: u64,
    transferred: u64,
    started: Instant,
    ended: Option<Instant>,
    sample_at: Instant,
    sample_bytes: u64,
}

impl ProgressTracker {
    /// Create a tracker for a transfer of `total` declared bytes.
    pub fn new(total: u64) -> Self {
        let now = Instant::now();
        Self {
            total,
            transferred: 0,
            started: now,
            ended: None,
            sample_at: now,
            sample_bytes: 0,
        }
    }

    /// Record the baseline timestamp. Resets any previous counts.
    pub fn start(&mut self) {
        let now = Instant::now();
        self.transferred = 0;
        self.started = now;
        self.ended = None;
        self.sample_at = now;
        self.sample_bytes = 0;
    }

    pub fn record(&mut self, bytes: usize) {
        self.transferred += bytes as u64;
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Whether more than `threshold` has passed since the last status sample.
    ///
    /// Used to decide when a liveness snapshot is due in the logs; it never
    /// aborts a transfer.
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        self.sample_at.elapsed() > threshold
    }

    /// Format a snapshot and start a new sample window.
    pub fn status(&mut self) -> String {
        let now = Instant::now();
        let window = now.duration_since(self.sample_at).as_secs_f64();
        let delta = self.transferred.saturating_sub(self.sample_bytes);
        let rate = if window > 0.0 {
            delta as f64 / window
        } else {
            0.0
        };

        self.sample_at = now;
        self.sample_bytes = self.transferred;

        format!(
            "Read ({} / {}) {}",
            format_bytes(self.transferred),
            format_bytes(self.total),
            format_rate(rate)
        )
    }

    pub fn end(&mut self) {
        self.ended = Some(Instant::now());
    }

    /// Wall time from `start` until `end` (or now, while still running).
    pub fn elapsed(&self) -> Duration {
        self.ended
            .unwrap_or_else(Instant::now)
            .duration_since(self.started)
    }

    /// Average bytes per second over the whole transfer; zero when no time elapsed.
    pub fn average_throughput(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.transferred as f64 / secs
    }
}
