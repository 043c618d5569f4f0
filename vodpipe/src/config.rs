//! Runtime configuration.
//!
//! Values come from the process environment (optionally seeded from a `.env`
//! file by `dotenvy` in `main`). Every knob has a default so an empty
//! environment yields a working configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const PAGE_SIZE: usize = 4096;

/// Default network read block and disk-writer buffer size (128 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 32 * PAGE_SIZE;

/// Default OS pipe capacity hint (1 MiB).
pub const DEFAULT_PIPE_CAPACITY: usize = 256 * PAGE_SIZE;

/// Default user agent for segment requests.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 ",
    "(KHTML, like Gecko) Chrome/120.0 Safari/537.36"
);

/// Tuning for the fetch / write / pipe stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum bytes requested per network read.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// In-memory buffer size of the buffered disk writer.
    #[serde(default = "default_block_size")]
    pub writer_capacity: usize,
    /// Requested OS pipe buffer size toward the decoder.
    #[serde(default = "default_pipe_capacity")]
    pub pipe_capacity: usize,
    /// Chunks that may wait for the pipe feeder thread before the fetch loop is suspended.
    #[serde(default = "default_feed_queue_depth")]
    pub feed_queue_depth: usize,
    /// Interval after which a progress snapshot is logged.
    #[serde(default = "default_stall_threshold_secs")]
    pub stall_threshold_secs: u64,
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_pipe_capacity() -> usize {
    DEFAULT_PIPE_CAPACITY
}

fn default_feed_queue_depth() -> usize {
    4
}

fn default_stall_threshold_secs() -> u64 {
    3
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            writer_capacity: default_block_size(),
            pipe_capacity: default_pipe_capacity(),
            feed_queue_depth: default_feed_queue_depth(),
            stall_threshold_secs: default_stall_threshold_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn stall_threshold(&self) -> Duration {
        Duration::from_secs(self.stall_threshold_secs)
    }

    /// Reject sizes that would make the pipeline spin or never flush.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::config("block size must be greater than zero"));
        }
        if self.writer_capacity == 0 {
            return Err(Error::config("writer capacity must be greater than zero"));
        }
        if self.feed_queue_depth == 0 {
            return Err(Error::config("feed queue depth must be greater than zero"));
        }
        Ok(())
    }

    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            block_size: env_parse("VODPIPE_BLOCK_SIZE", defaults.block_size)?,
            writer_capacity: env_parse("VODPIPE_WRITER_CAPACITY", defaults.writer_capacity)?,
            pipe_capacity: env_parse("VODPIPE_PIPE_CAPACITY", defaults.pipe_capacity)?,
            feed_queue_depth: env_parse("VODPIPE_FEED_QUEUE", defaults.feed_queue_depth)?,
            stall_threshold_secs: env_parse("VODPIPE_STALL_SECS", defaults.stall_threshold_secs)?,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Persistent store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// SQLite database through sqlx.
    #[default]
    Sqlite,
    /// JSON documents inside each video directory.
    Files,
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "db" => Ok(Self::Sqlite),
            "files" | "file" | "json" => Ok(Self::Files),
            other => Err(Error::config(format!("unknown store backend `{other}`"))),
        }
    }
}

/// Decoder program and its arguments. `pipe:0` style arguments read the pipe from stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            program: "ffplay".to_string(),
            args: ["-nodisp", "-autoexit", "-loglevel", "error", "-i", "pipe:0"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub store_backend: StoreBackend,
    /// Root directory holding one sub-directory per video.
    pub output_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub decoder: DecoderConfig,
    pub user_agent: String,
    pub http_connect_timeout: Duration,
    pub pipeline: PipelineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:vodpipe.db?mode=rwc".to_string(),
            store_backend: StoreBackend::default(),
            output_dir: PathBuf::from("./videos"),
            log_dir: None,
            decoder: DecoderConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_connect_timeout: Duration::from_secs(15),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Build the configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let decoder = DecoderConfig {
            program: env_string("VODPIPE_DECODER").unwrap_or(defaults.decoder.program),
            args: env_string("VODPIPE_DECODER_ARGS")
                .map(|raw| raw.split_whitespace().map(String::from).collect())
                .unwrap_or(defaults.decoder.args),
        };

        Ok(Self {
            database_url: env_string("DATABASE_URL").unwrap_or(defaults.database_url),
            store_backend: match env_string("VODPIPE_STORE") {
                Some(raw) => raw.parse()?,
                None => defaults.store_backend,
            },
            output_dir: env_string("VODPIPE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            log_dir: env_string("VODPIPE_LOG_DIR").map(PathBuf::from),
            decoder,
            user_agent: env_string("VODPIPE_USER_AGENT").unwrap_or(defaults.user_agent),
            http_connect_timeout: Duration::from_secs(env_parse(
                "VODPIPE_HTTP_TIMEOUT_SECS",
                defaults.http_connect_timeout.as_secs(),
            )?),
            pipeline: PipelineConfig::from_env()?,
        })
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::config(format!("{key} has an invalid value `{raw}`"))),
        None => Ok(default),
    }
}
