//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// The input does not identify a supported video.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The resolver or remote API failed.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A network fault interrupted a segment transfer.
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// The decoder process could not be started or crashed.
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// The persistent store rejected a write or returned unreadable data.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A disk-only download of a video failed.
    #[error("Download of {video_id} failed: {source}")]
    Download {
        video_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} {path}: {source}")]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    pub fn decoder(msg: impl Into<String>) -> Self {
        Self::Decoder(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Wrap the cause of a failed disk-only download.
    ///
    /// Resolver failures are surfaced verbatim rather than wrapped.
    pub fn download(video_id: impl Into<String>, source: Error) -> Self {
        match source {
            Self::NotFound(_) | Self::Upstream(_) | Self::Download { .. } => source,
            other => Self::Download {
                video_id: video_id.into(),
                source: Box::new(other),
            },
        }
    }

    /// Whether re-invoking the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream(_) | Self::Transfer(_) | Self::Io(_) | Self::IoPath { .. } => true,
            Self::Download { source, .. } => source.is_retryable(),
            Self::NotFound(_)
            | Self::Decoder(_)
            | Self::Storage(_)
            | Self::Cancelled
            | Self::InvalidStateTransition { .. }
            | Self::Configuration(_)
            | Self::DatabaseSqlx(_)
            | Self::Migration(_)
            | Self::Serialization(_) => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
