//! Error types for mirror operations.

use reqwest::StatusCode;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while listing, scanning or downloading.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network-level failure (connect, timeout, stalled body) after retries ran out.
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Non-2xx response that was either not retryable or still failing after retries.
    #[error("{url} returned HTTP {status}")]
    HttpStatus {
        url: String,
        status: StatusCode,
        /// `Retry-After` hint carried by a 429 response.
        retry_after: Option<Duration>,
    },

    /// Response body that could not be parsed as the expected JSON.
    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    /// Filesystem failure, including failures of the external download helper.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Missing or inconsistent configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The remote API broke its contract (e.g. no download link).
    #[error("Resource error: {0}")]
    Resource(String),
}

impl SyncError {
    pub(crate) fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        SyncError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn transport(
        url: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        SyncError::Transport {
            url: url.to_string(),
            source: source.into(),
        }
    }

    /// HTTP status of the failure, if it was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SyncError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for mirror operations
pub type Result<T> = std::result::Result<T, SyncError>;
