//! Type definitions for the uploader.
//!
//! Defines PendingUpload, ServerResponse, UploadError and timing constants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// Whole request/response exchange, one attempt per file
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// A candidate handed from a scan pass to the uploader. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUpload {
    pub name: String,
    pub absolute_path: PathBuf,
    pub detected_size: u64,
    pub detected_at: DateTime<Utc>,
}

/// Successful (2xx) reply from the upload endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerResponse {
    pub status: u16,
    /// Body exactly as received
    pub body: String,
    /// Best-effort parse of `body`, for logging only
    pub json: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// The file could not be read before sending
    #[error("Error reading {name}: {message}")]
    Read { name: String, message: String },

    /// Connection-level failure (DNS, refused, reset, TLS)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Endpoint answered with a non-2xx status
    #[error("Rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// No complete response within the upload timeout
    #[error("Upload timed out")]
    Timeout,
}

impl UploadError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, UploadError::Timeout)
    }
}
