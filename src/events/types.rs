use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sequence number for ordering events
pub type EventSequence = u64;

/// Lifecycle and progress event, stamped when emitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub sequence: EventSequence,
    pub timestamp: DateTime<Utc>,
    pub payload: MonitorEventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEventPayload {
    MonitoringStarted {
        folder_path: String,
        upload_url: String,
    },

    MonitoringStopped,

    /// A scan pass found files that are neither recorded nor in flight
    NewFilesDetected { count: usize },

    UploadStarted { name: String },

    UploadSucceeded { name: String, response_body: String },

    /// The file stays a candidate for the next scan
    UploadFailed { name: String, reason: String },

    /// Directory unreadable or unwatchable
    FolderError { reason: String },
}

impl MonitorEventPayload {
    pub fn payload_type(&self) -> &'static str {
        match self {
            MonitorEventPayload::MonitoringStarted { .. } => "monitoring_started",
            MonitorEventPayload::MonitoringStopped => "monitoring_stopped",
            MonitorEventPayload::NewFilesDetected { .. } => "new_files_detected",
            MonitorEventPayload::UploadStarted { .. } => "upload_started",
            MonitorEventPayload::UploadSucceeded { .. } => "upload_succeeded",
            MonitorEventPayload::UploadFailed { .. } => "upload_failed",
            MonitorEventPayload::FolderError { .. } => "folder_error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            MonitorEventPayload::UploadFailed { .. } | MonitorEventPayload::FolderError { .. }
        )
    }

    /// File name the event is about, if any
    pub fn file_name(&self) -> Option<&str> {
        match self {
            MonitorEventPayload::UploadStarted { name }
            | MonitorEventPayload::UploadSucceeded { name, .. }
            | MonitorEventPayload::UploadFailed { name, .. } => Some(name),
            _ => None,
        }
    }

    /// One-line human-readable description
    pub fn describe(&self) -> String {
        match self {
            MonitorEventPayload::MonitoringStarted {
                folder_path,
                upload_url,
            } => format!(
                "Monitoring Started: watching {} -> {}",
                folder_path, upload_url
            ),
            MonitorEventPayload::MonitoringStopped => "Monitoring Stopped".to_string(),
            MonitorEventPayload::NewFilesDetected { count } => {
                format!("New Files Detected: {} new file(s)", count)
            }
            MonitorEventPayload::UploadStarted { name } => {
                format!("Upload Start: Uploading: {}", name)
            }
            MonitorEventPayload::UploadSucceeded {
                name,
                response_body,
            } => format!("Upload Success: {} (response: {})", name, response_body),
            MonitorEventPayload::UploadFailed { name, reason } => {
                format!("Upload Error: Failed to upload {}: {}", name, reason)
            }
            MonitorEventPayload::FolderError { reason } => format!("Folder Error: {}", reason),
        }
    }
}

impl MonitorEvent {
    pub fn payload_type(&self) -> &'static str {
        self.payload.payload_type()
    }
}
