use std::path::PathBuf;
use thiserror::Error;

/// Shotwatch application errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Watched directory missing, unreadable or unwatchable
    #[error("Folder error: {0}")]
    Folder(String),

    /// Persisted state exists but cannot be parsed
    #[error("Storage corrupt ({}): {message}", path.display())]
    StorageCorrupt { path: PathBuf, message: String },

    /// Persisted state cannot be written
    #[error("Storage write error ({}): {source}", path.display())]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid input at the control surface (bad URL, bad path)
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn storage_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::StorageWrite {
            path: path.into(),
            source,
        }
    }
}

/// Presentation layers only get a human-readable string
impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> Result<T, AppError>;
}

impl<T, E: Into<AppError>> ErrorContext<T> for Result<T, E> {
    fn context(self, msg: &str) -> Result<T, AppError> {
        self.map_err(|e| {
            let err: AppError = e.into();
            match err {
                AppError::Folder(s) => AppError::Folder(format!("{}: {}", msg, s)),
                AppError::Validation(s) => AppError::Validation(format!("{}: {}", msg, s)),
                AppError::Other(s) => AppError::Other(format!("{}: {}", msg, s)),
                AppError::StorageCorrupt { path, message } => AppError::StorageCorrupt {
                    path,
                    message: format!("{}: {}", msg, message),
                },
                AppError::Io(e) => AppError::Other(format!("{}: {}", msg, e)),
                other => other,
            }
        })
    }
}
