//! `reqwest` implementation of the uploader.
//!
//! The file is read fully into memory and sent base64-encoded in a single
//! JSON POST. Very large files are therefore fully buffered (roughly 1.33x
//! their size once encoded); screenshots are well within that ceiling.

use super::payload::UploadRequestBody;
use super::types::{PendingUpload, ServerResponse, UploadError, UPLOAD_TIMEOUT};
use super::FileUploader;
use crate::error::AppError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
}

impl HttpUploader {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(UPLOAD_TIMEOUT)
    }

    /// Timeout covers connect, send and reading the whole response.
    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FileUploader for HttpUploader {
    async fn upload(
        &self,
        pending: &PendingUpload,
        endpoint: &Url,
    ) -> Result<ServerResponse, UploadError> {
        let contents =
            tokio::fs::read(&pending.absolute_path)
                .await
                .map_err(|e| UploadError::Read {
                    name: pending.name.clone(),
                    message: e.to_string(),
                })?;

        let body = serde_json::to_vec(&UploadRequestBody::new(&pending.name, &contents))
            .map_err(|e| UploadError::Transport {
                message: format!("Failed to encode request body: {}", e),
            })?;

        debug!(
            file = %pending.name,
            endpoint = %endpoint,
            bytes = contents.len(),
            encoded_bytes = body.len(),
            "Sending upload request"
        );

        let response = self
            .client
            .post(endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        let text = response.text().await.map_err(classify_reqwest_error)?;

        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let json = serde_json::from_str::<serde_json::Value>(&text).ok();
        info!(file = %pending.name, status = status.as_u16(), "Upload accepted");

        Ok(ServerResponse {
            status: status.as_u16(),
            body: text,
            json,
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> UploadError {
    if err.is_timeout() {
        UploadError::Timeout
    } else {
        UploadError::Transport {
            message: err.to_string(),
        }
    }
}
