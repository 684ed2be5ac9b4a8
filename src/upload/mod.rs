//! Uploader: sends one file to the remote endpoint and classifies the result.
//!
//! There is no retry here. A failed file is simply not recorded, so the next
//! directory scan offers it again.

mod http;
pub mod payload;
mod types;

pub use http::HttpUploader;
pub use payload::{data_url, mime_type_for, UploadRequestBody};
pub use types::*;

use async_trait::async_trait;
use url::Url;

/// Seam between the directory monitor and the network.
#[async_trait]
pub trait FileUploader: Send + Sync {
    /// Send `pending` to `endpoint`. A single attempt bounded by the
    /// implementation's timeout.
    async fn upload(
        &self,
        pending: &PendingUpload,
        endpoint: &Url,
    ) -> Result<ServerResponse, UploadError>;
}
