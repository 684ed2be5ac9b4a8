//! Request body construction.
//!
//! The endpoint expects `{"imageData": "data:<mime>;base64,<payload>", "autoadd": 1}`.

use base64::Engine;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct UploadRequestBody {
    #[serde(rename = "imageData")]
    pub image_data: String,
    pub autoadd: u8,
}

impl UploadRequestBody {
    pub fn new(name: &str, contents: &[u8]) -> Self {
        Self {
            image_data: data_url(mime_type_for(name), contents),
            autoadd: 1,
        }
    }
}

/// MIME type from the file extension only; content is never sniffed.
pub fn mime_type_for(name: impl AsRef<Path>) -> &'static str {
    let ext = name
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

pub fn data_url(mime: &str, contents: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(contents)
    )
}
