use crate::error::AppError;
use std::path::PathBuf;
use url::Url;

/// Validate an upload endpoint.
///
/// Accepts only absolute `http://` or `https://` URLs with a host. Anything
/// else is rejected before configuration is touched.
pub fn validate_endpoint(raw: &str) -> Result<Url, AppError> {
    let trimmed = raw.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AppError::Validation(format!(
            "Server URL must start with http:// or https://: {}",
            raw
        )));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| AppError::Validation(format!("Invalid server URL '{}': {}", raw, e)))?;

    if url.host_str().map_or(true, str::is_empty) {
        return Err(AppError::Validation(format!(
            "Server URL has no host: {}",
            raw
        )));
    }

    Ok(url)
}

/// Resolve a configured folder path to an existing, listable directory.
///
/// A leading `~` is expanded to the home directory.
pub fn resolve_directory(raw: &str) -> Result<PathBuf, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Folder("Folder path is empty".to_string()));
    }

    let expanded = shellexpand::tilde(trimmed);
    let path = PathBuf::from(expanded.as_ref());

    let metadata = std::fs::metadata(&path).map_err(|e| {
        AppError::Folder(format!("Error reading folder {}: {}", path.display(), e))
    })?;

    if !metadata.is_dir() {
        return Err(AppError::Folder(format!(
            "Not a directory: {}",
            path.display()
        )));
    }

    // Listing is what the scanner needs, so check that too
    std::fs::read_dir(&path).map_err(|e| {
        AppError::Folder(format!("Error reading folder {}: {}", path.display(), e))
    })?;

    Ok(path)
}
