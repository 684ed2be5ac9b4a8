//! One directory scan: list, stat, diff against what is already known.

use crate::upload::PendingUpload;
use chrono::Utc;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// List `dir` and return every regular file for which `is_known` is false,
/// in directory-listing order.
///
/// Entries that vanish or cannot be stat'ed between listing and stat are
/// skipped. Symlinks are followed, so a link to a regular file counts.
/// Only a failure to list the directory itself is an error.
pub async fn scan_directory<F>(dir: &Path, is_known: F) -> io::Result<Vec<PendingUpload>>
where
    F: Fn(&str) -> bool,
{
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut candidates = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            warn!(
                file = %file_name.to_string_lossy(),
                "Skipping file with a non UTF-8 name, it will never be uploaded"
            );
            continue;
        };

        let path = entry.path();
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(file = %name, error = %e, "Stat failed, skipping entry");
                continue;
            }
        };

        if !metadata.is_file() || is_known(name) {
            continue;
        }

        candidates.push(PendingUpload {
            name: name.to_string(),
            absolute_path: path,
            detected_size: metadata.len(),
            detected_at: Utc::now(),
        });
    }

    Ok(candidates)
}
