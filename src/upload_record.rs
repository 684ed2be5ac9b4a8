//! Durable set of file names that have already been uploaded.
//!
//! The file name is the only dedup key. Names are added after a confirmed
//! upload and never removed; the whole set is rewritten as a JSON array on
//! every addition.
//!
//! Names with an upload in progress are tracked alongside as in-memory
//! claims, so a rescan (or a restarted monitor) never submits them twice.

use crate::config::{ensure_private_dir, get_app_dir, write_private_file, UPLOAD_RECORD_FILE_NAME};
use crate::error::AppError;
use indexmap::IndexSet;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct UploadRecordStore {
    path: PathBuf,
    // Held across the file rewrite so concurrent adds cannot lose an update
    names: Mutex<IndexSet<String>>,
    claims: Mutex<HashSet<String>>,
}

impl UploadRecordStore {
    /// Open the store at `path`, loading whatever was persisted.
    ///
    /// A corrupt record file is logged and treated as empty; it is
    /// overwritten by the next successful upload.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let names = match Self::load(&path) {
            Ok(names) => names,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Upload record unreadable, starting empty");
                IndexSet::new()
            }
        };

        debug!(path = %path.display(), count = names.len(), "Loaded upload record");

        Self {
            path,
            names: Mutex::new(names),
            claims: Mutex::new(HashSet::new()),
        }
    }

    /// `~/.shotwatch/uploaded-files.json`
    pub fn default_location() -> Result<Self, AppError> {
        let app_dir = get_app_dir()?;
        ensure_private_dir(&app_dir)?;
        Ok(Self::open(app_dir.join(UPLOAD_RECORD_FILE_NAME)))
    }

    /// Read persisted names. Missing file means nothing uploaded yet.
    pub fn load(path: &Path) -> Result<IndexSet<String>, AppError> {
        if !path.exists() {
            return Ok(IndexSet::new());
        }

        let content = fs::read_to_string(path)?;
        serde_json::from_str::<IndexSet<String>>(&content).map_err(|e| {
            AppError::StorageCorrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `name` as uploaded and rewrite the persisted file.
    ///
    /// Returns `Ok(false)` when the name was already present (no write).
    /// The in-memory set keeps the name even if the write fails.
    pub fn add(&self, name: &str) -> Result<bool, AppError> {
        let mut names = self.lock();
        if !names.insert(name.to_string()) {
            return Ok(false);
        }

        let content = serde_json::to_string_pretty(&*names)?;
        write_private_file(&self.path, &content)?;
        Ok(true)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Recorded or currently claimed by an upload
    pub fn is_known(&self, name: &str) -> bool {
        self.contains(name) || lock_recovering(&self.claims).contains(name)
    }

    /// Claim `name` for an upload. Fails when it is already recorded or
    /// another upload holds the claim.
    pub fn claim(&self, name: &str) -> bool {
        let names = self.lock();
        if names.contains(name) {
            return false;
        }
        lock_recovering(&self.claims).insert(name.to_string())
    }

    /// Drop the claim on `name`; call after `add` when the upload succeeded.
    pub fn release(&self, name: &str) {
        lock_recovering(&self.claims).remove(name);
    }

    /// Snapshot of recorded names in insertion order
    pub fn names(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, IndexSet<String>> {
        lock_recovering(&self.names)
    }
}

// Both sets stay valid after a panic mid-update, so a poisoned guard is usable
fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
