use crate::error::{AppError, ErrorContext};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const UPLOAD_RECORD_FILE_NAME: &str = "uploaded-files.json";

pub const DEFAULT_UPLOAD_URL: &str = "https://flowflowxyz.niva.monster/upload";

// Settle delays: short after a scan, longer after a filesystem notification
// so the writer has time to flush.
pub const DEFAULT_SCAN_SETTLE_MS: u64 = 100;
pub const DEFAULT_CHANGE_SETTLE_MS: u64 = 500;

/// Run-time settings for the watch/upload pipeline.
///
/// Persisted as camelCase JSON. Fields missing from the file fall back to
/// their defaults and unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    #[serde(rename = "folderPath")]
    pub folder_path: String,
    #[serde(rename = "remoteUploadUrl")]
    pub remote_upload_url: String,
    #[serde(rename = "scanSettleMs")]
    pub scan_settle_ms: u64,
    #[serde(rename = "changeSettleMs")]
    pub change_settle_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            folder_path: default_folder_path(),
            remote_upload_url: DEFAULT_UPLOAD_URL.to_string(),
            scan_settle_ms: DEFAULT_SCAN_SETTLE_MS,
            change_settle_ms: DEFAULT_CHANGE_SETTLE_MS,
        }
    }
}

impl WatchConfig {
    pub fn scan_settle(&self) -> Duration {
        Duration::from_millis(self.scan_settle_ms)
    }

    pub fn change_settle(&self) -> Duration {
        Duration::from_millis(self.change_settle_ms)
    }
}

#[cfg(target_os = "windows")]
fn default_folder_path() -> String {
    dirs::data_dir()
        .map(|roaming| {
            roaming
                .join(".minecraft")
                .join("screenshots")
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_else(|| "~/.minecraft/screenshots".to_string())
}

#[cfg(not(target_os = "windows"))]
fn default_folder_path() -> String {
    "~/.minecraft/screenshots".to_string()
}

pub fn get_app_dir() -> Result<PathBuf, AppError> {
    dirs::home_dir()
        .map(|home| home.join(".shotwatch"))
        .ok_or_else(|| AppError::Other("Could not find home directory".to_string()))
}

pub fn get_logs_dir() -> Result<PathBuf, AppError> {
    Ok(get_app_dir()?.join("logs"))
}

/// Create a directory (and parents) readable only by the owner.
pub fn ensure_private_dir(dir: &Path) -> Result<(), AppError> {
    if !dir.exists() {
        fs::create_dir_all(dir).context("Failed to create directory")?;

        // Set permissions to 700 (read/write/execute for owner only) on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(dir)?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(0o700);
            fs::set_permissions(dir, permissions)?;
        }
    }
    Ok(())
}

/// Overwrite `path` with `content`, creating the parent directory if needed.
/// Every failure is reported as `StorageWrite` for that path.
pub fn write_private_file(path: &Path, content: &str) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| AppError::storage_write(parent, e))?;
        }
    }

    fs::write(path, content).map_err(|e| AppError::storage_write(path, e))?;

    // Set permissions to 600 (read/write for owner only) on Unix systems
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(path).map_err(|e| AppError::storage_write(path, e))?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(path, permissions).map_err(|e| AppError::storage_write(path, e))?;
    }

    Ok(())
}

/// Reads and writes the persisted `WatchConfig`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.shotwatch/config.json`
    pub fn default_location() -> Result<Self, AppError> {
        let app_dir = get_app_dir()?;
        ensure_private_dir(&app_dir)?;
        Ok(Self::new(app_dir.join(CONFIG_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted config merged over defaults.
    ///
    /// Returns `Ok(None)` when nothing has been persisted yet and
    /// `StorageCorrupt` when the file exists but cannot be parsed.
    pub fn try_load(&self) -> Result<Option<WatchConfig>, AppError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        serde_json::from_str::<WatchConfig>(&content)
            .map(Some)
            .map_err(|e| AppError::StorageCorrupt {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    /// Load the config, falling back to defaults on a missing or corrupt
    /// file, then write the merged result back so the file is complete.
    pub fn load(&self) -> WatchConfig {
        let config = match self.try_load() {
            Ok(Some(config)) => config,
            Ok(None) => {
                info!(path = %self.path.display(), "No config file found, using defaults");
                WatchConfig::default()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Falling back to default config");
                WatchConfig::default()
            }
        };

        if let Err(e) = self.save(&config) {
            warn!(error = %e, "Failed to write back merged config");
        }

        config
    }

    pub fn save(&self, config: &WatchConfig) -> Result<(), AppError> {
        let content = serde_json::to_string_pretty(config)?;
        write_private_file(&self.path, &content)
    }
}
