//! Owns the monitor lifecycle and the configuration it runs with.
//!
//! Every reconfiguration follows the same sequence: validate, stop, mutate,
//! persist, restart. The running monitor therefore never sees a partially
//! updated configuration.

use crate::config::{ConfigStore, WatchConfig};
use crate::error::AppError;
use crate::events::{EventBus, EventReceiver, MonitorEventPayload};
use crate::monitor::{DirectoryMonitor, MonitorSettings};
use crate::upload::{FileUploader, HttpUploader};
use crate::upload_record::UploadRecordStore;
use crate::validation::{resolve_directory, validate_endpoint};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Stopped,
    Running,
}

/// Snapshot returned by every control operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub state: MonitorState,
    #[serde(rename = "folderPath")]
    pub folder_path: String,
    #[serde(rename = "uploadUrl")]
    pub upload_url: String,
}

struct ControllerState {
    config: WatchConfig,
    monitor: Option<DirectoryMonitor>,
}

pub struct Controller {
    config_store: ConfigStore,
    records: Arc<UploadRecordStore>,
    uploader: Arc<dyn FileUploader>,
    events: EventBus,
    state: Mutex<ControllerState>,
}

impl Controller {
    /// Build a controller from explicit collaborators. The config is loaded
    /// (and written back merged) immediately; monitoring is not started.
    pub fn new(
        config_store: ConfigStore,
        records: Arc<UploadRecordStore>,
        uploader: Arc<dyn FileUploader>,
        events: EventBus,
    ) -> Self {
        let config = config_store.load();
        Self {
            config_store,
            records,
            uploader,
            events,
            state: Mutex::new(ControllerState {
                config,
                monitor: None,
            }),
        }
    }

    /// Controller over `~/.shotwatch/` with the HTTP uploader.
    pub fn from_default_locations() -> Result<Self, AppError> {
        let config_store = ConfigStore::default_location()?;
        let records = Arc::new(UploadRecordStore::default_location()?);
        let uploader: Arc<dyn FileUploader> = Arc::new(HttpUploader::new()?);
        Ok(Self::new(config_store, records, uploader, EventBus::default()))
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn records(&self) -> &Arc<UploadRecordStore> {
        &self.records
    }

    /// Start monitoring with the current configuration. No-op when running.
    ///
    /// A folder that cannot be watched is reported as a `FolderError` event
    /// and leaves the controller stopped.
    pub async fn start(&self) -> MonitorStatus {
        let mut state = self.state.lock().await;
        self.start_locked(&mut state);
        Self::snapshot(&state)
    }

    /// Stop monitoring. No-op when already stopped.
    pub async fn stop(&self) -> MonitorStatus {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state);
        Self::snapshot(&state)
    }

    pub async fn status(&self) -> MonitorStatus {
        let mut state = self.state.lock().await;
        Self::clear_failed(&mut state);
        Self::snapshot(&state)
    }

    /// Point the monitor at a different folder.
    ///
    /// The path must name an existing, listable directory; otherwise nothing
    /// changes and `AppError::Folder` is returned.
    pub async fn change_folder(&self, path: &str) -> Result<MonitorStatus, AppError> {
        let resolved = resolve_directory(path)?;
        let folder_path = resolved.to_string_lossy().into_owned();

        self.reconfigure(|config| config.folder_path = folder_path)
            .await
    }

    /// Change the upload endpoint.
    ///
    /// Anything other than an absolute `http://` or `https://` URL is
    /// rejected with `AppError::Validation` and nothing changes.
    pub async fn set_server_url(&self, url: &str) -> Result<MonitorStatus, AppError> {
        validate_endpoint(url)?;
        // Keep what the user typed; `Url` would normalise it (trailing slash)
        let upload_url = url.trim().to_string();

        self.reconfigure(|config| config.remote_upload_url = upload_url)
            .await
    }

    async fn reconfigure<F>(&self, mutate: F) -> Result<MonitorStatus, AppError>
    where
        F: FnOnce(&mut WatchConfig),
    {
        let mut state = self.state.lock().await;

        self.stop_locked(&mut state);

        let previous = state.config.clone();
        mutate(&mut state.config);

        if let Err(e) = self.config_store.save(&state.config) {
            error!(error = %e, "Failed to persist configuration, keeping previous settings");
            state.config = previous;
            self.start_locked(&mut state);
            return Err(e);
        }

        info!(
            folder = %state.config.folder_path,
            url = %state.config.remote_upload_url,
            "Configuration updated"
        );

        self.start_locked(&mut state);
        Ok(Self::snapshot(&state))
    }

    fn start_locked(&self, state: &mut ControllerState) {
        Self::clear_failed(state);
        if state.monitor.is_some() {
            return;
        }

        let settings = match Self::settings_for(&state.config) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Cannot start monitoring");
                self.events.emit(MonitorEventPayload::FolderError {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let folder_path = settings.directory.to_string_lossy().into_owned();
        let upload_url = state.config.remote_upload_url.clone();

        match DirectoryMonitor::start(
            settings,
            Arc::clone(&self.records),
            Arc::clone(&self.uploader),
            self.events.clone(),
        ) {
            Ok(monitor) => {
                state.monitor = Some(monitor);
                self.events.emit(MonitorEventPayload::MonitoringStarted {
                    folder_path,
                    upload_url,
                });
            }
            Err(e) => {
                warn!(error = %e, "Cannot start monitoring");
                self.events.emit(MonitorEventPayload::FolderError {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn stop_locked(&self, state: &mut ControllerState) {
        // A failed monitor already announced MonitoringStopped
        Self::clear_failed(state);
        if let Some(mut monitor) = state.monitor.take() {
            monitor.stop();
            self.events.emit(MonitorEventPayload::MonitoringStopped);
        }
    }

    /// Drop a monitor whose folder failed, so the state reads `Stopped` and
    /// the next `start()` subscribes again.
    fn clear_failed(state: &mut ControllerState) {
        if state.monitor.as_ref().is_some_and(DirectoryMonitor::has_failed) {
            state.monitor = None;
        }
    }

    fn settings_for(config: &WatchConfig) -> Result<MonitorSettings, AppError> {
        Ok(MonitorSettings {
            directory: resolve_directory(&config.folder_path)?,
            endpoint: validate_endpoint(&config.remote_upload_url)?,
            scan_settle: config.scan_settle(),
            change_settle: config.change_settle(),
        })
    }

    fn snapshot(state: &ControllerState) -> MonitorStatus {
        MonitorStatus {
            state: if state.monitor.is_some() {
                MonitorState::Running
            } else {
                MonitorState::Stopped
            },
            folder_path: state.config.folder_path.clone(),
            upload_url: state.config.remote_upload_url.clone(),
        }
    }
}
