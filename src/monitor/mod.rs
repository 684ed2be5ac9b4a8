//! Directory monitor: detects files not yet uploaded and hands them to the
//! uploader.
//!
//! Detection is an initial full scan plus rescans triggered by filesystem
//! notifications. Retry is implicit: a failed upload is not recorded, so the
//! file is offered again on the next rescan. There is no backoff and no cap.
//!
//! A folder that can no longer be listed or watched ends the monitor: it
//! reports `FolderError` then `MonitoringStopped` and must be started again.

pub mod debounce;
pub mod scanner;

pub use debounce::{classify, Notification, RescanScheduler};
pub use scanner::scan_directory;

use crate::error::AppError;
use crate::events::{EventBus, MonitorEventPayload};
use crate::upload::{FileUploader, PendingUpload};
use crate::upload_record::UploadRecordStore;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

// Only used by notify's polling fallback backend
pub const FILE_WATCH_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Everything a running monitor needs; replaced wholesale on reconfigure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub directory: PathBuf,
    pub endpoint: Url,
    /// Delay between a scan and submitting its candidates
    pub scan_settle: Duration,
    /// Delay between the last notification and the rescan it triggers
    pub change_settle: Duration,
}

/// Shared by the watch loop and every upload task it spawns
struct Pipeline {
    settings: MonitorSettings,
    records: Arc<UploadRecordStore>,
    uploader: Arc<dyn FileUploader>,
    events: EventBus,
}

/// A running subscription on one directory. Dropping it stops watching.
pub struct DirectoryMonitor {
    settings: MonitorSettings,
    watcher: Option<RecommendedWatcher>,
    cancel: CancellationToken,
    // Cancelled by the watch loop when the folder fails under it
    failed: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DirectoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryMonitor")
            .field("settings", &self.settings)
            .field("watching", &self.is_watching())
            .finish()
    }
}

impl DirectoryMonitor {
    /// Subscribe to `settings.directory` and run the initial scan.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// `AppError::Folder` when the directory cannot be listed or watched,
    /// in which case nothing is left running.
    pub fn start(
        settings: MonitorSettings,
        records: Arc<UploadRecordStore>,
        uploader: Arc<dyn FileUploader>,
        events: EventBus,
    ) -> Result<Self, AppError> {
        let directory = settings.directory.clone();

        std::fs::read_dir(&directory).map_err(|e| {
            AppError::Folder(format!(
                "Error reading folder {}: {}",
                directory.display(),
                e
            ))
        })?;

        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                // Receiver gone means the monitor stopped
                let _ = tx.send(result);
            },
            Config::default().with_poll_interval(FILE_WATCH_POLL_INTERVAL),
        )
        .map_err(|e| AppError::Folder(format!("Error watching folder: {}", e)))?;

        // Subscribe before the first scan so nothing created meanwhile is missed
        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|e| {
                AppError::Folder(format!(
                    "Error watching folder {}: {}",
                    directory.display(),
                    e
                ))
            })?;

        info!(
            path = %directory.display(),
            endpoint = %settings.endpoint,
            "Watching folder"
        );

        let cancel = CancellationToken::new();
        let failed = CancellationToken::new();
        let pipeline = Arc::new(Pipeline {
            settings: settings.clone(),
            records,
            uploader,
            events,
        });

        let task = tokio::spawn(watch_loop(pipeline, rx, cancel.clone(), failed.clone()));

        Ok(Self {
            settings,
            watcher: Some(watcher),
            cancel,
            failed,
            task: Some(task),
        })
    }

    /// Cancel the subscription and any pending rescan. Idempotent.
    ///
    /// Uploads already submitted keep running to completion or timeout.
    pub fn stop(&mut self) {
        if self.watcher.is_none() {
            return;
        }

        self.cancel.cancel();
        self.watcher = None;
        // The loop exits on its own once it sees the cancellation
        self.task.take();

        info!(path = %self.settings.directory.display(), "Stopped watching folder");
    }

    /// True until `stop()` is called or the folder fails.
    pub fn is_watching(&self) -> bool {
        self.watcher.is_some() && !self.has_failed()
    }

    /// The folder became unreadable or unwatchable and the watch loop ended.
    pub fn has_failed(&self) -> bool {
        self.failed.is_cancelled()
    }

    /// Resolves once the folder fails. Never resolves after a plain `stop()`.
    pub async fn failed(&self) {
        self.failed.cancelled().await
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }
}

impl Drop for DirectoryMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn watch_loop(
    pipeline: Arc<Pipeline>,
    mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    cancel: CancellationToken,
    failed: CancellationToken,
) {
    let mut scheduler = RescanScheduler::new(pipeline.settings.change_settle);
    let directory = pipeline.settings.directory.display().to_string();

    if let Err(e) = pipeline.scan_and_submit(&cancel).await {
        pipeline.fail(
            format!("Error reading folder {}: {}", directory, e),
            &cancel,
            &failed,
        );
        return;
    }

    loop {
        // A disabled branch still evaluates its future, so never unwrap here
        let deadline = scheduler
            .deadline()
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Some(Ok(event)) if folder_removed(&event, &pipeline.settings.directory) => {
                    // The watch dies with the folder even if it is recreated
                    pipeline.fail(
                        format!("Error watching folder {}: folder was removed", directory),
                        &cancel,
                        &failed,
                    );
                    break;
                }
                Some(Ok(event)) => {
                    let notification = classify(&event.kind);
                    if notification != Notification::Ignore {
                        debug!(kind = ?event.kind, paths = ?event.paths, "Folder change");
                    }
                    scheduler.on_notification(notification, Instant::now());
                }
                Some(Err(e)) => {
                    // The subscription cannot be trusted after a watcher error
                    pipeline.fail(
                        format!("Error watching folder {}: {}", directory, e),
                        &cancel,
                        &failed,
                    );
                    break;
                }
                None => break,
            },
            _ = sleep_until(deadline), if scheduler.is_pending() => {
                if scheduler.take_due(Instant::now()) {
                    if let Err(e) = pipeline.scan_and_submit(&cancel).await {
                        pipeline.fail(
                            format!("Error reading folder {}: {}", directory, e),
                            &cancel,
                            &failed,
                        );
                        break;
                    }
                }
            }
        }
    }

    debug!(path = %directory, "Watch loop finished");
}

fn folder_removed(event: &Event, directory: &Path) -> bool {
    matches!(event.kind, EventKind::Remove(_)) && event.paths.iter().any(|p| p == directory)
}

impl Pipeline {
    /// One scan pass: diff the folder against the record, wait for the
    /// settle delay, then submit every remaining candidate.
    ///
    /// Only a failure to list the folder itself is an error.
    async fn scan_and_submit(self: &Arc<Self>, cancel: &CancellationToken) -> io::Result<()> {
        let candidates =
            scan_directory(&self.settings.directory, |name| self.records.is_known(name)).await?;

        if candidates.is_empty() {
            return Ok(());
        }

        tokio::select! {
            _ = sleep(self.settings.scan_settle) => {}
            _ = cancel.cancelled() => return Ok(()),
        }

        // Claim names now; an upload that finished during the settle delay
        // or a pass that overlapped this one already owns some of them
        let claimed: Vec<PendingUpload> = candidates
            .into_iter()
            .filter(|pending| self.records.claim(&pending.name))
            .collect();

        if claimed.is_empty() {
            return Ok(());
        }

        info!(count = claimed.len(), "New files detected");
        self.events.emit(MonitorEventPayload::NewFilesDetected {
            count: claimed.len(),
        });

        let mut uploads = JoinSet::new();
        for pending in claimed {
            let pipeline = Arc::clone(self);
            uploads.spawn(async move { pipeline.upload_one(pending).await });
        }

        // Detached from the watch loop: stop() never aborts these
        tokio::spawn(async move {
            while let Some(joined) = uploads.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Upload task failed to complete");
                }
            }
        });

        Ok(())
    }

    /// Report a folder failure and mark the monitor as ended.
    fn fail(&self, reason: String, cancel: &CancellationToken, failed: &CancellationToken) {
        // A folder vanishing after stop() is nobody's concern
        if cancel.is_cancelled() {
            return;
        }

        warn!(reason = %reason, "Folder failed, monitoring stopped");
        // Flag first so anyone reacting to the events already sees it
        failed.cancel();
        self.events
            .emit(MonitorEventPayload::FolderError { reason });
        self.events.emit(MonitorEventPayload::MonitoringStopped);
    }

    async fn upload_one(&self, pending: PendingUpload) {
        let name = pending.name.clone();

        info!(file = %name, size = pending.detected_size, "Uploading");
        self.events
            .emit(MonitorEventPayload::UploadStarted { name: name.clone() });

        match self.uploader.upload(&pending, &self.settings.endpoint).await {
            Ok(response) => {
                // Record before releasing the claim so no scan sees a gap
                if let Err(e) = self.records.add(&name) {
                    error!(file = %name, error = %e, "Failed to persist upload record");
                }
                self.records.release(&name);

                if let Some(json) = &response.json {
                    debug!(file = %name, response = %json, "Upload response");
                }
                info!(file = %name, "Upload succeeded");
                self.events.emit(MonitorEventPayload::UploadSucceeded {
                    name,
                    response_body: response.body,
                });
            }
            Err(e) => {
                self.records.release(&name);
                warn!(file = %name, error = %e, "Upload failed, will retry on next scan");
                self.events.emit(MonitorEventPayload::UploadFailed {
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::{ServerResponse, UploadError};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};
    use tokio::time::timeout;

    #[derive(Default)]
    struct RecordingUploader {
        calls: Mutex<Vec<String>>,
        failing: Mutex<HashSet<String>>,
        delay: Duration,
    }

    impl RecordingUploader {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        fn fail(&self, name: &str) {
            self.failing.lock().unwrap().insert(name.to_string());
        }

        fn succeed(&self, name: &str) {
            self.failing.lock().unwrap().remove(name);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, name: &str) -> usize {
            self.calls().iter().filter(|n| n.as_str() == name).count()
        }
    }

    #[async_trait]
    impl FileUploader for RecordingUploader {
        async fn upload(
            &self,
            pending: &PendingUpload,
            _endpoint: &Url,
        ) -> Result<ServerResponse, UploadError> {
            self.calls.lock().unwrap().push(pending.name.clone());
            sleep(self.delay).await;

            if self.failing.lock().unwrap().contains(&pending.name) {
                return Err(UploadError::Rejected {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(ServerResponse {
                status: 200,
                body: "{\"ok\":true}".to_string(),
                json: Some(serde_json::json!({"ok": true})),
            })
        }
    }

    struct Fixture {
        folder: TempDir,
        state_dir: TempDir,
        records: Arc<UploadRecordStore>,
        uploader: Arc<RecordingUploader>,
        events: EventBus,
    }

    impl Fixture {
        fn new(uploader: RecordingUploader) -> Self {
            let folder = tempdir().unwrap();
            let state = tempdir().unwrap();
            let records = Arc::new(UploadRecordStore::open(
                state.path().join("uploaded-files.json"),
            ));
            Self {
                folder,
                state_dir: state,
                records,
                uploader: Arc::new(uploader),
                events: EventBus::new(64),
            }
        }

        fn settings(&self) -> MonitorSettings {
            MonitorSettings {
                directory: self.folder.path().to_path_buf(),
                endpoint: Url::parse("http://127.0.0.1:9/upload").unwrap(),
                scan_settle: Duration::from_millis(20),
                change_settle: Duration::from_millis(100),
            }
        }

        fn start(&self) -> DirectoryMonitor {
            DirectoryMonitor::start(
                self.settings(),
                Arc::clone(&self.records),
                self.uploader.clone(),
                self.events.clone(),
            )
            .unwrap()
        }

        fn write(&self, name: &str) {
            fs::write(self.folder.path().join(name), b"image bytes").unwrap();
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !condition() {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("condition not reached within 5s");
    }

    #[tokio::test]
    async fn test_initial_scan_uploads_only_unrecorded_files() {
        let fixture = Fixture::new(RecordingUploader::default());
        fixture.records.add("a.png").unwrap();
        fixture.write("a.png");
        fixture.write("b.jpg");

        let _monitor = fixture.start();

        let records = Arc::clone(&fixture.records);
        wait_until(|| records.contains("b.jpg")).await;
        assert_eq!(fixture.uploader.calls(), vec!["b.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_uploaded_file_is_never_resubmitted() {
        let fixture = Fixture::new(RecordingUploader::default());
        fixture.write("shot1.png");

        let _monitor = fixture.start();
        let records = Arc::clone(&fixture.records);
        wait_until(|| records.contains("shot1.png")).await;

        // New files trigger rescans that must skip shot1.png
        fixture.write("shot2.png");
        wait_until(|| records.contains("shot2.png")).await;
        fixture.write("shot3.png");
        wait_until(|| records.contains("shot3.png")).await;

        assert_eq!(fixture.uploader.count("shot1.png"), 1);
        assert_eq!(fixture.uploader.count("shot2.png"), 1);
    }

    #[tokio::test]
    async fn test_failed_upload_is_retried_on_next_trigger() {
        let fixture = Fixture::new(RecordingUploader::default());
        fixture.uploader.fail("b.jpg");
        fixture.write("b.jpg");

        let mut rx = fixture.events.subscribe();
        let _monitor = fixture.start();

        let uploader = Arc::clone(&fixture.uploader);
        wait_until(|| uploader.count("b.jpg") == 1).await;

        loop {
            let event = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
            if let MonitorEventPayload::UploadFailed { name, reason } = event.payload {
                assert_eq!(name, "b.jpg");
                assert!(reason.contains("500"));
                break;
            }
        }
        assert!(!fixture.records.contains("b.jpg"));

        fixture.uploader.succeed("b.jpg");
        fixture.write("c.png");

        let records = Arc::clone(&fixture.records);
        wait_until(|| records.contains("b.jpg") && records.contains("c.png")).await;
        assert_eq!(fixture.uploader.count("b.jpg"), 2);
    }

    #[tokio::test]
    async fn test_in_flight_upload_is_not_resubmitted() {
        let fixture = Fixture::new(RecordingUploader::with_delay(Duration::from_millis(800)));
        fixture.write("slow.png");

        let _monitor = fixture.start();
        let uploader = Arc::clone(&fixture.uploader);
        wait_until(|| uploader.count("slow.png") == 1).await;

        // Rescan while slow.png is still uploading
        fixture.write("other.png");
        wait_until(|| uploader.count("other.png") == 1).await;

        let records = Arc::clone(&fixture.records);
        wait_until(|| records.contains("slow.png") && records.contains("other.png")).await;
        assert_eq!(fixture.uploader.count("slow.png"), 1);
    }

    #[tokio::test]
    async fn test_events_follow_pipeline_order() {
        let fixture = Fixture::new(RecordingUploader::default());
        fixture.write("b.jpg");
        let mut rx = fixture.events.subscribe();

        let _monitor = fixture.start();

        let mut seen = Vec::new();
        while seen.len() < 3 {
            let event = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
            seen.push(event.payload);
        }

        assert_eq!(seen[0], MonitorEventPayload::NewFilesDetected { count: 1 });
        assert_eq!(
            seen[1],
            MonitorEventPayload::UploadStarted {
                name: "b.jpg".to_string()
            }
        );
        assert!(matches!(
            &seen[2],
            MonitorEventPayload::UploadSucceeded { name, response_body }
                if name == "b.jpg" && response_body == "{\"ok\":true}"
        ));
    }

    #[tokio::test]
    async fn test_start_on_missing_directory_fails() {
        let fixture = Fixture::new(RecordingUploader::default());
        let mut settings = fixture.settings();
        settings.directory = fixture.folder.path().join("missing");

        let result = DirectoryMonitor::start(
            settings,
            Arc::clone(&fixture.records),
            fixture.uploader.clone(),
            fixture.events.clone(),
        );
        assert!(matches!(result, Err(AppError::Folder(_))));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_ends_watching() {
        let fixture = Fixture::new(RecordingUploader::default());
        let mut monitor = fixture.start();
        assert!(monitor.is_watching());

        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_watching());

        fixture.write("after-stop.png");
        sleep(Duration::from_millis(400)).await;
        assert!(fixture.uploader.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stop_does_not_cancel_in_flight_upload() {
        let fixture = Fixture::new(RecordingUploader::with_delay(Duration::from_millis(300)));
        fixture.write("b.jpg");

        let mut monitor = fixture.start();
        let uploader = Arc::clone(&fixture.uploader);
        wait_until(|| uploader.count("b.jpg") == 1).await;

        monitor.stop();

        let records = Arc::clone(&fixture.records);
        wait_until(|| records.contains("b.jpg")).await;
    }

    #[tokio::test]
    async fn test_removed_folder_ends_monitoring() {
        let fixture = Fixture::new(RecordingUploader::default());
        let mut rx = fixture.events.subscribe();
        let monitor = fixture.start();

        fs::remove_dir(fixture.folder.path()).unwrap();

        timeout(Duration::from_secs(5), monitor.failed())
            .await
            .expect("monitor did not report the folder failure");
        assert!(monitor.has_failed());
        assert!(!monitor.is_watching());

        let error = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        match error.payload {
            MonitorEventPayload::FolderError { reason } => {
                assert!(reason.contains(&*fixture.folder.path().to_string_lossy()));
            }
            other => panic!("expected FolderError, got {:?}", other),
        }
        let stopped = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(stopped.payload, MonitorEventPayload::MonitoringStopped);
    }

    #[tokio::test]
    async fn test_plain_stop_is_not_a_failure() {
        let fixture = Fixture::new(RecordingUploader::default());
        let mut monitor = fixture.start();
        monitor.stop();

        // A folder vanishing after stop must not be reported
        fs::remove_dir(fixture.folder.path()).unwrap();
        sleep(Duration::from_millis(300)).await;
        assert!(!monitor.has_failed());
    }

    #[tokio::test]
    async fn test_record_write_failure_still_reports_success_once() {
        let mut fixture = Fixture::new(RecordingUploader::default());
        let blocker = fixture.state_dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let record_path = blocker.join("uploaded-files.json");
        fixture.records = Arc::new(UploadRecordStore::open(&record_path));

        fixture.write("a.png");
        let mut rx = fixture.events.subscribe();
        let _monitor = fixture.start();

        loop {
            let event = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
            match event.payload {
                MonitorEventPayload::UploadSucceeded { name, .. } => {
                    assert_eq!(name, "a.png");
                    break;
                }
                MonitorEventPayload::UploadFailed { .. } => panic!("upload reported as failed"),
                _ => {}
            }
        }

        // Another rescan must not offer a.png again
        fixture.write("b.png");
        let uploader = Arc::clone(&fixture.uploader);
        wait_until(|| uploader.count("b.png") == 1).await;
        sleep(Duration::from_millis(200)).await;

        assert_eq!(fixture.uploader.count("a.png"), 1);
        assert!(fixture.records.contains("a.png"));
        assert!(!record_path.exists());
    }
}
