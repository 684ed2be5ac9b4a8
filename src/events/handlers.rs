use super::{EventBus, MonitorEvent, MonitorEventPayload};
use crate::logging::{ActivityLog, LogEntry};
use chrono::Local;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const COMPONENT: &str = "events";

/// Handler that appends every event to the activity log
pub struct ActivityLogHandler {
    event_bus: EventBus,
    activity_log: ActivityLog,
    shutdown: CancellationToken,
}

impl ActivityLogHandler {
    pub fn new(event_bus: EventBus, activity_log: ActivityLog, shutdown: CancellationToken) -> Self {
        Self {
            event_bus,
            activity_log,
            shutdown,
        }
    }

    pub fn start(self) -> JoinHandle<()> {
        // Subscribe before spawning so no event published after start() is missed
        let mut rx = self.event_bus.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = rx.recv() => {
                        match result {
                            Ok(event) => {
                                if let Err(e) = self.activity_log.append(&activity_entry(&event)) {
                                    error!(error = %e, "Activity log write failed");
                                }
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                info!("Activity log handler stopped (event bus closed)");
                                break;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Activity log handler lagged");
                            }
                        }
                    }
                    _ = self.shutdown.cancelled() => {
                        // Drain what is already queued so the last lifecycle
                        // events still reach the log
                        while let Ok(event) = rx.try_recv() {
                            if let Err(e) = self.activity_log.append(&activity_entry(&event)) {
                                error!(error = %e, "Activity log write failed");
                            }
                        }
                        info!("Activity log handler stopped");
                        break;
                    }
                }
            }
        })
    }
}

/// Handler that prints events as timestamped console lines
pub struct ConsoleEventHandler {
    event_bus: EventBus,
    shutdown: CancellationToken,
}

impl ConsoleEventHandler {
    pub fn new(event_bus: EventBus, shutdown: CancellationToken) -> Self {
        Self {
            event_bus,
            shutdown,
        }
    }

    pub fn start(self) -> JoinHandle<()> {
        let mut rx = self.event_bus.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = rx.recv() => {
                        match result {
                            Ok(event) => println!("{}", console_line(&event)),
                            Err(broadcast::error::RecvError::Closed) => break,
                            Err(_) => continue,
                        }
                    }
                    _ = self.shutdown.cancelled() => {
                        while let Ok(event) = rx.try_recv() {
                            println!("{}", console_line(&event));
                        }
                        break;
                    }
                }
            }
        })
    }
}

fn activity_entry(event: &MonitorEvent) -> LogEntry {
    let level = if event.payload.is_error() { "ERROR" } else { "INFO" };
    let entry = LogEntry {
        timestamp: event.timestamp.to_rfc3339(),
        ..LogEntry::new(level, COMPONENT, event.payload.describe())
    };

    match serde_json::to_value(&event.payload) {
        Ok(details) => entry.with_details(details),
        Err(_) => entry,
    }
}

/// `[14:03:22] Upload Success: shot1.png (response: ...)`
pub fn console_line(event: &MonitorEvent) -> String {
    let local = event.timestamp.with_timezone(&Local);
    let mut line = format!("[{}] {}", local.format("%H:%M:%S"), event.payload.describe());

    if let MonitorEventPayload::MonitoringStarted {
        folder_path,
        upload_url,
    } = &event.payload
    {
        line.push_str(&format!("\nWatching folder: {}\nUpload URL: {}", folder_path, upload_url));
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;
    use tokio::time::{sleep, Duration};

    fn event(payload: MonitorEventPayload) -> MonitorEvent {
        MonitorEvent {
            sequence: 7,
            timestamp: Utc::now(),
            payload,
        }
    }

    #[test]
    fn test_activity_entry_levels() {
        let ok = activity_entry(&event(MonitorEventPayload::UploadStarted {
            name: "a.png".to_string(),
        }));
        assert_eq!(ok.level, "INFO");
        assert_eq!(ok.details.unwrap()["type"], "upload_started");

        let failed = activity_entry(&event(MonitorEventPayload::UploadFailed {
            name: "a.png".to_string(),
            reason: "Upload timed out".to_string(),
        }));
        assert_eq!(failed.level, "ERROR");
        assert!(failed.message.contains("a.png"));
    }

    #[test]
    fn test_console_line_format() {
        let line = console_line(&event(MonitorEventPayload::NewFilesDetected { count: 3 }));
        assert!(line.starts_with('['));
        assert!(line.ends_with("New Files Detected: 3 new file(s)"));
    }

    #[tokio::test]
    async fn test_activity_handler_writes_and_stops() {
        let temp_dir = tempdir().unwrap();
        let bus = EventBus::new(16);
        let shutdown = CancellationToken::new();
        let log = ActivityLog::new(temp_dir.path());

        let handle = ActivityLogHandler::new(bus.clone(), log.clone(), shutdown.clone()).start();

        bus.publish(MonitorEventPayload::UploadSucceeded {
            name: "b.jpg".to_string(),
            response_body: "{\"ok\":true}".to_string(),
        })
        .unwrap();

        let mut written = Vec::new();
        for _ in 0..50 {
            written = log.read(None).unwrap();
            if !written.is_empty() {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(written.len(), 1);
        assert!(written[0].message.contains("b.jpg"));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_activity_handler_flushes_queued_events_on_shutdown() {
        let temp_dir = tempdir().unwrap();
        let bus = EventBus::new(16);
        let shutdown = CancellationToken::new();
        let log = ActivityLog::new(temp_dir.path());

        // Cancelled before the task first runs: the queued event must still land
        let handle = ActivityLogHandler::new(bus.clone(), log.clone(), shutdown.clone()).start();
        bus.publish(MonitorEventPayload::MonitoringStopped).unwrap();
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        let written = log.read(None).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].details.as_ref().unwrap()["type"], "monitoring_stopped");
    }
}
