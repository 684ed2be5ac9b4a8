use super::types::{EventSequence, MonitorEvent, MonitorEventPayload};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

pub type EventReceiver = broadcast::Receiver<MonitorEvent>;
pub type EventSender = broadcast::Sender<MonitorEvent>;

/// Event bus for distributing monitor events.
///
/// Publishing never waits on subscribers: a slow subscriber lags and skips
/// ahead instead of stalling scans or uploads.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: EventSender,
    sequence: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Publish an event (returns sequence number)
    ///
    /// Fails only when nobody is subscribed.
    pub fn publish(&self, payload: MonitorEventPayload) -> Result<EventSequence, String> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        let event = MonitorEvent {
            sequence,
            timestamp: Utc::now(),
            payload,
        };

        self.sender
            .send(event)
            .map(|_| sequence)
            .map_err(|e| format!("Failed to publish event: {}", e))
    }

    /// Publish, ignoring the no-subscriber case
    pub fn emit(&self, payload: MonitorEventPayload) {
        if let Err(e) = self.publish(payload) {
            trace!("{}", e);
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Get current sequence number
    pub fn current_sequence(&self) -> EventSequence {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Get number of active receivers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
