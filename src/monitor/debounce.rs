//! Trailing-edge debounce for change-triggered rescans.
//!
//! Create/rename/remove notifications arm (or re-arm) a single pending rescan
//! `settle` after the latest one. Content writes only push an already armed
//! rescan further out, so a file that is still being written keeps the
//! rescan deferred until the writer goes quiet.

use notify::event::ModifyKind;
use notify::EventKind;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// Directory membership may have changed
    Trigger,
    /// A file's content or metadata changed
    Extend,
    Ignore,
}

pub fn classify(kind: &EventKind) -> Notification {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Any => Notification::Trigger,
        EventKind::Modify(ModifyKind::Name(_)) => Notification::Trigger,
        EventKind::Modify(_) => Notification::Extend,
        EventKind::Access(_) | EventKind::Other => Notification::Ignore,
    }
}

#[derive(Debug)]
pub struct RescanScheduler {
    settle: Duration,
    deadline: Option<Instant>,
}

impl RescanScheduler {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            deadline: None,
        }
    }

    pub fn on_notification(&mut self, notification: Notification, now: Instant) {
        match notification {
            Notification::Trigger => self.deadline = Some(now + self.settle),
            Notification::Extend if self.deadline.is_some() => {
                self.deadline = Some(now + self.settle)
            }
            Notification::Extend | Notification::Ignore => {}
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarm and report whether the pending rescan is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
