use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::events::{EventBus, ViewEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub kind: NotificationKind,
    pub text: String,
}

/// Transient banners. Each one is removed by its own timer task once the
/// lifetime elapses; nothing is deduplicated or queued.
#[derive(Clone)]
pub struct NotificationSurface {
    active: Arc<Mutex<Vec<Notification>>>,
    next_id: Arc<AtomicU64>,
    ttl: Duration,
    events: EventBus,
}

impl NotificationSurface {
    pub fn new(ttl: Duration, events: EventBus) -> Self {
        Self {
            active: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            ttl,
            events,
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn show(&self, kind: NotificationKind, text: impl Into<String>) -> u64 {
        let notification = Notification {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            text: text.into(),
        };
        let id = notification.id;
        match kind {
            NotificationKind::Error => tracing::warn!(id, "notification: {}", notification.text),
            _ => tracing::info!(id, "notification: {}", notification.text),
        }
        self.lock().push(notification.clone());
        self.events.emit(ViewEvent::Notified(notification));

        let surface = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(surface.ttl).await;
            surface.dismiss(id);
        });
        id
    }

    pub fn info(&self, text: impl Into<String>) -> u64 {
        self.show(NotificationKind::Info, text)
    }

    pub fn success(&self, text: impl Into<String>) -> u64 {
        self.show(NotificationKind::Success, text)
    }

    pub fn error(&self, text: impl Into<String>) -> u64 {
        self.show(NotificationKind::Error, text)
    }

    fn dismiss(&self, id: u64) {
        let removed = {
            let mut active = self.lock();
            let before = active.len();
            active.retain(|n| n.id != id);
            active.len() != before
        };
        if removed {
            self.events.emit(ViewEvent::NotificationExpired { id });
        }
    }

    pub fn active(&self) -> Vec<Notification> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Notification>> {
        // A poisoned list is still a valid list of banners.
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
