use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::modal::Modal;
use crate::notify::Notification;
use crate::render::MessageEntry;

const EVENT_CAPACITY: usize = 100;

/// A change to one of the session surfaces. Front ends subscribe to these
/// instead of polling the session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", content = "payload")]
pub enum ViewEvent {
    EntryAppended(MessageEntry),
    Cleared,
    Typing { visible: bool },
    Notified(Notification),
    NotificationExpired { id: u64 },
    ModalChanged { modal: Modal, open: bool },
    /// Sent once to a view as it connects; never broadcast.
    Synced(Snapshot),
}

/// The surfaces as they stand when a view attaches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entries: Vec<MessageEntry>,
    pub typing: bool,
    pub notifications: Vec<Notification>,
}

/// Fan-out of view events. Sending with no subscribers is not an error.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ViewEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ViewEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("view event dropped: no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape_matches_broadcast_format() {
        let json = serde_json::to_value(ViewEvent::Typing { visible: true }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"message_type": "Typing", "payload": {"visible": true}})
        );
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let json = serde_json::to_value(ViewEvent::Synced(Snapshot {
            entries: Vec::new(),
            typing: false,
            notifications: Vec::new(),
        }))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "message_type": "Synced",
                "payload": {"entries": [], "typing": false, "notifications": []}
            })
        );
    }

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(ViewEvent::Cleared);
        assert_eq!(rx.recv().await.unwrap(), ViewEvent::Cleared);
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        EventBus::new().emit(ViewEvent::Cleared);
    }
}
