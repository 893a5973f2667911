// Change feed for read-side refreshes

//! # Event System
//!
//! After every committed write the engine publishes a [`ChangeEvent`] naming
//! the table that changed. Subscribers (caches, the SSE endpoint, UI clients)
//! only learn that *something* changed and re-fetch; they do not depend on
//! delivery order or payload content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Departments,
    ProcessTypes,
    Users,
    Processes,
    History,
    Responsibilities,
    Notifications,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub record_id: String,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(table: Table, kind: ChangeKind, record_id: impl ToString) -> Self {
        ChangeEvent {
            table,
            kind,
            record_id: record_id.to_string(),
            at: Utc::now(),
        }
    }
}

/// Broadcast bus for change events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers; having none is not an error
    pub fn publish(&self, event: ChangeEvent) {
        debug!(table = ?event.table, kind = ?event.kind, record = %event.record_id, "change published");
        let _ = self.sender.send(event);
    }

    pub fn emit(&self, table: Table, kind: ChangeKind, record_id: impl ToString) {
        self.publish(ChangeEvent::new(table, kind, record_id));
    }

    /// Dropping the receiver unsubscribes
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(Table::Processes, ChangeKind::Updated, "p-1");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.table, Table::Processes);
        assert_eq!(event.kind, ChangeKind::Updated);
        assert_eq!(event.record_id, "p-1");
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.emit(Table::Departments, ChangeKind::Inserted, "1");
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_dropped_receiver_unsubscribes() {
        let bus = EventBus::new(4);
        let rx = bus.subscribe();
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);

        let mut rx = bus.subscribe();
        bus.emit(Table::Users, ChangeKind::Deleted, "ana");
        let event = tokio_test::block_on(rx.recv()).unwrap();
        assert_eq!(event.table, Table::Users);
    }
}
