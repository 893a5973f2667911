// Outbound notifications to responsible users

use std::sync::Arc;

use crate::models::{Notification, ProcessId, UserId};
use crate::Result;

use super::events::{ChangeKind, EventBus, Table};
use super::storage::ProcessStorage;

/// Where "a process arrived in your department" messages go.
///
/// Dispatch is fire-and-forget from the engine's point of view: the engine
/// logs a failed dispatch but never fails the transition because of it.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, recipients: &[UserId], process_id: ProcessId, message: &str) -> Result<()>;
}

/// Persists one notification row per recipient
pub struct StorageNotificationSink {
    storage: Arc<dyn ProcessStorage>,
    events: EventBus,
}

impl StorageNotificationSink {
    pub fn new(storage: Arc<dyn ProcessStorage>, events: EventBus) -> Self {
        Self { storage, events }
    }
}

#[async_trait::async_trait]
impl NotificationSink for StorageNotificationSink {
    async fn notify(&self, recipients: &[UserId], process_id: ProcessId, message: &str) -> Result<()> {
        if recipients.is_empty() {
            return Ok(());
        }

        let batch: Vec<Notification> = recipients
            .iter()
            .map(|user| Notification::new(user.clone(), process_id, message))
            .collect();

        self.storage.create_notifications(batch).await?;
        self.events
            .emit(Table::Notifications, ChangeKind::Inserted, process_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::storage::InMemoryStorage;

    #[tokio::test]
    async fn test_one_row_per_recipient() {
        let storage: Arc<dyn ProcessStorage> = Arc::new(InMemoryStorage::new());
        let sink = StorageNotificationSink::new(storage.clone(), EventBus::default());
        let process = ProcessId::new();

        sink.notify(
            &[UserId::from("ana"), UserId::from("bia")],
            process,
            "Processo 100 chegou em Registro",
        )
        .await
        .unwrap();

        let ana = storage.list_notifications(&UserId::from("ana")).await.unwrap();
        assert_eq!(ana.len(), 1);
        assert_eq!(ana[0].process_id, process);
        assert!(!ana[0].responded);
        assert_eq!(storage.list_notifications(&UserId::from("bia")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_recipients_is_noop() {
        let storage: Arc<dyn ProcessStorage> = Arc::new(InMemoryStorage::new());
        let sink = StorageNotificationSink::new(storage, EventBus::default());
        assert!(sink.notify(&[], ProcessId::new(), "x").await.is_ok());
    }
}
