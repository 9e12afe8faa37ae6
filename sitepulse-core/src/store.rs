//! Persistence collaborator seam.
//!
//! The pipeline does not own a storage engine. Each enriched record is
//! handed to an [`EventStore`] exposing one insert capability per event
//! kind; only UTM attributions hand an identifier back for client-side
//! correlation.

use crate::entities::{EventKind, EventRecord};
use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Errors surfaced by the persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_performance(&self, record: EventRecord) -> Result<(), StoreError>;
    async fn insert_pageview(&self, record: EventRecord) -> Result<(), StoreError>;
    /// Returns the generated identifier so the caller can echo it.
    async fn insert_utm(&self, record: EventRecord) -> Result<Uuid, StoreError>;
    async fn insert_campaign(&self, record: EventRecord) -> Result<(), StoreError>;
}

/// Process-memory store: the default backend of the server binary and
/// the double used by handler tests.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    records: Mutex<Vec<EventRecord>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything inserted so far, in insertion order.
    pub async fn records(&self) -> Vec<EventRecord> {
        self.records.lock().await.clone()
    }

    pub async fn count_by_kind(&self, kind: EventKind) -> usize {
        self.records
            .lock()
            .await
            .iter()
            .filter(|record| record.kind == kind)
            .count()
    }

    async fn push(&self, record: EventRecord) -> Uuid {
        let id = record.id;
        self.records.lock().await.push(record);
        id
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert_performance(&self, record: EventRecord) -> Result<(), StoreError> {
        self.push(record).await;
        Ok(())
    }

    async fn insert_pageview(&self, record: EventRecord) -> Result<(), StoreError> {
        self.push(record).await;
        Ok(())
    }

    async fn insert_utm(&self, record: EventRecord) -> Result<Uuid, StoreError> {
        Ok(self.push(record).await)
    }

    async fn insert_campaign(&self, record: EventRecord) -> Result<(), StoreError> {
        self.push(record).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ClientMeta;
    use sitepulse_sdk::objects::EventPayload;

    fn record(kind: EventKind) -> EventRecord {
        EventRecord::new(
            kind,
            EventPayload::new(),
            ClientMeta::from_request("127.0.0.1".into(), None, None, None),
        )
    }

    #[tokio::test]
    async fn utm_insert_echoes_the_record_id() {
        let store = MemoryEventStore::new();
        let rec = record(EventKind::Utm);
        let id = rec.id;
        assert_eq!(store.insert_utm(rec).await.ok(), Some(id));
        assert_eq!(store.count_by_kind(EventKind::Utm).await, 1);
    }

    #[tokio::test]
    async fn inserts_preserve_order() {
        let store = MemoryEventStore::new();
        store.insert_pageview(record(EventKind::Pageview)).await.ok();
        store
            .insert_performance(record(EventKind::Performance))
            .await
            .ok();
        let kinds: Vec<_> = store.records().await.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![EventKind::Pageview, EventKind::Performance]);
    }
}
