use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{InboxKey, InboxRow, InboxStatus, InboxStore, OutboxRow, OutboxStatus, OutboxStore, StoreError, StoreResult};

/// In-memory outbox store for unit tests and for callers whose "outbox
/// model" is not backed by an ACID store — the degrade-gracefully path in
/// the publish algorithm still gets a real `OutboxStore` to talk to, it is
/// simply not durable across process restarts.
#[derive(Default)]
pub struct InMemoryOutboxStore {
    rows: Mutex<HashMap<Uuid, OutboxRow>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn find_or_create_by_event_id(
        &self,
        event_id: Uuid,
        subject: &str,
        payload: serde_json::Value,
        headers: serde_json::Value,
    ) -> StoreResult<OutboxRow> {
        let mut rows = self.rows.lock().await;
        let row = rows.entry(event_id).or_insert_with(|| OutboxRow {
            event_id,
            subject: subject.to_string(),
            payload,
            headers,
            status: OutboxStatus::Pending,
            attempts: 0,
            enqueued_at: None,
            sent_at: None,
            last_error: None,
            updated_at: Utc::now(),
        });
        Ok(row.clone())
    }

    async fn get(&self, event_id: Uuid) -> StoreResult<Option<OutboxRow>> {
        Ok(self.rows.lock().await.get(&event_id).cloned())
    }

    async fn mark_publishing(&self, event_id: Uuid) -> StoreResult<OutboxRow> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&event_id).ok_or_else(|| StoreError::NotFound(event_id.to_string()))?;
        row.status = OutboxStatus::Publishing;
        row.attempts += 1;
        if row.enqueued_at.is_none() {
            row.enqueued_at = Some(Utc::now());
        }
        row.last_error = None;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn mark_sent(&self, event_id: Uuid) -> StoreResult<()> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&event_id).ok_or_else(|| StoreError::NotFound(event_id.to_string()))?;
        row.status = OutboxStatus::Sent;
        row.sent_at = Some(Utc::now());
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(&self, event_id: Uuid, error: &str) -> StoreResult<()> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&event_id).ok_or_else(|| StoreError::NotFound(event_id.to_string()))?;
        row.status = OutboxStatus::Failed;
        row.last_error = Some(error.to_string());
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn find_stale_publishing(&self, older_than: Duration) -> StoreResult<Vec<OutboxRow>> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_default();
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|r| matches!(r.status, OutboxStatus::Publishing) && r.updated_at < cutoff)
            .cloned()
            .collect())
    }

    async fn reset_to_pending(&self, event_id: Uuid) -> StoreResult<()> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&event_id).ok_or_else(|| StoreError::NotFound(event_id.to_string()))?;
        row.status = OutboxStatus::Pending;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn counts_by_status(&self) -> StoreResult<HashMap<String, i64>> {
        let rows = self.rows.lock().await;
        let mut out = HashMap::new();
        for row in rows.values() {
            *out.entry(row.status.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(out)
    }

    async fn oldest_pending_age_seconds(&self) -> StoreResult<Option<i64>> {
        let rows = self.rows.lock().await;
        let oldest = rows
            .values()
            .filter(|r| matches!(r.status, OutboxStatus::Pending))
            .map(|r| r.updated_at)
            .min();
        Ok(oldest.map(|ts| (Utc::now() - ts).num_seconds().max(0)))
    }
}

#[derive(Default)]
pub struct InMemoryInboxStore {
    rows: Mutex<HashMap<InboxKey, InboxRow>>,
}

impl InMemoryInboxStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InboxStore for InMemoryInboxStore {
    async fn find_or_create(&self, key: InboxKey, subject: &str) -> StoreResult<(InboxRow, bool)> {
        let mut rows = self.rows.lock().await;
        if let Some(existing) = rows.get(&key) {
            return Ok((existing.clone(), false));
        }
        let row = InboxRow {
            key: key.clone(),
            subject: subject.to_string(),
            status: InboxStatus::Received,
            received_at: Utc::now(),
            processed_at: None,
            deliveries: 0,
            last_error: None,
        };
        rows.insert(key, row.clone());
        Ok((row, true))
    }

    async fn get(&self, key: &InboxKey) -> StoreResult<Option<InboxRow>> {
        Ok(self.rows.lock().await.get(key).cloned())
    }

    async fn mark_processing(&self, key: &InboxKey, deliveries: i32) -> StoreResult<()> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(key).ok_or_else(|| StoreError::NotFound(key.as_storage_key()))?;
        row.status = InboxStatus::Processing;
        row.deliveries = deliveries;
        row.last_error = None;
        Ok(())
    }

    async fn mark_processed(&self, key: &InboxKey) -> StoreResult<()> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(key).ok_or_else(|| StoreError::NotFound(key.as_storage_key()))?;
        row.status = InboxStatus::Processed;
        row.processed_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_failed(&self, key: &InboxKey, error: &str) -> StoreResult<()> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(key).ok_or_else(|| StoreError::NotFound(key.as_storage_key()))?;
        row.status = InboxStatus::Failed;
        row.last_error = Some(error.to_string());
        Ok(())
    }

    async fn counts_by_status(&self) -> StoreResult<HashMap<String, i64>> {
        let rows = self.rows.lock().await;
        let mut out = HashMap::new();
        for row in rows.values() {
            *out.entry(row.status.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outbox_find_or_create_is_idempotent() {
        let store = InMemoryOutboxStore::new();
        let id = Uuid::new_v4();
        let a = store.find_or_create_by_event_id(id, "test.shop.order.created", serde_json::json!({}), serde_json::json!({})).await.unwrap();
        let b = store.find_or_create_by_event_id(id, "test.shop.order.created", serde_json::json!({"ignored": true}), serde_json::json!({})).await.unwrap();
        assert_eq!(a.event_id, b.event_id);
        assert_eq!(store.counts_by_status().await.unwrap().get("pending"), Some(&1));
    }

    #[tokio::test]
    async fn outbox_mark_publishing_increments_attempts() {
        let store = InMemoryOutboxStore::new();
        let id = Uuid::new_v4();
        store.find_or_create_by_event_id(id, "s", serde_json::json!({}), serde_json::json!({})).await.unwrap();
        let row1 = store.mark_publishing(id).await.unwrap();
        assert_eq!(row1.attempts, 1);
        let row2 = store.mark_publishing(id).await.unwrap();
        assert_eq!(row2.attempts, 2);
    }

    #[tokio::test]
    async fn outbox_stale_publishing_rows_are_recoverable() {
        let store = InMemoryOutboxStore::new();
        let id = Uuid::new_v4();
        store.find_or_create_by_event_id(id, "s", serde_json::json!({}), serde_json::json!({})).await.unwrap();
        store.mark_publishing(id).await.unwrap();
        let stale = store.find_stale_publishing(Duration::from_secs(0)).await.unwrap();
        assert_eq!(stale.len(), 1);
        store.reset_to_pending(id).await.unwrap();
        assert!(matches!(store.get(id).await.unwrap().unwrap().status, OutboxStatus::Pending));
    }

    #[tokio::test]
    async fn inbox_second_find_or_create_does_not_recreate() {
        let store = InMemoryInboxStore::new();
        let key = InboxKey::EventId(Uuid::new_v4());
        let (_, created1) = store.find_or_create(key.clone(), "s").await.unwrap();
        let (_, created2) = store.find_or_create(key.clone(), "s").await.unwrap();
        assert!(created1);
        assert!(!created2);
    }

    #[tokio::test]
    async fn inbox_processed_is_observed_on_redelivery() {
        let store = InMemoryInboxStore::new();
        let key = InboxKey::EventId(Uuid::new_v4());
        store.find_or_create(key.clone(), "s").await.unwrap();
        store.mark_processing(&key, 1).await.unwrap();
        store.mark_processed(&key).await.unwrap();
        let row = store.get(&key).await.unwrap().unwrap();
        assert!(matches!(row.status, InboxStatus::Processed));
        assert!(row.processed_at.is_some());
    }
}
