//! Repository interfaces for the outbox and inbox tables, plus a Postgres
//! implementation of each backed by `sqlx` and an in-memory fake for tests.
//!
//! This replaces the ORM-discovery style persistence the spec's "Model-backed
//! persistence" design note calls out: no active-record lookup by
//! convention, just a narrow capability trait (`OutboxStore`/`InboxStore`)
//! implementations can satisfy however they like.

mod error;
mod memory;
mod sqlx_store;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryInboxStore, InMemoryOutboxStore};
pub use sqlx_store::{SqlxInboxStore, SqlxOutboxStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboxStatus {
    Pending,
    Publishing,
    Sent,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Publishing => "publishing",
            OutboxStatus::Sent => "sent",
            OutboxStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "publishing" => OutboxStatus::Publishing,
            "sent" => OutboxStatus::Sent,
            "failed" => OutboxStatus::Failed,
            _ => OutboxStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub event_id: Uuid,
    pub subject: String,
    pub payload: Value,
    pub headers: Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Look up the row by `event_id`; if absent, insert a fresh `pending` row.
    /// Returns the row in whichever state it was found or created.
    async fn find_or_create_by_event_id(
        &self,
        event_id: Uuid,
        subject: &str,
        payload: Value,
        headers: Value,
    ) -> StoreResult<OutboxRow>;

    async fn get(&self, event_id: Uuid) -> StoreResult<Option<OutboxRow>>;

    /// Transition to `publishing`, increment `attempts`, stamp `enqueued_at`
    /// if unset, clear `last_error`. Returns the row post-transition.
    async fn mark_publishing(&self, event_id: Uuid) -> StoreResult<OutboxRow>;

    async fn mark_sent(&self, event_id: Uuid) -> StoreResult<()>;

    async fn mark_failed(&self, event_id: Uuid, error: &str) -> StoreResult<()>;

    /// Rows stuck in `publishing` for longer than `older_than`, for the
    /// recovery sweep to reset back to `pending`.
    async fn find_stale_publishing(&self, older_than: Duration) -> StoreResult<Vec<OutboxRow>>;

    async fn reset_to_pending(&self, event_id: Uuid) -> StoreResult<()>;

    async fn counts_by_status(&self) -> StoreResult<HashMap<String, i64>>;

    /// Age in seconds of the longest-waiting `pending` row, measured from
    /// `updated_at` (the timestamp a row most recently entered `pending`).
    /// `None` when no row is pending.
    async fn oldest_pending_age_seconds(&self) -> StoreResult<Option<i64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboxStatus {
    Received,
    Processing,
    Processed,
    Failed,
}

impl InboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboxStatus::Received => "received",
            InboxStatus::Processing => "processing",
            InboxStatus::Processed => "processed",
            InboxStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "processing" => InboxStatus::Processing,
            "processed" => InboxStatus::Processed,
            "failed" => InboxStatus::Failed,
            _ => InboxStatus::Received,
        }
    }
}

/// Unique key for an inbox row: the event id when present, else the
/// `(stream, stream_seq)` fallback pair named in the data model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InboxKey {
    EventId(Uuid),
    StreamSeq(String, i64),
}

impl InboxKey {
    pub fn as_storage_key(&self) -> String {
        match self {
            InboxKey::EventId(id) => format!("event:{id}"),
            InboxKey::StreamSeq(stream, seq) => format!("seq:{stream}:{seq}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InboxRow {
    pub key: InboxKey,
    pub subject: String,
    pub status: InboxStatus,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub deliveries: i32,
    pub last_error: Option<String>,
}

#[async_trait]
pub trait InboxStore: Send + Sync {
    /// Look up or insert the row for `key`. The bool is `true` when this call
    /// created the row (races on insert are resolved by a DB unique
    /// constraint in the sqlx implementation; the losing side reloads and
    /// returns `false`).
    async fn find_or_create(&self, key: InboxKey, subject: &str) -> StoreResult<(InboxRow, bool)>;

    async fn get(&self, key: &InboxKey) -> StoreResult<Option<InboxRow>>;

    async fn mark_processing(&self, key: &InboxKey, deliveries: i32) -> StoreResult<()>;

    async fn mark_processed(&self, key: &InboxKey) -> StoreResult<()>;

    async fn mark_failed(&self, key: &InboxKey, error: &str) -> StoreResult<()>;

    async fn counts_by_status(&self) -> StoreResult<HashMap<String, i64>>;
}
