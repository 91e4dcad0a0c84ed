use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::{InboxKey, InboxRow, InboxStatus, InboxStore, OutboxRow, OutboxStatus, OutboxStore, StoreError, StoreResult};

/// Postgres-backed outbox repository. Mirrors the row shape and SQL style of
/// the teacher's transactional-outbox library: bound raw queries rather than
/// the `sqlx::query!` compile-time macro, since the table name is
/// configurable per deployment (`RELAY_OUTBOX_TABLE`).
pub struct SqlxOutboxStore {
    pool: PgPool,
    table: String,
}

impl SqlxOutboxStore {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self { pool, table: table.into() }
    }

    fn row_from(&self, row: &sqlx::postgres::PgRow) -> StoreResult<OutboxRow> {
        Ok(OutboxRow {
            event_id: row.try_get("event_id")?,
            subject: row.try_get("subject")?,
            payload: row.try_get("payload")?,
            headers: row.try_get("headers")?,
            status: OutboxStatus::from_str(row.try_get::<String, _>("status")?.as_str()),
            attempts: row.try_get("attempts")?,
            enqueued_at: row.try_get("enqueued_at")?,
            sent_at: row.try_get("sent_at")?,
            last_error: row.try_get("last_error")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl OutboxStore for SqlxOutboxStore {
    async fn find_or_create_by_event_id(
        &self,
        event_id: Uuid,
        subject: &str,
        payload: serde_json::Value,
        headers: serde_json::Value,
    ) -> StoreResult<OutboxRow> {
        let insert_sql = format!(
            "INSERT INTO {} (event_id, subject, payload, headers, status, attempts, updated_at)
             VALUES ($1, $2, $3, $4, 'pending', 0, NOW())
             ON CONFLICT (event_id) DO NOTHING",
            self.table
        );
        sqlx::query(&insert_sql)
            .bind(event_id)
            .bind(subject)
            .bind(&payload)
            .bind(&headers)
            .execute(&self.pool)
            .await?;

        self.get(event_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(event_id.to_string()))
    }

    async fn get(&self, event_id: Uuid) -> StoreResult<Option<OutboxRow>> {
        let select_sql = format!("SELECT * FROM {} WHERE event_id = $1", self.table);
        let row = sqlx::query(&select_sql).bind(event_id).fetch_optional(&self.pool).await?;
        row.as_ref().map(|r| self.row_from(r)).transpose()
    }

    async fn mark_publishing(&self, event_id: Uuid) -> StoreResult<OutboxRow> {
        let update_sql = format!(
            "UPDATE {} SET status = 'publishing',
                           attempts = attempts + 1,
                           enqueued_at = COALESCE(enqueued_at, NOW()),
                           last_error = NULL,
                           updated_at = NOW()
             WHERE event_id = $1",
            self.table
        );
        sqlx::query(&update_sql).bind(event_id).execute(&self.pool).await?;
        self.get(event_id).await?.ok_or_else(|| StoreError::NotFound(event_id.to_string()))
    }

    async fn mark_sent(&self, event_id: Uuid) -> StoreResult<()> {
        let update_sql = format!(
            "UPDATE {} SET status = 'sent', sent_at = NOW(), updated_at = NOW() WHERE event_id = $1",
            self.table
        );
        sqlx::query(&update_sql).bind(event_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn mark_failed(&self, event_id: Uuid, error: &str) -> StoreResult<()> {
        let update_sql = format!(
            "UPDATE {} SET status = 'failed', last_error = $2, updated_at = NOW() WHERE event_id = $1",
            self.table
        );
        sqlx::query(&update_sql).bind(event_id).bind(error).execute(&self.pool).await?;
        Ok(())
    }

    async fn find_stale_publishing(&self, older_than: Duration) -> StoreResult<Vec<OutboxRow>> {
        let cutoff: DateTime<Utc> = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_default();
        let select_sql = format!(
            "SELECT * FROM {} WHERE status = 'publishing' AND updated_at < $1",
            self.table
        );
        let rows = sqlx::query(&select_sql).bind(cutoff).fetch_all(&self.pool).await?;
        rows.iter().map(|r| self.row_from(r)).collect()
    }

    async fn reset_to_pending(&self, event_id: Uuid) -> StoreResult<()> {
        let update_sql = format!(
            "UPDATE {} SET status = 'pending', updated_at = NOW() WHERE event_id = $1",
            self.table
        );
        sqlx::query(&update_sql).bind(event_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn counts_by_status(&self) -> StoreResult<HashMap<String, i64>> {
        let select_sql = format!("SELECT status, COUNT(*) AS n FROM {} GROUP BY status", self.table);
        let rows = sqlx::query(&select_sql).fetch_all(&self.pool).await?;
        let mut out = HashMap::new();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            out.insert(status, n);
        }
        Ok(out)
    }

    async fn oldest_pending_age_seconds(&self) -> StoreResult<Option<i64>> {
        let select_sql = format!(
            "SELECT EXTRACT(EPOCH FROM (NOW() - MIN(updated_at)))::BIGINT AS age_seconds FROM {} WHERE status = 'pending'",
            self.table
        );
        let row = sqlx::query(&select_sql).fetch_one(&self.pool).await?;
        Ok(row.try_get::<Option<i64>, _>("age_seconds")?)
    }
}

/// Postgres-backed inbox repository. The unique key is stored as a single
/// text column (`dedup_key`, see [`InboxKey::as_storage_key`]) so the same
/// table serves both the `event_id` and `(stream, stream_seq)` fallback
/// cases without a nullable-unique-column trick.
pub struct SqlxInboxStore {
    pool: PgPool,
    table: String,
}

impl SqlxInboxStore {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self { pool, table: table.into() }
    }

    fn row_from(&self, row: &sqlx::postgres::PgRow, key: InboxKey) -> StoreResult<InboxRow> {
        Ok(InboxRow {
            key,
            subject: row.try_get("subject")?,
            status: InboxStatus::from_str(row.try_get::<String, _>("status")?.as_str()),
            received_at: row.try_get("received_at")?,
            processed_at: row.try_get("processed_at")?,
            deliveries: row.try_get("deliveries")?,
            last_error: row.try_get("last_error")?,
        })
    }

    async fn get_by_storage_key(&self, key: &InboxKey) -> StoreResult<Option<sqlx::postgres::PgRow>> {
        let select_sql = format!("SELECT * FROM {} WHERE dedup_key = $1", self.table);
        Ok(sqlx::query(&select_sql).bind(key.as_storage_key()).fetch_optional(&self.pool).await?)
    }
}

#[async_trait]
impl InboxStore for SqlxInboxStore {
    async fn find_or_create(&self, key: InboxKey, subject: &str) -> StoreResult<(InboxRow, bool)> {
        let insert_sql = format!(
            "INSERT INTO {} (dedup_key, subject, status, received_at, deliveries)
             VALUES ($1, $2, 'received', NOW(), 0)
             ON CONFLICT (dedup_key) DO NOTHING",
            self.table
        );
        let result = sqlx::query(&insert_sql).bind(key.as_storage_key()).bind(subject).execute(&self.pool).await?;
        let created = result.rows_affected() > 0;

        let row = self
            .get_by_storage_key(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.as_storage_key()))?;
        Ok((self.row_from(&row, key)?, created))
    }

    async fn get(&self, key: &InboxKey) -> StoreResult<Option<InboxRow>> {
        match self.get_by_storage_key(key).await? {
            Some(row) => Ok(Some(self.row_from(&row, key.clone())?)),
            None => Ok(None),
        }
    }

    async fn mark_processing(&self, key: &InboxKey, deliveries: i32) -> StoreResult<()> {
        let update_sql = format!(
            "UPDATE {} SET status = 'processing', deliveries = $2, last_error = NULL WHERE dedup_key = $1",
            self.table
        );
        sqlx::query(&update_sql).bind(key.as_storage_key()).bind(deliveries).execute(&self.pool).await?;
        Ok(())
    }

    async fn mark_processed(&self, key: &InboxKey) -> StoreResult<()> {
        let update_sql = format!(
            "UPDATE {} SET status = 'processed', processed_at = NOW() WHERE dedup_key = $1",
            self.table
        );
        sqlx::query(&update_sql).bind(key.as_storage_key()).execute(&self.pool).await?;
        Ok(())
    }

    async fn mark_failed(&self, key: &InboxKey, error: &str) -> StoreResult<()> {
        let update_sql = format!(
            "UPDATE {} SET status = 'failed', last_error = $2 WHERE dedup_key = $1",
            self.table
        );
        sqlx::query(&update_sql).bind(key.as_storage_key()).bind(error).execute(&self.pool).await?;
        Ok(())
    }

    async fn counts_by_status(&self) -> StoreResult<HashMap<String, i64>> {
        let select_sql = format!("SELECT status, COUNT(*) AS n FROM {} GROUP BY status", self.table);
        let rows = sqlx::query(&select_sql).fetch_all(&self.pool).await?;
        let mut out = HashMap::new();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            out.insert(status, n);
        }
        Ok(out)
    }
}
