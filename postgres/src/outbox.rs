//! `PostgreSQL` implementation of [`OutboxStore`].

use crate::map_sqlx_error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventhub_core::event::SerializedEvent;
use eventhub_core::outbox::{OutboxEntry, OutboxStore};
use eventhub_core::store::StoreResult;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// Relay-side access to the `outbox` table.
///
/// Rows are written by [`PostgresUserStore`](crate::PostgresUserStore) in the
/// same transaction as the user they announce.
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: &PgRow) -> StoreResult<OutboxEntry> {
        let mut event = SerializedEvent::new(
            row.try_get("event_type").map_err(map_sqlx_error)?,
            row.try_get("payload").map_err(map_sqlx_error)?,
            row.try_get("metadata").map_err(map_sqlx_error)?,
        );
        event.key = row.try_get("event_key").map_err(map_sqlx_error)?;

        Ok(OutboxEntry {
            id: row.try_get("id").map_err(map_sqlx_error)?,
            topic: row.try_get("topic").map_err(map_sqlx_error)?,
            event,
            attempts: row.try_get("attempts").map_err(map_sqlx_error)?,
            last_error: row.try_get("last_error").map_err(map_sqlx_error)?,
            created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
        })
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn fetch_pending(&self, limit: usize) -> StoreResult<Vec<OutboxEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r"
            SELECT id, topic, event_type, event_key, payload, metadata,
                   attempts, last_error, created_at
            FROM outbox
            WHERE published_at IS NULL
            ORDER BY id
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn mark_published(&self, id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE outbox SET published_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn record_failure(&self, id: i64, error: &str) -> StoreResult<()> {
        sqlx::query("UPDATE outbox SET attempts = attempts + 1, last_error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn count_pending(&self) -> StoreResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE published_at IS NULL")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn prune_published(&self, published_before: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM outbox WHERE published_at IS NOT NULL AND published_at < $1")
            .bind(published_before)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
