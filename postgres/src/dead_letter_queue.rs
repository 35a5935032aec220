//! Dead Letter Queue (DLQ) for registration events that could not be applied.
//!
//! Provides persistent storage for messages the vendor sync consumer gave up
//! on after exhausting its retries, so operators can investigate, replay or
//! discard them. Parked messages keep their topic, partition and offset for
//! tracing them back to the bus.

use crate::map_sqlx_error;
use async_trait::async_trait;
use eventhub_core::dead_letter::{DLQStatus, DeadLetterStore, FailedEvent, NewFailedEvent};
use eventhub_core::event::SerializedEvent;
use eventhub_core::store::{StoreError, StoreResult};
use sqlx::postgres::{PgQueryResult, PgRow};
use sqlx::{PgPool, Row};

const FAILED_EVENT_COLUMNS: &str = "
    id, topic, message_partition, message_offset, event_type, event_key, event_data, metadata,
    error_message, error_details, retry_count, first_failed_at, last_failed_at, status,
    resolved_at, resolved_by, resolution_notes";

/// `PostgreSQL`-based Dead Letter Queue.
///
/// # Example
///
/// ```no_run
/// use eventhub_core::dead_letter::{DLQStatus, DeadLetterStore};
/// use eventhub_postgres::DeadLetterQueue;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let dlq = DeadLetterQueue::new(pool);
///
/// let pending = dlq.list_by_status(DLQStatus::Pending, 100).await?;
/// println!("Pending failures: {}", pending.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DeadLetterQueue {
    pool: PgPool,
}

impl DeadLetterQueue {
    /// Create a new Dead Letter Queue with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn ensure_found(id: i64, result: &PgQueryResult) -> StoreResult<()> {
        if result.rows_affected() == 0 {
            Err(StoreError::not_found("dead letter", id))
        } else {
            Ok(())
        }
    }

    fn row_to_failed_event(row: &PgRow) -> StoreResult<FailedEvent> {
        let status: String = row.try_get("status").map_err(map_sqlx_error)?;
        let mut event = SerializedEvent::new(
            row.try_get("event_type").map_err(map_sqlx_error)?,
            row.try_get("event_data").map_err(map_sqlx_error)?,
            row.try_get("metadata").map_err(map_sqlx_error)?,
        );
        event.key = row.try_get("event_key").map_err(map_sqlx_error)?;

        Ok(FailedEvent {
            id: row.try_get("id").map_err(map_sqlx_error)?,
            topic: row.try_get("topic").map_err(map_sqlx_error)?,
            partition: row.try_get("message_partition").map_err(map_sqlx_error)?,
            offset: row.try_get("message_offset").map_err(map_sqlx_error)?,
            event,
            error_message: row.try_get("error_message").map_err(map_sqlx_error)?,
            error_details: row.try_get("error_details").map_err(map_sqlx_error)?,
            retry_count: row.try_get("retry_count").map_err(map_sqlx_error)?,
            first_failed_at: row.try_get("first_failed_at").map_err(map_sqlx_error)?,
            last_failed_at: row.try_get("last_failed_at").map_err(map_sqlx_error)?,
            status: DLQStatus::parse(&status)?,
            resolved_at: row.try_get("resolved_at").map_err(map_sqlx_error)?,
            resolved_by: row.try_get("resolved_by").map_err(map_sqlx_error)?,
            resolution_notes: row.try_get("resolution_notes").map_err(map_sqlx_error)?,
        })
    }
}

#[async_trait]
impl DeadLetterStore for DeadLetterQueue {
    async fn park(&self, entry: NewFailedEvent) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO failed_events (
                topic, message_partition, message_offset, event_type, event_key,
                event_data, metadata, error_message, error_details, retry_count
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            ",
        )
        .bind(&entry.topic)
        .bind(entry.partition)
        .bind(entry.offset)
        .bind(&entry.event.event_type)
        .bind(&entry.event.key)
        .bind(&entry.event.data)
        .bind(&entry.event.metadata)
        .bind(&entry.error_message)
        .bind(&entry.error_details)
        .bind(entry.retry_count)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        tracing::warn!(
            dlq_id = id,
            topic = %entry.topic,
            partition = entry.partition,
            offset = entry.offset,
            event_type = %entry.event.event_type,
            error = %entry.error_message,
            retry_count = entry.retry_count,
            "Event added to Dead Letter Queue"
        );

        Ok(id)
    }

    async fn list_by_status(&self, status: DLQStatus, limit: usize) -> StoreResult<Vec<FailedEvent>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            r"
            SELECT {FAILED_EVENT_COLUMNS}
            FROM failed_events
            WHERE status = $1
            ORDER BY first_failed_at ASC, id ASC
            LIMIT $2
            "
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(Self::row_to_failed_event).collect()
    }

    async fn get(&self, id: i64) -> StoreResult<Option<FailedEvent>> {
        let row = sqlx::query(&format!(
            "SELECT {FAILED_EVENT_COLUMNS} FROM failed_events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(Self::row_to_failed_event).transpose()
    }

    async fn update_status(&self, id: i64, status: DLQStatus) -> StoreResult<()> {
        let result = sqlx::query(
            r"
            UPDATE failed_events
            SET status = $1, last_failed_at = NOW()
            WHERE id = $2
            ",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Self::ensure_found(id, &result)?;

        tracing::info!(dlq_id = id, status = status.as_str(), "DLQ entry status updated");
        Ok(())
    }

    async fn mark_resolved(&self, id: i64, resolved_by: &str, notes: Option<&str>) -> StoreResult<()> {
        let result = sqlx::query(
            r"
            UPDATE failed_events
            SET status = 'resolved',
                resolved_at = NOW(),
                resolved_by = $1,
                resolution_notes = $2
            WHERE id = $3
            ",
        )
        .bind(resolved_by)
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Self::ensure_found(id, &result)?;

        tracing::info!(dlq_id = id, resolved_by, "DLQ entry marked as resolved");
        Ok(())
    }

    async fn mark_discarded(&self, id: i64, discarded_by: &str, reason: &str) -> StoreResult<()> {
        let result = sqlx::query(
            r"
            UPDATE failed_events
            SET status = 'discarded',
                resolved_at = NOW(),
                resolved_by = $1,
                resolution_notes = $2
            WHERE id = $3
            ",
        )
        .bind(discarded_by)
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Self::ensure_found(id, &result)?;

        tracing::warn!(dlq_id = id, discarded_by, reason, "DLQ entry marked as discarded");
        Ok(())
    }

    async fn count_pending(&self) -> StoreResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM failed_events WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn dlq_status_roundtrip() {
        for status in [
            DLQStatus::Pending,
            DLQStatus::Processing,
            DLQStatus::Resolved,
            DLQStatus::Discarded,
        ] {
            let parsed = DLQStatus::parse(status.as_str()).expect("valid status should parse");
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn dlq_status_invalid() {
        assert!(matches!(DLQStatus::parse("invalid"), Err(StoreError::Corrupt(_))));
    }
}
