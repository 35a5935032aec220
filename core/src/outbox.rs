//! Transactional outbox port.
//!
//! Rows are written in the same transaction as the state change they
//! announce, then drained to the bus by a relay. A row is published at least
//! once; it can be published more than once if the relay dies between the
//! broker ack and [`OutboxStore::mark_published`]. Published rows are kept
//! until [`OutboxStore::prune_published`] removes them.

use crate::event::SerializedEvent;
use crate::store::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A message waiting to be written to the outbox.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    /// Destination topic.
    pub topic: String,
    /// Message to publish.
    pub event: SerializedEvent,
}

/// A stored, not yet published message.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    /// Row id; rows are relayed in id order.
    pub id: i64,
    /// Destination topic.
    pub topic: String,
    /// Message to publish.
    pub event: SerializedEvent,
    /// Failed publish attempts so far.
    pub attempts: i32,
    /// Last publish error.
    pub last_error: Option<String>,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

/// Persistence port for the relay side of the outbox.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Oldest unpublished rows, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails.
    async fn fetch_pending(&self, limit: usize) -> StoreResult<Vec<OutboxEntry>>;

    /// Mark a row as published.
    ///
    /// # Errors
    ///
    /// Returns a store error if the update fails.
    async fn mark_published(&self, id: i64) -> StoreResult<()>;

    /// Record a failed publish attempt; the row stays pending.
    ///
    /// # Errors
    ///
    /// Returns a store error if the update fails.
    async fn record_failure(&self, id: i64, error: &str) -> StoreResult<()>;

    /// Number of unpublished rows.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails.
    async fn count_pending(&self) -> StoreResult<i64>;

    /// Delete rows published before `published_before`. Pending rows are
    /// never touched. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns a store error if the delete fails.
    async fn prune_published(&self, published_before: DateTime<Utc>) -> StoreResult<u64>;
}
