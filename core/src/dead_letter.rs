//! Dead-letter store port for messages that exhausted their retries.
//!
//! A parked message is acknowledged on the bus, so it stops blocking its
//! partition; from then on the dead-letter store is its only copy. Operators
//! replay or discard entries through the admin API.

use crate::event::SerializedEvent;
use crate::store::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Status of a failed event in the Dead Letter Queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DLQStatus {
    /// Event is pending investigation/reprocessing
    Pending,
    /// Event is currently being replayed
    Processing,
    /// Event was successfully reprocessed
    Resolved,
    /// Event was permanently discarded (cannot be fixed)
    Discarded,
}

impl DLQStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse status from its database string.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Corrupt` if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            _ => Err(StoreError::Corrupt(format!("Invalid DLQ status: {s}"))),
        }
    }
}

/// A message to park.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFailedEvent {
    /// Topic the message came from
    pub topic: String,
    /// Partition the message came from
    pub partition: i32,
    /// Offset of the message
    pub offset: i64,
    /// The message itself
    pub event: SerializedEvent,
    /// Last error, human readable
    pub error_message: String,
    /// Debug rendering of the last error
    pub error_details: Option<String>,
    /// Attempts made before parking
    pub retry_count: i32,
}

/// An entry in the Dead Letter Queue.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedEvent {
    /// Unique identifier for this DLQ entry
    pub id: i64,
    /// Topic the message came from
    pub topic: String,
    /// Partition the message came from
    pub partition: i32,
    /// Offset of the message
    pub offset: i64,
    /// The message that failed
    pub event: SerializedEvent,
    /// Error message from the failure
    pub error_message: String,
    /// Full error details
    pub error_details: Option<String>,
    /// Number of times processing was attempted
    pub retry_count: i32,
    /// When this event first failed
    pub first_failed_at: DateTime<Utc>,
    /// When this event most recently failed or changed status
    pub last_failed_at: DateTime<Utc>,
    /// Current processing status
    pub status: DLQStatus,
    /// When the failure was resolved (if applicable)
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who/what resolved the failure
    pub resolved_by: Option<String>,
    /// Notes about the resolution
    pub resolution_notes: Option<String>,
}

/// Persistence port for parked messages.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Park a message. Returns the new entry id.
    ///
    /// # Errors
    ///
    /// Returns a store error if the insert fails.
    async fn park(&self, entry: NewFailedEvent) -> StoreResult<i64>;

    /// Entries with `status`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails.
    async fn list_by_status(&self, status: DLQStatus, limit: usize) -> StoreResult<Vec<FailedEvent>>;

    /// Fetch one entry.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails.
    async fn get(&self, id: i64) -> StoreResult<Option<FailedEvent>>;

    /// Change an entry's status.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the entry does not exist.
    async fn update_status(&self, id: i64, status: DLQStatus) -> StoreResult<()>;

    /// Mark an entry resolved.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the entry does not exist.
    async fn mark_resolved(&self, id: i64, resolved_by: &str, notes: Option<&str>) -> StoreResult<()>;

    /// Mark an entry discarded.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the entry does not exist.
    async fn mark_discarded(&self, id: i64, discarded_by: &str, reason: &str) -> StoreResult<()>;

    /// Number of pending entries.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails.
    async fn count_pending(&self) -> StoreResult<i64>;
}
