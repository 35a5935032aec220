//! Errors shared by every persistence port.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure of a store operation.
///
/// Adapters map driver errors onto these variants so callers can branch on
/// meaning (a duplicate, a missing row, a dead connection) without knowing
/// which database sits behind the port.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation {
        /// Name of the violated constraint (or the column it guards).
        constraint: String,
    },

    /// The requested row does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of row that was looked up
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The store could not be reached (pool exhausted, connection refused).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be mapped back into a domain value.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Shorthand for [`StoreError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True when the failure is a uniqueness conflict.
    #[must_use]
    pub const fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}
