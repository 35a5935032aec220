//! `PostgreSQL` stores for eventhub.
//!
//! Each service owns its own database:
//!
//! - the auth service runs [`IDENTITY_MIGRATOR`] and uses
//!   [`PostgresUserStore`] and [`PostgresOutboxStore`];
//! - the vendors service runs [`VENDORS_MIGRATOR`] and uses
//!   [`PostgresVendorStore`] and [`DeadLetterQueue`].
//!
//! Uniqueness invariants are declared as table constraints, and a violation
//! comes back as [`StoreError::UniqueViolation`] rather than a raw driver error.

use eventhub_core::store::StoreError;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub mod dead_letter_queue;
pub mod outbox;
pub mod user_store;
pub mod vendor_store;

pub use dead_letter_queue::DeadLetterQueue;
pub use outbox::PostgresOutboxStore;
pub use user_store::PostgresUserStore;
pub use vendor_store::PostgresVendorStore;

/// Schema of the identity database (users, outbox).
pub static IDENTITY_MIGRATOR: Migrator = sqlx::migrate!("./migrations/identity");

/// Schema of the vendors database (vendors, `failed_events`).
pub static VENDORS_MIGRATOR: Migrator = sqlx::migrate!("./migrations/vendors");

/// Open a connection pool.
///
/// # Errors
///
/// Returns `StoreError::Unavailable` if no connection can be established.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))
}

/// Apply `migrator` to the database behind `pool`.
///
/// # Errors
///
/// Returns `StoreError::Database` if a migration fails.
pub async fn migrate(pool: &PgPool, migrator: &Migrator) -> Result<(), StoreError> {
    migrator
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;
    tracing::info!(migrations = migrator.iter().count(), "Database schema up to date");
    Ok(())
}

/// Map a driver error onto the store error taxonomy.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::UniqueViolation {
            constraint: db.constraint().unwrap_or("unique").to_string(),
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(err.to_string())
        }
        _ => StoreError::Database(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_unavailable() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn missing_rows_are_database_errors() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StoreError::Database(_)
        ));
    }

    #[test]
    fn decode_errors_are_corrupt() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::ColumnNotFound("email".into())),
            StoreError::Corrupt(_)
        ));
    }
}
