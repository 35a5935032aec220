//! `PostgreSQL` implementation of [`VendorStore`].

use crate::map_sqlx_error;
use async_trait::async_trait;
use eventhub_core::store::{StoreError, StoreResult};
use eventhub_core::vendor::{NewVendor, VendorId, VendorPage, VendorRecord, VendorStore, VendorUpdate};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const VENDOR_COLUMNS: &str = "id, user_id, email, name, phone, created_at, updated_at";

/// Vendor records in the `vendors` table.
///
/// Every operation is a single statement, so each runs in its own implicit
/// transaction. `link_user` only touches rows whose `user_id` is still null,
/// which makes concurrent links of the same placeholder safe: exactly one
/// caller gets the row back.
///
/// # Example
///
/// ```no_run
/// use eventhub_core::vendor::{NewVendor, VendorStore};
/// use eventhub_postgres::PostgresVendorStore;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresVendorStore::new(pool);
/// let vendor = store.create(NewVendor::linked("42", "v@test.com")).await?;
/// assert!(vendor.is_linked());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresVendorStore {
    pool: PgPool,
}

impl PostgresVendorStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_vendor(row: &PgRow) -> StoreResult<VendorRecord> {
        Ok(VendorRecord {
            id: row.try_get("id").map_err(map_sqlx_error)?,
            user_id: row.try_get("user_id").map_err(map_sqlx_error)?,
            email: row.try_get("email").map_err(map_sqlx_error)?,
            name: row.try_get("name").map_err(map_sqlx_error)?,
            phone: row.try_get("phone").map_err(map_sqlx_error)?,
            created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
            updated_at: row.try_get("updated_at").map_err(map_sqlx_error)?,
        })
    }

    fn optional(row: Option<PgRow>) -> StoreResult<Option<VendorRecord>> {
        row.as_ref().map(Self::row_to_vendor).transpose()
    }
}

#[async_trait]
impl VendorStore for PostgresVendorStore {
    async fn find_by_user_id_or_email(
        &self,
        user_id: &str,
        email: &str,
    ) -> StoreResult<Option<VendorRecord>> {
        let row = sqlx::query(&format!(
            r"
            SELECT {VENDOR_COLUMNS}
            FROM vendors
            WHERE user_id = $1 OR email = $2
            ORDER BY CASE WHEN user_id = $1 THEN 0 ELSE 1 END, id
            LIMIT 1
            "
        ))
        .bind(user_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Self::optional(row)
    }

    async fn create(&self, vendor: NewVendor) -> StoreResult<VendorRecord> {
        let row = sqlx::query(&format!(
            r"
            INSERT INTO vendors (user_id, email, name, phone)
            VALUES ($1, $2, $3, $4)
            RETURNING {VENDOR_COLUMNS}
            "
        ))
        .bind(&vendor.user_id)
        .bind(&vendor.email)
        .bind(&vendor.name)
        .bind(&vendor.phone)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let record = Self::row_to_vendor(&row)?;
        tracing::debug!(vendor_id = record.id, email = %record.email, "Vendor inserted");
        Ok(record)
    }

    async fn link_user(&self, id: VendorId, user_id: &str) -> StoreResult<Option<VendorRecord>> {
        let row = sqlx::query(&format!(
            r"
            UPDATE vendors
            SET user_id = $2, updated_at = NOW()
            WHERE id = $1 AND user_id IS NULL
            RETURNING {VENDOR_COLUMNS}
            "
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Self::optional(row)
    }

    async fn get(&self, id: VendorId) -> StoreResult<Option<VendorRecord>> {
        let row = sqlx::query(&format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Self::optional(row)
    }

    async fn find_by_user_id(&self, user_id: &str) -> StoreResult<Option<VendorRecord>> {
        let row = sqlx::query(&format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE user_id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Self::optional(row)
    }

    async fn list(&self, page: VendorPage) -> StoreResult<Vec<VendorRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {VENDOR_COLUMNS} FROM vendors ORDER BY id LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(Self::row_to_vendor).collect()
    }

    async fn update(&self, id: VendorId, update: VendorUpdate) -> StoreResult<Option<VendorRecord>> {
        let row = sqlx::query(&format!(
            r"
            UPDATE vendors
            SET email = COALESCE($2, email),
                name = COALESCE($3, name),
                phone = COALESCE($4, phone),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {VENDOR_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&update.email)
        .bind(&update.name)
        .bind(&update.phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Self::optional(row)
    }

    async fn delete(&self, id: VendorId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM vendors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
