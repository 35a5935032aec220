//! Vendor records and the port the vendors service persists them through.
//!
//! Two uniqueness invariants hold at all times and are enforced by the store
//! itself, not by callers:
//!
//! - at most one record per `email`;
//! - at most one record per non-null `user_id`.
//!
//! Violations surface as [`StoreError::UniqueViolation`](crate::store::StoreError).

use crate::store::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned vendor identifier.
pub type VendorId = i64;

/// A vendor as stored by the vendors service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorRecord {
    /// Store-assigned id, immutable.
    pub id: VendorId,
    /// Identity-service user this vendor belongs to; `None` for a placeholder.
    pub user_id: Option<String>,
    /// Contact email, unique.
    pub email: String,
    /// Display name.
    pub name: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl VendorRecord {
    /// True once a user has been attached.
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        self.user_id.is_some()
    }

    /// True when the record is linked to `user_id`.
    #[must_use]
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }
}

/// Fields for a record about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVendor {
    /// Linked user, if known at creation time.
    pub user_id: Option<String>,
    /// Contact email.
    pub email: String,
    /// Display name.
    pub name: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
}

impl NewVendor {
    /// A record created from a registration: linked, with no profile data yet.
    #[must_use]
    pub fn linked(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            email: email.into(),
            name: None,
            phone: None,
        }
    }

    /// A record created ahead of registration, waiting to be linked.
    #[must_use]
    pub fn placeholder(email: impl Into<String>, name: Option<String>, phone: Option<String>) -> Self {
        Self {
            user_id: None,
            email: email.into(),
            name,
            phone,
        }
    }
}

/// Partial update. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VendorUpdate {
    /// New email.
    pub email: Option<String>,
    /// New display name.
    pub name: Option<String>,
    /// New phone.
    pub phone: Option<String>,
}

impl VendorUpdate {
    /// True when the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.email.is_none() && self.name.is_none() && self.phone.is_none()
    }
}

/// Paging window for listings, ordered by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorPage {
    /// Maximum rows returned.
    pub limit: i64,
    /// Rows skipped.
    pub offset: i64,
}

impl Default for VendorPage {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// Persistence port for vendor records.
///
/// Every method runs in its own local transaction.
#[async_trait]
pub trait VendorStore: Send + Sync {
    /// Find the record matching `user_id` or `email`.
    ///
    /// When one record matches the user id and another matches the email, the
    /// user-id match is returned.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    async fn find_by_user_id_or_email(
        &self,
        user_id: &str,
        email: &str,
    ) -> StoreResult<Option<VendorRecord>>;

    /// Insert a record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` if the email or user id is taken.
    async fn create(&self, vendor: NewVendor) -> StoreResult<VendorRecord>;

    /// Attach `user_id` to a placeholder.
    ///
    /// Returns `None` when record `id` no longer exists or is already linked,
    /// so two concurrent links cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` if `user_id` is already linked
    /// to another record.
    async fn link_user(&self, id: VendorId, user_id: &str) -> StoreResult<Option<VendorRecord>>;

    /// Fetch a record by id.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    async fn get(&self, id: VendorId) -> StoreResult<Option<VendorRecord>>;

    /// Fetch the record linked to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    async fn find_by_user_id(&self, user_id: &str) -> StoreResult<Option<VendorRecord>>;

    /// List records ordered by id.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails.
    async fn list(&self, page: VendorPage) -> StoreResult<Vec<VendorRecord>>;

    /// Apply a partial update. Returns `None` if the record does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` if the new email is taken.
    async fn update(&self, id: VendorId, update: VendorUpdate) -> StoreResult<Option<VendorRecord>>;

    /// Delete a record. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns a store error if the delete fails.
    async fn delete(&self, id: VendorId) -> StoreResult<bool>;

    /// Cheap round trip used by the readiness check.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the store cannot be reached.
    async fn ping(&self) -> StoreResult<()>;
}
