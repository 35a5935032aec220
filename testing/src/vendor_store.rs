//! In-memory [`VendorStore`] enforcing the same uniqueness rules as the
//! `vendors` table.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap on poisoned locks
#![allow(clippy::missing_panics_doc)]

use crate::faults::Faults;
use async_trait::async_trait;
use chrono::Utc;
use eventhub_core::store::{StoreError, StoreResult};
use eventhub_core::vendor::{NewVendor, VendorId, VendorPage, VendorRecord, VendorStore, VendorUpdate};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct VendorTable {
    rows: BTreeMap<VendorId, VendorRecord>,
    last_id: VendorId,
}

impl VendorTable {
    fn check_unique(&self, skip: Option<VendorId>, email: &str, user_id: Option<&str>) -> StoreResult<()> {
        for row in self.rows.values().filter(|row| Some(row.id) != skip) {
            if row.email == email {
                return Err(StoreError::UniqueViolation {
                    constraint: "vendors_email_key".to_string(),
                });
            }
            if user_id.is_some() && row.user_id.as_deref() == user_id {
                return Err(StoreError::UniqueViolation {
                    constraint: "vendors_user_id_key".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// `BTreeMap`-backed vendor store.
///
/// Every call takes one lock, which makes each operation atomic the way a
/// single-statement transaction is. Use [`InMemoryVendorStore::fail_next`] to
/// simulate an unreachable database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVendorStore {
    table: Arc<Mutex<VendorTable>>,
    faults: Faults,
}

impl InMemoryVendorStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        self.faults.fail_next(count);
    }

    /// Snapshot of every record, ordered by id.
    #[must_use]
    pub fn records(&self) -> Vec<VendorRecord> {
        self.table.lock().unwrap().rows.values().cloned().collect()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().unwrap().rows.len()
    }

    /// True when no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VendorStore for InMemoryVendorStore {
    async fn find_by_user_id_or_email(
        &self,
        user_id: &str,
        email: &str,
    ) -> StoreResult<Option<VendorRecord>> {
        self.faults.check()?;
        let table = self.table.lock().unwrap();
        let by_user = table.rows.values().find(|row| row.is_owned_by(user_id));
        let by_email = || table.rows.values().find(|row| row.email == email);
        Ok(by_user.or_else(by_email).cloned())
    }

    async fn create(&self, vendor: NewVendor) -> StoreResult<VendorRecord> {
        self.faults.check()?;
        let mut table = self.table.lock().unwrap();
        table.check_unique(None, &vendor.email, vendor.user_id.as_deref())?;

        table.last_id += 1;
        let now = Utc::now();
        let record = VendorRecord {
            id: table.last_id,
            user_id: vendor.user_id,
            email: vendor.email,
            name: vendor.name,
            phone: vendor.phone,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn link_user(&self, id: VendorId, user_id: &str) -> StoreResult<Option<VendorRecord>> {
        self.faults.check()?;
        let mut table = self.table.lock().unwrap();
        let Some(email) = table
            .rows
            .get(&id)
            .filter(|row| !row.is_linked())
            .map(|row| row.email.clone())
        else {
            return Ok(None);
        };
        table.check_unique(Some(id), &email, Some(user_id))?;

        let row = table.rows.get_mut(&id).unwrap();
        row.user_id = Some(user_id.to_string());
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn get(&self, id: VendorId) -> StoreResult<Option<VendorRecord>> {
        self.faults.check()?;
        Ok(self.table.lock().unwrap().rows.get(&id).cloned())
    }

    async fn find_by_user_id(&self, user_id: &str) -> StoreResult<Option<VendorRecord>> {
        self.faults.check()?;
        Ok(self
            .table
            .lock()
            .unwrap()
            .rows
            .values()
            .find(|row| row.is_owned_by(user_id))
            .cloned())
    }

    async fn list(&self, page: VendorPage) -> StoreResult<Vec<VendorRecord>> {
        self.faults.check()?;
        let skip = usize::try_from(page.offset).unwrap_or(0);
        let take = usize::try_from(page.limit).unwrap_or(0);
        Ok(self
            .table
            .lock()
            .unwrap()
            .rows
            .values()
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    async fn update(&self, id: VendorId, update: VendorUpdate) -> StoreResult<Option<VendorRecord>> {
        self.faults.check()?;
        let mut table = self.table.lock().unwrap();
        let Some(current) = table.rows.get(&id).cloned() else {
            return Ok(None);
        };
        if let Some(email) = &update.email {
            table.check_unique(Some(id), email, None)?;
        }

        let row = table.rows.get_mut(&id).unwrap();
        row.email = update.email.unwrap_or(current.email);
        row.name = update.name.or(current.name);
        row.phone = update.phone.or(current.phone);
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn delete(&self, id: VendorId) -> StoreResult<bool> {
        self.faults.check()?;
        Ok(self.table.lock().unwrap().rows.remove(&id).is_some())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.faults.check()
    }
}

/// A vendor store whose lookups can lag behind its writes.
///
/// Queued answers are served, oldest first, by the next calls to
/// `find_by_user_id_or_email`; once the queue is empty lookups see the real
/// table again. Writes always go to the wrapped [`InMemoryVendorStore`], so
/// a writer acting on a stale answer hits the same unique constraints and
/// conditional updates it would after losing a race with another instance.
///
/// Every reconciliation-relevant call is logged in order, see
/// [`LaggingVendorStore::calls`].
#[derive(Debug, Clone, Default)]
pub struct LaggingVendorStore {
    inner: InMemoryVendorStore,
    stale: Arc<Mutex<VecDeque<Option<VendorRecord>>>>,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl LaggingVendorStore {
    /// Wrap `inner`.
    #[must_use]
    pub fn new(inner: InMemoryVendorStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Serve `answer` from the next lookup instead of the table.
    pub fn lag_next_lookup(&self, answer: Option<VendorRecord>) {
        self.stale.lock().unwrap().push_back(answer);
    }

    /// `find`, `create` and `link_user` calls, in the order they were made.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl VendorStore for LaggingVendorStore {
    async fn find_by_user_id_or_email(
        &self,
        user_id: &str,
        email: &str,
    ) -> StoreResult<Option<VendorRecord>> {
        self.log("find");
        let stale = self.stale.lock().unwrap().pop_front();
        match stale {
            Some(answer) => Ok(answer),
            None => self.inner.find_by_user_id_or_email(user_id, email).await,
        }
    }

    async fn create(&self, vendor: NewVendor) -> StoreResult<VendorRecord> {
        self.log("create");
        self.inner.create(vendor).await
    }

    async fn link_user(&self, id: VendorId, user_id: &str) -> StoreResult<Option<VendorRecord>> {
        self.log("link_user");
        self.inner.link_user(id, user_id).await
    }

    async fn get(&self, id: VendorId) -> StoreResult<Option<VendorRecord>> {
        self.inner.get(id).await
    }

    async fn find_by_user_id(&self, user_id: &str) -> StoreResult<Option<VendorRecord>> {
        self.inner.find_by_user_id(user_id).await
    }

    async fn list(&self, page: VendorPage) -> StoreResult<Vec<VendorRecord>> {
        self.inner.list(page).await
    }

    async fn update(&self, id: VendorId, update: VendorUpdate) -> StoreResult<Option<VendorRecord>> {
        self.inner.update(id, update).await
    }

    async fn delete(&self, id: VendorId) -> StoreResult<bool> {
        self.inner.delete(id).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enforces_email_and_user_uniqueness() {
        let store = InMemoryVendorStore::new();
        store.create(NewVendor::linked("1", "a@test.com")).await.expect("create");

        let err = store.create(NewVendor::placeholder("a@test.com", None, None)).await;
        assert!(err.expect_err("duplicate email").is_unique_violation());
        let err = store.create(NewVendor::linked("1", "b@test.com")).await;
        assert!(err.expect_err("duplicate user").is_unique_violation());

        store.create(NewVendor::placeholder("c@test.com", None, None)).await.expect("placeholder");
        store.create(NewVendor::placeholder("d@test.com", None, None)).await.expect("placeholder");
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn link_only_succeeds_once() {
        let store = InMemoryVendorStore::new();
        let placeholder = store
            .create(NewVendor::placeholder("v@test.com", None, None))
            .await
            .expect("create");

        assert!(store.link_user(placeholder.id, "42").await.expect("link").is_some());
        assert!(store.link_user(placeholder.id, "42").await.expect("relink").is_none());
        assert!(store.link_user(999, "43").await.expect("missing").is_none());
    }

    #[tokio::test]
    async fn injected_faults_are_transient() {
        let store = InMemoryVendorStore::new();
        store.fail_next(1);
        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
        assert!(store.ping().await.is_ok());
    }
}
