//! In-memory users table with its outbox.
//!
//! [`InMemoryUserStore`] implements both [`UserStore`] and [`OutboxStore`]
//! over one lock, so a user and its announcement appear together or not at
//! all, as they do with the `PostgreSQL` adapter.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap on poisoned locks
#![allow(clippy::missing_panics_doc)]

use crate::faults::Faults;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventhub_core::identity::{Announcement, NewUser, User, UserId, UserStore};
use eventhub_core::outbox::{OutboxEntry, OutboxStore};
use eventhub_core::store::{StoreError, StoreResult};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct IdentityTables {
    users: BTreeMap<UserId, User>,
    outbox: BTreeMap<i64, OutboxEntry>,
    published: Vec<i64>,
    published_at: BTreeMap<i64, DateTime<Utc>>,
    last_user_id: UserId,
    last_outbox_id: i64,
}

/// In-memory user store and outbox.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserStore {
    tables: Arc<Mutex<IdentityTables>>,
    faults: Faults,
}

impl InMemoryUserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        self.faults.fail_next(count);
    }

    /// Number of registered users.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.tables.lock().unwrap().users.len()
    }

    /// Ids of outbox rows marked published, in the order they were marked.
    #[must_use]
    pub fn published_ids(&self) -> Vec<i64> {
        self.tables.lock().unwrap().published.clone()
    }

    /// Published rows not yet pruned.
    #[must_use]
    pub fn retained_published(&self) -> usize {
        self.tables.lock().unwrap().published_at.len()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create_user(&self, user: NewUser, announce: Announcement) -> StoreResult<User> {
        self.faults.check()?;
        let mut tables = self.tables.lock().unwrap();
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation {
                constraint: "users_email_key".to_string(),
            });
        }

        tables.last_user_id += 1;
        let created = User {
            id: tables.last_user_id,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: Utc::now(),
        };
        tables.users.insert(created.id, created.clone());

        if let Some(message) = announce(&created) {
            tables.last_outbox_id += 1;
            let entry = OutboxEntry {
                id: tables.last_outbox_id,
                topic: message.topic,
                event: message.event,
                attempts: 0,
                last_error: None,
                created_at: created.created_at,
            };
            tables.outbox.insert(entry.id, entry);
        }
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.faults.check()?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        self.faults.check()?;
        Ok(self.tables.lock().unwrap().users.get(&id).cloned())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.faults.check()
    }
}

#[async_trait]
impl OutboxStore for InMemoryUserStore {
    async fn fetch_pending(&self, limit: usize) -> StoreResult<Vec<OutboxEntry>> {
        self.faults.check()?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .outbox
            .values()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, id: i64) -> StoreResult<()> {
        self.faults.check()?;
        let mut tables = self.tables.lock().unwrap();
        if tables.outbox.remove(&id).is_some() {
            tables.published.push(id);
            tables.published_at.insert(id, Utc::now());
        }
        Ok(())
    }

    async fn record_failure(&self, id: i64, error: &str) -> StoreResult<()> {
        self.faults.check()?;
        if let Some(entry) = self.tables.lock().unwrap().outbox.get_mut(&id) {
            entry.attempts += 1;
            entry.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn count_pending(&self) -> StoreResult<i64> {
        self.faults.check()?;
        let pending = self.tables.lock().unwrap().outbox.len();
        Ok(i64::try_from(pending).unwrap_or(i64::MAX))
    }

    async fn prune_published(&self, published_before: DateTime<Utc>) -> StoreResult<u64> {
        self.faults.check()?;
        let mut tables = self.tables.lock().unwrap();
        let before = tables.published_at.len();
        tables.published_at.retain(|_, at| *at >= published_before);
        Ok(u64::try_from(before - tables.published_at.len()).unwrap_or(u64::MAX))
    }
}
