//! In-memory [`DeadLetterStore`].

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap on poisoned locks
#![allow(clippy::missing_panics_doc)]

use crate::faults::Faults;
use async_trait::async_trait;
use chrono::Utc;
use eventhub_core::dead_letter::{DLQStatus, DeadLetterStore, FailedEvent, NewFailedEvent};
use eventhub_core::store::{StoreError, StoreResult};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// `BTreeMap`-backed dead-letter store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeadLetterStore {
    entries: Arc<Mutex<BTreeMap<i64, FailedEvent>>>,
    faults: Faults,
}

impl InMemoryDeadLetterStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        self.faults.fail_next(count);
    }

    /// Snapshot of every entry regardless of status.
    #[must_use]
    pub fn entries(&self) -> Vec<FailedEvent> {
        self.entries.lock().unwrap().values().cloned().collect()
    }

    fn modify(&self, id: i64, change: impl FnOnce(&mut FailedEvent)) -> StoreResult<()> {
        self.faults.check()?;
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("dead letter", id))?;
        change(entry);
        entry.last_failed_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn park(&self, entry: NewFailedEvent) -> StoreResult<i64> {
        self.faults.check()?;
        let mut entries = self.entries.lock().unwrap();
        let id = entries.keys().next_back().map_or(1, |last| last + 1);
        let now = Utc::now();
        entries.insert(
            id,
            FailedEvent {
                id,
                topic: entry.topic,
                partition: entry.partition,
                offset: entry.offset,
                event: entry.event,
                error_message: entry.error_message,
                error_details: entry.error_details,
                retry_count: entry.retry_count,
                first_failed_at: now,
                last_failed_at: now,
                status: DLQStatus::Pending,
                resolved_at: None,
                resolved_by: None,
                resolution_notes: None,
            },
        );
        Ok(id)
    }

    async fn list_by_status(&self, status: DLQStatus, limit: usize) -> StoreResult<Vec<FailedEvent>> {
        self.faults.check()?;
        Ok(self
            .entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.status == status)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> StoreResult<Option<FailedEvent>> {
        self.faults.check()?;
        Ok(self.entries.lock().unwrap().get(&id).cloned())
    }

    async fn update_status(&self, id: i64, status: DLQStatus) -> StoreResult<()> {
        self.modify(id, |e| e.status = status)
    }

    async fn mark_resolved(&self, id: i64, resolved_by: &str, notes: Option<&str>) -> StoreResult<()> {
        self.modify(id, |e| {
            e.status = DLQStatus::Resolved;
            e.resolved_at = Some(Utc::now());
            e.resolved_by = Some(resolved_by.to_string());
            e.resolution_notes = notes.map(str::to_string);
        })
    }

    async fn mark_discarded(&self, id: i64, discarded_by: &str, reason: &str) -> StoreResult<()> {
        self.modify(id, |e| {
            e.status = DLQStatus::Discarded;
            e.resolved_at = Some(Utc::now());
            e.resolved_by = Some(discarded_by.to_string());
            e.resolution_notes = Some(reason.to_string());
        })
    }

    async fn count_pending(&self) -> StoreResult<i64> {
        self.faults.check()?;
        let pending = self
            .entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.status == DLQStatus::Pending)
            .count();
        Ok(i64::try_from(pending).unwrap_or(i64::MAX))
    }
}
