//! Reconciliation of one registration against the vendor store.
//!
//! A registration `(user_id, email)` meets one of three states:
//!
//! | Found record                   | Action                | Outcome             |
//! |--------------------------------|-----------------------|---------------------|
//! | none                           | create linked record  | `created`           |
//! | placeholder with this email    | set its `user_id`     | `linked`            |
//! | linked record                  | nothing               | `duplicate_skipped` |
//!
//! Every step is a single-statement transaction, so two reconcilers racing on
//! the same registration can both decide to write. The loser hits a unique
//! constraint or a lost conditional update and re-reads; the second read
//! lands on the "linked" row and ends in `duplicate_skipped`.

use eventhub_core::registration::{MalformedEvent, RegistrationEvent};
use eventhub_core::store::StoreError;
use eventhub_core::vendor::{NewVendor, VendorId, VendorRecord, VendorStore};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Re-reads allowed after losing a race before giving up on the write.
const MAX_PASSES: usize = 3;

/// What reconciliation did with a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// No record existed; a linked one was created.
    Created,
    /// A placeholder with the same email was linked to the user.
    Linked,
    /// The user already has a record; nothing changed.
    DuplicateSkipped,
}

impl SyncOutcome {
    /// Metric label and log value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Linked => "linked",
            Self::DuplicateSkipped => "duplicate_skipped",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciliation failures. Malformed payloads are final; store failures are
/// worth retrying.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The payload is not a registration.
    #[error("malformed registration: {0}")]
    Malformed(#[from] MalformedEvent),

    /// The vendor store failed.
    #[error("vendor store failed: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Whether trying again can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// The write a registration calls for, given the record it matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Insert a linked record.
    Create,
    /// Link this placeholder.
    Link(VendorId),
    /// Leave the store alone.
    Skip,
}

/// Choose the write for `event` given the record found by user id or email.
#[must_use]
pub fn decide(existing: Option<&VendorRecord>, event: &RegistrationEvent) -> Decision {
    match existing {
        None => Decision::Create,
        Some(record) if !record.is_linked() && record.email == event.email => Decision::Link(record.id),
        Some(_) => Decision::Skip,
    }
}

/// Applies registrations to the vendor store.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn VendorStore>,
}

impl Reconciler {
    /// Create a reconciler over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn VendorStore>) -> Self {
        Self { store }
    }

    /// Decode `payload` and apply it.
    ///
    /// # Errors
    ///
    /// [`SyncError::Malformed`] if the payload is not a registration,
    /// [`SyncError::Store`] if the store fails.
    pub async fn apply_payload(&self, payload: &[u8]) -> Result<SyncOutcome, SyncError> {
        let event = RegistrationEvent::decode(payload)?;
        self.apply(&event).await
    }

    /// Apply one registration. Safe to call any number of times.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] for store failures other than unique
    /// violations, which are part of the duplicate case.
    pub async fn apply(&self, event: &RegistrationEvent) -> Result<SyncOutcome, SyncError> {
        let user_ref = event.user_ref();

        for pass in 1..=MAX_PASSES {
            let existing = self.store.find_by_user_id_or_email(&user_ref, &event.email).await?;

            let conflict = match decide(existing.as_ref(), event) {
                Decision::Create => match self.store.create(NewVendor::linked(&user_ref, &event.email)).await {
                    Ok(record) => {
                        info!(
                            vendor_id = record.id,
                            user_id = event.user_id,
                            email = %event.email,
                            outcome = "created",
                            "Vendor created from registration"
                        );
                        return Ok(SyncOutcome::Created);
                    }
                    Err(e) if e.is_unique_violation() => e.to_string(),
                    Err(e) => return Err(e.into()),
                },
                Decision::Link(vendor_id) => match self.store.link_user(vendor_id, &user_ref).await {
                    Ok(Some(_)) => {
                        info!(
                            vendor_id,
                            user_id = event.user_id,
                            email = %event.email,
                            outcome = "linked",
                            "Placeholder vendor linked to user"
                        );
                        return Ok(SyncOutcome::Linked);
                    }
                    Ok(None) => format!("placeholder {vendor_id} changed before link"),
                    Err(e) if e.is_unique_violation() => e.to_string(),
                    Err(e) => return Err(e.into()),
                },
                Decision::Skip => {
                    let linked_to = existing.as_ref().and_then(|r| r.user_id.as_deref());
                    if linked_to == Some(user_ref.as_str()) {
                        info!(
                            vendor_id = existing.as_ref().map(|r| r.id),
                            user_id = event.user_id,
                            outcome = "duplicate_skipped",
                            "Vendor already linked"
                        );
                    } else {
                        warn!(
                            vendor_id = existing.as_ref().map(|r| r.id),
                            user_id = event.user_id,
                            email = %event.email,
                            linked_to,
                            outcome = "duplicate_skipped",
                            "Email already belongs to another user's vendor"
                        );
                    }
                    return Ok(SyncOutcome::DuplicateSkipped);
                }
            };

            debug!(user_id = event.user_id, pass, reason = %conflict, "Lost a race, re-reading");
        }

        info!(
            user_id = event.user_id,
            email = %event.email,
            outcome = "duplicate_skipped",
            "Vendor kept changing under reconciliation; treating as duplicate"
        );
        Ok(SyncOutcome::DuplicateSkipped)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use eventhub_testing::{InMemoryVendorStore, LaggingVendorStore};
    use eventhub_testing::strategies::{placeholder_emails, registration_batch};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn record(id: VendorId, user_id: Option<&str>, email: &str) -> VendorRecord {
        VendorRecord {
            id,
            user_id: user_id.map(str::to_string),
            email: email.to_string(),
            name: None,
            phone: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn reconciler(store: &InMemoryVendorStore) -> Reconciler {
        Reconciler::new(Arc::new(store.clone()))
    }

    #[test]
    fn decide_covers_every_state() {
        let event = RegistrationEvent::new(42, "v@test.com");
        assert_eq!(decide(None, &event), Decision::Create);
        assert_eq!(decide(Some(&record(7, None, "v@test.com")), &event), Decision::Link(7));
        assert_eq!(decide(Some(&record(7, Some("42"), "v@test.com")), &event), Decision::Skip);
        assert_eq!(decide(Some(&record(7, Some("9"), "v@test.com")), &event), Decision::Skip);
        assert_eq!(decide(Some(&record(7, Some("42"), "old@test.com")), &event), Decision::Skip);
    }

    #[tokio::test]
    async fn creates_a_linked_record() {
        let store = InMemoryVendorStore::new();
        let outcome = reconciler(&store).apply(&RegistrationEvent::new(42, "v@test.com")).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Created);
        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id.as_deref(), Some("42"));
        assert_eq!(records[0].email, "v@test.com");
        assert_eq!(records[0].name, None);
        assert_eq!(records[0].phone, None);
    }

    #[tokio::test]
    async fn applying_twice_changes_nothing() {
        let store = InMemoryVendorStore::new();
        let reconciler = reconciler(&store);
        let event = RegistrationEvent::new(42, "v@test.com");

        assert_eq!(reconciler.apply(&event).await.unwrap(), SyncOutcome::Created);
        let before = store.records();
        assert_eq!(reconciler.apply(&event).await.unwrap(), SyncOutcome::DuplicateSkipped);
        assert_eq!(store.records(), before);
    }

    #[tokio::test]
    async fn links_a_placeholder_and_keeps_its_profile() {
        let store = InMemoryVendorStore::new();
        let placeholder = store
            .create(NewVendor::placeholder(
                "v@test.com",
                Some("Vendor Co".to_string()),
                Some("555-0100".to_string()),
            ))
            .await
            .unwrap();

        let outcome = reconciler(&store).apply(&RegistrationEvent::new(42, "v@test.com")).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Linked);

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, placeholder.id);
        assert_eq!(records[0].user_id.as_deref(), Some("42"));
        assert_eq!(records[0].name.as_deref(), Some("Vendor Co"));
        assert_eq!(records[0].phone.as_deref(), Some("555-0100"));
    }

    #[tokio::test]
    async fn email_owned_by_another_user_is_left_alone() {
        let store = InMemoryVendorStore::new();
        store.create(NewVendor::linked("7", "v@test.com")).await.unwrap();

        let outcome = reconciler(&store).apply(&RegistrationEvent::new(42, "v@test.com")).await.unwrap();
        assert_eq!(outcome, SyncOutcome::DuplicateSkipped);
        assert_eq!(store.records()[0].user_id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn store_failures_surface_as_retryable() {
        let store = InMemoryVendorStore::new();
        store.fail_next(1);

        let err = reconciler(&store).apply(&RegistrationEvent::new(42, "v@test.com")).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn malformed_payloads_are_final() {
        let store = InMemoryVendorStore::new();
        let err = reconciler(&store).apply_payload(br#"{"email":"v@test.com"}"#).await.unwrap_err();
        assert!(matches!(err, SyncError::Malformed(MalformedEvent::MissingUserId)));
        assert!(!err.is_retryable());
    }

    /// A reconciler whose first lookups return what another instance saw
    /// before its own write landed.
    fn lagging(store: &InMemoryVendorStore, stale: Vec<Option<VendorRecord>>) -> (LaggingVendorStore, Reconciler) {
        let lagging = LaggingVendorStore::new(store.clone());
        for answer in stale {
            lagging.lag_next_lookup(answer);
        }
        let reconciler = Reconciler::new(Arc::new(lagging.clone()));
        (lagging, reconciler)
    }

    #[tokio::test]
    async fn create_that_loses_the_race_rereads_and_skips() {
        let store = InMemoryVendorStore::new();
        store.create(NewVendor::linked("42", "v@test.com")).await.unwrap();
        let (lagging, reconciler) = lagging(&store, vec![None]);

        let outcome = reconciler.apply(&RegistrationEvent::new(42, "v@test.com")).await.unwrap();

        assert_eq!(outcome, SyncOutcome::DuplicateSkipped);
        assert_eq!(lagging.calls(), ["find", "create", "find"]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn create_rejected_on_user_id_rereads_and_skips() {
        let store = InMemoryVendorStore::new();
        store.create(NewVendor::linked("42", "old@test.com")).await.unwrap();
        let (lagging, reconciler) = lagging(&store, vec![None]);

        let outcome = reconciler.apply(&RegistrationEvent::new(42, "new@test.com")).await.unwrap();

        assert_eq!(outcome, SyncOutcome::DuplicateSkipped);
        assert_eq!(lagging.calls(), ["find", "create", "find"]);
        assert_eq!(snapshot(&store), BTreeSet::from([(Some("42".to_string()), "old@test.com".to_string())]));
    }

    #[tokio::test]
    async fn link_of_an_already_linked_placeholder_rereads_and_skips() {
        let store = InMemoryVendorStore::new();
        let placeholder = store
            .create(NewVendor::placeholder("v@test.com", Some("Stall".to_string()), None))
            .await
            .unwrap();
        store.link_user(placeholder.id, "42").await.unwrap();
        let (lagging, reconciler) = lagging(&store, vec![Some(placeholder.clone())]);

        let outcome = reconciler.apply(&RegistrationEvent::new(42, "v@test.com")).await.unwrap();

        assert_eq!(outcome, SyncOutcome::DuplicateSkipped);
        assert_eq!(lagging.calls(), ["find", "link_user", "find"]);
        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, placeholder.id);
        assert_eq!(records[0].user_id.as_deref(), Some("42"));
        assert_eq!(records[0].name.as_deref(), Some("Stall"));
    }

    #[tokio::test]
    async fn link_rejected_on_user_id_leaves_the_placeholder() {
        let store = InMemoryVendorStore::new();
        let placeholder = store.create(NewVendor::placeholder("v@test.com", None, None)).await.unwrap();
        // The user got a record under another email after the lookup.
        store.create(NewVendor::linked("42", "old@test.com")).await.unwrap();
        let (lagging, reconciler) = lagging(&store, vec![Some(placeholder.clone())]);

        let outcome = reconciler.apply(&RegistrationEvent::new(42, "v@test.com")).await.unwrap();

        assert_eq!(outcome, SyncOutcome::DuplicateSkipped);
        assert_eq!(lagging.calls(), ["find", "link_user", "find"]);
        assert_eq!(store.get(placeholder.id).await.unwrap().unwrap().user_id, None);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn gives_up_as_duplicate_after_max_passes() {
        let store = InMemoryVendorStore::new();
        store.create(NewVendor::linked("42", "v@test.com")).await.unwrap();
        let (lagging, reconciler) = lagging(&store, vec![None; MAX_PASSES]);

        let outcome = reconciler.apply(&RegistrationEvent::new(42, "v@test.com")).await.unwrap();

        assert_eq!(outcome, SyncOutcome::DuplicateSkipped);
        assert_eq!(lagging.calls(), ["find", "create"].repeat(MAX_PASSES));
        assert_eq!(store.len(), 1);
    }

    /// Final store contents as `(user_id, email)` pairs.
    fn snapshot(store: &InMemoryVendorStore) -> BTreeSet<(Option<String>, String)> {
        store.records().into_iter().map(|r| (r.user_id, r.email)).collect()
    }

    async fn replay(placeholders: &[String], events: impl Iterator<Item = &RegistrationEvent>) -> InMemoryVendorStore {
        let store = InMemoryVendorStore::new();
        for email in placeholders {
            store.create(NewVendor::placeholder(email.clone(), None, None)).await.unwrap();
        }
        let reconciler = reconciler(&store);
        for event in events {
            reconciler.apply(event).await.unwrap();
        }
        store
    }

    proptest! {
        #[test]
        fn order_and_duplication_do_not_change_the_result(
            batch in registration_batch(12),
            placeholders in placeholder_emails(),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let (forward, backward) = runtime.block_on(async {
                let forward = replay(&placeholders, batch.iter()).await;
                let backward = replay(&placeholders, batch.iter().rev()).await;
                (forward, backward)
            });

            prop_assert_eq!(snapshot(&forward), snapshot(&backward));

            let users: BTreeSet<i64> = batch.iter().map(|e| e.user_id).collect();
            for user_id in &users {
                let owned: Vec<_> = forward
                    .records()
                    .into_iter()
                    .filter(|r| r.user_id.as_deref() == Some(user_id.to_string().as_str()))
                    .collect();
                prop_assert_eq!(owned.len(), 1);
                prop_assert_eq!(&owned[0].email, &format!("vendor{user_id}@test.com"));
            }

            let placeholder_only = placeholders
                .iter()
                .filter(|email| !batch.iter().any(|e| &e.email == *email))
                .count();
            prop_assert_eq!(forward.len(), users.len() + placeholder_only);
        }
    }
}
