//! Dead-letter administration.
//!
//! - GET /api/admin/dead-letters?status=pending&limit=100
//! - POST /api/admin/dead-letters/:id/replay
//! - POST /api/admin/dead-letters/:id/discard
//!
//! Admin only. A replay runs the parked payload through the same
//! reconciliation the consumer uses, so it is safe to replay an event whose
//! effect has meanwhile been applied by a redelivery.

use crate::server::state::AppState;
use crate::sync::{SyncError, SyncOutcome};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use eventhub_auth::{Operation, authorize};
use eventhub_core::dead_letter::{DLQStatus, FailedEvent};
use eventhub_runtime::metrics::DeadLetterMetrics;
use eventhub_web::{AppError, CurrentUser};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const MAX_LIMIT: usize = 1000;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Listing filter.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// `pending` (default), `processing`, `resolved` or `discarded`
    pub status: Option<String>,
    /// Maximum entries (default 100)
    pub limit: Option<usize>,
}

/// Discard request.
#[derive(Debug, Deserialize)]
pub struct DiscardRequest {
    /// Why the message is being dropped
    pub reason: String,
}

/// A parked message as returned by the API.
#[derive(Debug, Serialize)]
pub struct DeadLetterResponse {
    /// Entry id
    pub id: i64,
    /// Source topic
    pub topic: String,
    /// Source partition
    pub partition: i32,
    /// Source offset
    pub offset: i64,
    /// Event type of the envelope
    pub event_type: String,
    /// Message body, when it is UTF-8
    pub payload: Option<String>,
    /// Last error
    pub error_message: String,
    /// Debug rendering of the last error
    pub error_details: Option<String>,
    /// Retries spent before parking
    pub retry_count: i32,
    /// When the message was first parked
    pub first_failed_at: DateTime<Utc>,
    /// Last status change
    pub last_failed_at: DateTime<Utc>,
    /// Current status
    pub status: &'static str,
    /// When the entry was resolved or discarded
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who resolved or discarded it
    pub resolved_by: Option<String>,
    /// Resolution notes or discard reason
    pub resolution_notes: Option<String>,
}

impl From<FailedEvent> for DeadLetterResponse {
    fn from(entry: FailedEvent) -> Self {
        Self {
            id: entry.id,
            payload: entry.event.payload_str().map(ToString::to_string),
            event_type: entry.event.event_type,
            topic: entry.topic,
            partition: entry.partition,
            offset: entry.offset,
            error_message: entry.error_message,
            error_details: entry.error_details,
            retry_count: entry.retry_count,
            first_failed_at: entry.first_failed_at,
            last_failed_at: entry.last_failed_at,
            status: entry.status.as_str(),
            resolved_at: entry.resolved_at,
            resolved_by: entry.resolved_by,
            resolution_notes: entry.resolution_notes,
        }
    }
}

/// Result of a successful replay.
#[derive(Debug, Serialize)]
pub struct ReplayResponse {
    /// Entry id
    pub id: i64,
    /// Always `resolved`
    pub status: &'static str,
    /// What the reconciliation did
    pub outcome: SyncOutcome,
}

fn closed(entry: &FailedEvent) -> Option<AppError> {
    matches!(entry.status, DLQStatus::Resolved | DLQStatus::Discarded).then(|| {
        AppError::conflict(format!(
            "Dead letter {} is already {}",
            entry.id,
            entry.status.as_str()
        ))
    })
}

async fn load(state: &AppState, id: i64) -> Result<FailedEvent, AppError> {
    state
        .dead_letters
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Dead letter", id))
}

// ============================================================================
// Handlers
// ============================================================================

/// List parked messages with a given status, oldest first.
///
/// # Errors
///
/// 403 for non-admins, 422 on an unknown status.
pub async fn list(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DeadLetterResponse>>, AppError> {
    authorize(claims.role, Operation::ManageDeadLetters)?;

    let status = match query.status.as_deref() {
        None => DLQStatus::Pending,
        Some(raw) => DLQStatus::parse(raw)
            .map_err(|_| AppError::validation(format!("Unknown dead letter status: {raw}")))?,
    };
    let limit = query.limit.unwrap_or(100).clamp(1, MAX_LIMIT);

    let entries = state.dead_letters.list_by_status(status, limit).await?;
    Ok(Json(entries.into_iter().map(DeadLetterResponse::from).collect()))
}

/// Run a parked message through reconciliation again.
///
/// On success the entry is resolved. A payload that turns out to be
/// malformed is discarded; a store failure puts the entry back to pending.
///
/// # Errors
///
/// 403 for non-admins, 404 if missing, 409 if already resolved or
/// discarded, 422 if the payload is malformed, 503 if the vendor store is
/// unreachable.
pub async fn replay(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<ReplayResponse>, AppError> {
    authorize(claims.role, Operation::ManageDeadLetters)?;
    let entry = load(&state, id).await?;
    if let Some(conflict) = closed(&entry) {
        return Err(conflict);
    }

    state.dead_letters.update_status(id, DLQStatus::Processing).await?;

    match state.reconciler.apply_payload(&entry.event.data).await {
        Ok(outcome) => {
            let notes = format!("replayed: {outcome}");
            state.dead_letters.mark_resolved(id, &claims.email, Some(notes.as_str())).await?;
            DeadLetterMetrics::record_resolved();
            info!(dead_letter_id = id, outcome = %outcome, by = %claims.email, "Dead letter replayed");
            Ok(Json(ReplayResponse {
                id,
                status: DLQStatus::Resolved.as_str(),
                outcome,
            }))
        }
        Err(SyncError::Malformed(e)) => {
            let reason = format!("malformed payload: {e}");
            state.dead_letters.mark_discarded(id, &claims.email, &reason).await?;
            DeadLetterMetrics::record_discarded();
            warn!(dead_letter_id = id, error = %e, "Replayed dead letter is malformed, discarded");
            Err(AppError::validation(reason))
        }
        Err(SyncError::Store(e)) => {
            if let Err(reset) = state.dead_letters.update_status(id, DLQStatus::Pending).await {
                warn!(dead_letter_id = id, error = %reset, "Could not return dead letter to pending");
            }
            warn!(dead_letter_id = id, error = %e, "Replay failed");
            Err(e.into())
        }
    }
}

/// Drop a parked message for good.
///
/// # Errors
///
/// 403 for non-admins, 404 if missing, 409 if already resolved or
/// discarded, 422 on an empty reason.
pub async fn discard(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<DiscardRequest>,
) -> Result<Json<DeadLetterResponse>, AppError> {
    authorize(claims.role, Operation::ManageDeadLetters)?;
    let reason = request.reason.trim();
    if reason.is_empty() {
        return Err(AppError::validation("A discard reason is required"));
    }

    let entry = load(&state, id).await?;
    if let Some(conflict) = closed(&entry) {
        return Err(conflict);
    }

    state.dead_letters.mark_discarded(id, &claims.email, reason).await?;
    DeadLetterMetrics::record_discarded();
    info!(dead_letter_id = id, by = %claims.email, reason, "Dead letter discarded");

    Ok(Json(load(&state, id).await?.into()))
}
