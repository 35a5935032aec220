//! Vendor API endpoints.
//!
//! - GET /api/vendors/ping - Unauthenticated liveness of the API itself
//! - GET /api/vendors - List, scoped by role
//! - GET /api/vendors/me - The caller's linked record
//! - POST /api/vendors - Create a placeholder
//! - GET /api/vendors/:id - Read one record
//! - PUT /api/vendors/:id - Partial update
//! - DELETE /api/vendors/:id - Delete

use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use eventhub_auth::validation::is_valid_email;
use eventhub_auth::{Access, Claims, Operation, authorize};
use eventhub_core::store::StoreError;
use eventhub_core::vendor::{NewVendor, VendorId, VendorPage, VendorRecord, VendorUpdate};
use eventhub_web::{AppError, CurrentUser};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

const MAX_PAGE: i64 = 500;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Paging parameters for the listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Page size, 1..=500 (default 50)
    pub limit: Option<i64>,
    /// Rows to skip (default 0)
    pub offset: Option<i64>,
}

impl ListQuery {
    fn page(&self) -> VendorPage {
        let default = VendorPage::default();
        VendorPage {
            limit: self.limit.unwrap_or(default.limit).clamp(1, MAX_PAGE),
            offset: self.offset.unwrap_or(default.offset).max(0),
        }
    }
}

/// Placeholder creation request.
#[derive(Debug, Deserialize)]
pub struct CreateVendorRequest {
    /// Contact email; a later registration with this email claims the record
    pub email: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Phone number
    #[serde(default)]
    pub phone: Option<String>,
}

/// A vendor record as returned by the API.
#[derive(Debug, Serialize)]
pub struct VendorResponse {
    /// Record id
    pub id: VendorId,
    /// Linked user, `null` for placeholders
    pub user_id: Option<String>,
    /// Contact email
    pub email: String,
    /// Display name
    pub name: Option<String>,
    /// Phone number
    pub phone: Option<String>,
}

impl From<VendorRecord> for VendorResponse {
    fn from(record: VendorRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            email: record.email,
            name: record.name,
            phone: record.phone,
        }
    }
}

fn duplicate_email(err: StoreError) -> AppError {
    if err.is_unique_violation() {
        AppError::conflict("A vendor with this email already exists")
    } else {
        err.into()
    }
}

fn checked_email(email: &str) -> Result<String, AppError> {
    let email = email.trim();
    if is_valid_email(email) {
        Ok(email.to_string())
    } else {
        Err(AppError::validation("Invalid email format"))
    }
}

/// Fetch record `id` and check it is within `access` for the caller.
async fn scoped_record(
    state: &AppState,
    claims: &Claims,
    access: Access,
    id: VendorId,
) -> Result<VendorRecord, AppError> {
    let record = state
        .vendors
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Vendor", id))?;
    if !access.covers(record.user_id.as_deref(), &claims.sub) {
        return Err(AppError::forbidden("Not allowed to access this vendor"));
    }
    Ok(record)
}

// ============================================================================
// Handlers
// ============================================================================

/// `GET /api/vendors/ping`
pub async fn ping() -> Json<Value> {
    Json(json!({ "pong": true }))
}

/// List vendor records.
///
/// Roles with full access page through every record; everyone else sees at
/// most their own linked record.
///
/// # Errors
///
/// 401 without a valid token, 503 if the store is unreachable.
pub async fn list(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<VendorResponse>>, AppError> {
    let records = match authorize(claims.role, Operation::ListVendors)? {
        Access::All => state.vendors.list(query.page()).await?,
        _ => state
            .vendors
            .find_by_user_id(&claims.sub)
            .await?
            .into_iter()
            .collect(),
    };
    Ok(Json(records.into_iter().map(VendorResponse::from).collect()))
}

/// The caller's linked record.
///
/// # Errors
///
/// 404 while no record is linked to the caller (the registration may not have
/// been consumed yet).
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<VendorResponse>, AppError> {
    authorize(claims.role, Operation::ReadVendor)?;
    let record = state
        .vendors
        .find_by_user_id(&claims.sub)
        .await?
        .ok_or_else(|| AppError::not_found("Vendor for user", &claims.sub))?;
    Ok(Json(record.into()))
}

/// Create a placeholder record with no linked user.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8002/api/vendors \
///   -H "Authorization: Bearer $TOKEN" \
///   -H "Content-Type: application/json" \
///   -d '{"email": "shop@test.com", "name": "Shop"}'
/// ```
///
/// # Errors
///
/// 403 for roles that may not create, 422 on an invalid email, 409 if the
/// email is taken.
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(request): Json<CreateVendorRequest>,
) -> Result<(StatusCode, Json<VendorResponse>), AppError> {
    authorize(claims.role, Operation::CreateVendor)?;
    let email = checked_email(&request.email)?;

    let record = state
        .vendors
        .create(NewVendor::placeholder(email, request.name, request.phone))
        .await
        .map_err(duplicate_email)?;

    info!(vendor_id = record.id, email = %record.email, by = %claims.email, "Placeholder vendor created");
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// Read one record.
///
/// # Errors
///
/// 404 if missing, 403 if the record is outside the caller's scope.
pub async fn get(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(id): Path<VendorId>,
) -> Result<Json<VendorResponse>, AppError> {
    let access = authorize(claims.role, Operation::ReadVendor)?;
    let record = scoped_record(&state, &claims, access, id).await?;
    Ok(Json(record.into()))
}

/// Partially update a record.
///
/// Owners may edit their name and phone; the email is tied to their login and
/// only changes through roles with full access.
///
/// # Errors
///
/// 403 outside the caller's scope or when an owner changes the email, 422 on
/// an invalid email, 409 if the new email is taken.
pub async fn update(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(id): Path<VendorId>,
    Json(mut update): Json<VendorUpdate>,
) -> Result<Json<VendorResponse>, AppError> {
    let access = authorize(claims.role, Operation::UpdateVendor)?;
    let record = scoped_record(&state, &claims, access, id).await?;

    if let Some(email) = update.email.take() {
        let email = checked_email(&email)?;
        if access != Access::All && email != record.email {
            return Err(AppError::forbidden("Vendors cannot change their email"));
        }
        update.email = Some(email);
    }
    if update.is_empty() {
        return Ok(Json(record.into()));
    }

    let updated = state
        .vendors
        .update(id, update)
        .await
        .map_err(duplicate_email)?
        .ok_or_else(|| AppError::not_found("Vendor", id))?;
    Ok(Json(updated.into()))
}

/// Delete a record.
///
/// # Errors
///
/// 403 for roles other than admin, 404 if missing.
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(id): Path<VendorId>,
) -> Result<StatusCode, AppError> {
    authorize(claims.role, Operation::DeleteVendor)?;
    if !state.vendors.delete(id).await? {
        return Err(AppError::not_found("Vendor", id));
    }
    info!(vendor_id = id, by = %claims.email, "Vendor deleted");
    Ok(StatusCode::NO_CONTENT)
}
