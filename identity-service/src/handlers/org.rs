//! Organization handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    handlers::auth::MessageResponse,
    middleware::AuthUser,
    models::{OrgWithRole, Organization, Role},
    utils::ValidatedJson,
    AppState,
};

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Emptiness and the exact length bound are checked after trimming by the
/// service; this only caps raw input.
#[derive(Debug, Deserialize, Validate)]
pub struct OrgNameRequest {
    #[validate(length(max = 1024, message = "Organization name is too long"))]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrgResponse {
    pub org: Organization,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrgWithRoleResponse {
    pub org: Organization,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrgListResponse {
    pub orgs: Vec<OrgWithRole>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /v1/orgs
pub async fn list_orgs(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<OrgListResponse>, AppError> {
    let orgs = state.orgs.list(user.id).await?;
    Ok(Json(OrgListResponse { orgs }))
}

/// POST /v1/orgs
pub async fn create_org(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<OrgNameRequest>,
) -> Result<(StatusCode, Json<OrgResponse>), AppError> {
    let org = state.membership.create_org(user.id, &req.name).await?;
    Ok((StatusCode::CREATED, Json(OrgResponse { org })))
}

/// GET /v1/orgs/:org_id
pub async fn get_org(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<Json<OrgWithRoleResponse>, AppError> {
    let (org, role) = state.orgs.get(user.id, org_id).await?;
    Ok(Json(OrgWithRoleResponse { org, role }))
}

/// PATCH /v1/orgs/:org_id
pub async fn update_org(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<OrgNameRequest>,
) -> Result<Json<OrgResponse>, AppError> {
    let org = state.orgs.rename(user.id, org_id, &req.name).await?;
    Ok(Json(OrgResponse { org }))
}

/// DELETE /v1/orgs/:org_id
pub async fn delete_org(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    state.orgs.delete(user.id, org_id).await?;
    Ok(Json(MessageResponse {
        message: "Organization deleted".to_string(),
    }))
}
