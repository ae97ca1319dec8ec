use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::auth::role::Role;
use crate::auth::signature::{SignedAuth, authenticate_signed};
use crate::error::ApiError;
use crate::models::{Audit, Scope};
use crate::store::AppState;
use crate::workflow::engine::{self, NewScope};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScopeRequest {
    pub scope_data: NewScope,
    #[serde(flatten)]
    pub auth: SignedAuth,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectScopeRequest {
    pub rejection_reason: Option<String>,
    #[serde(flatten)]
    pub auth: SignedAuth,
}

#[derive(Debug, Serialize)]
pub struct ScopeResponse {
    pub scope: Scope,
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub scope: Scope,
    pub audit: Audit,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/scope/create", post(create_scope))
        .route("/scope/{scope_id}/approve", post(approve_scope))
        .route("/scope/{scope_id}/reject", post(reject_scope))
        .route("/scope/", get(list_scopes))
        .route("/scope/pending", get(pending_scopes))
        .route("/scope/company/{company_id}", get(scopes_by_company))
        .route("/scope/{scope_id}", get(get_scope))
}

// ---------------------------------------------------------------------------
// Workflow handlers (signature auth)
// ---------------------------------------------------------------------------

#[tracing::instrument(skip(state, body), err)]
async fn create_scope(
    State(state): State<AppState>,
    Json(body): Json<CreateScopeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate_signed(&state, &body.auth).await?;
    let scope = engine::create_scope(&state.pool, &user, body.scope_data).await?;
    Ok((StatusCode::CREATED, Json(ScopeResponse { scope })))
}

#[tracing::instrument(skip(state, body), fields(%scope_id), err)]
async fn approve_scope(
    State(state): State<AppState>,
    Path(scope_id): Path<Uuid>,
    Json(body): Json<SignedAuth>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let user = authenticate_signed(&state, &body).await?;
    let (scope, audit) = engine::approve_scope(&state.pool, &user, scope_id).await?;
    Ok(Json(ApprovalResponse { scope, audit }))
}

#[tracing::instrument(skip(state, body), fields(%scope_id), err)]
async fn reject_scope(
    State(state): State<AppState>,
    Path(scope_id): Path<Uuid>,
    Json(body): Json<RejectScopeRequest>,
) -> Result<Json<ScopeResponse>, ApiError> {
    let user = authenticate_signed(&state, &body.auth).await?;
    let reason = body
        .rejection_reason
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("rejectionReason is required".into()))?;
    let scope = engine::reject_scope(&state.pool, &user, scope_id, reason).await?;
    Ok(Json(ScopeResponse { scope }))
}

// ---------------------------------------------------------------------------
// Read handlers (header auth)
// ---------------------------------------------------------------------------

async fn list_scopes(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Scope>>, ApiError> {
    auth.require_role(&[Role::Admin])?;
    Ok(Json(engine::list_scopes(&state.pool).await?))
}

async fn pending_scopes(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Scope>>, ApiError> {
    auth.require_role(&[Role::Admin, Role::Auditor])?;
    Ok(Json(engine::pending_scopes(&state.pool, &auth).await?))
}

async fn scopes_by_company(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(company_id): Path<Uuid>,
) -> Result<Json<Vec<Scope>>, ApiError> {
    Ok(Json(
        engine::scopes_for_company(&state.pool, &auth, company_id).await?,
    ))
}

async fn get_scope(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(scope_id): Path<Uuid>,
) -> Result<Json<Scope>, ApiError> {
    Ok(Json(engine::scope_by_id(&state.pool, &auth, scope_id).await?))
}
