use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::auth::role::Role;
use crate::error::ApiError;
use crate::models::Audit;
use crate::store::AppState;

const AUDIT_COLUMNS: &str = "id, status, scope, summary_protocol, summary_website, \
     summary_description, summary_cairo_ver, summary_repo, summary_initial_commit, \
     summary_final_commit, summary_docs, summary_final_report_date, \
     summary_test_suite_assesment, issues, test_compilation, test_tests, \
     created_at, updated_at";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/audit/", get(list_audits))
        .route("/audit/{id}", get(get_audit))
        .route("/audit/company/{company_id}", get(audits_by_company))
        .route("/audit/user/{user_id}", get(audits_by_user))
        .route(
            "/audit/user/{user_id}/company/{company_id}",
            get(audits_by_user_and_company),
        )
        .route("/audit/search/{name}", get(search_audits))
}

async fn list_audits(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Audit>>, ApiError> {
    auth.require_role(&[Role::Admin])?;

    let audits = sqlx::query_as::<_, Audit>(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audits ORDER BY created_at DESC"
    ))
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(audits))
}

async fn get_audit(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Audit>, ApiError> {
    auth.require_role(&[Role::Admin, Role::Auditor, Role::Client])?;

    let audit = sqlx::query_as::<_, Audit>(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audits WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("audit".into()))?;
    Ok(Json(audit))
}

async fn audits_by_company(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(company_id): Path<Uuid>,
) -> Result<Json<Vec<Audit>>, ApiError> {
    auth.require_role(&[Role::Admin, Role::Auditor, Role::Client])?;

    let audits = sqlx::query_as::<_, Audit>(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audits a \
         JOIN company_reports cr ON cr.audit_id = a.id \
         WHERE cr.company_id = ?1 ORDER BY a.created_at DESC"
    ))
    .bind(company_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(audits))
}

async fn audits_by_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Audit>>, ApiError> {
    auth.require_role(&[Role::Admin, Role::Auditor, Role::Client])?;

    let audits = sqlx::query_as::<_, Audit>(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audits a \
         JOIN user_reports ur ON ur.audit_id = a.id \
         WHERE ur.user_id = ?1 ORDER BY a.created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(audits))
}

/// Audits held by the given user that a given company also holds.
async fn audits_by_user_and_company(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((user_id, company_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<Audit>>, ApiError> {
    auth.require_role(&[Role::Admin, Role::Auditor, Role::Client])?;

    let audits = sqlx::query_as::<_, Audit>(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audits a \
         JOIN user_reports ur ON ur.audit_id = a.id \
         JOIN company_reports cr ON cr.audit_id = a.id \
         WHERE ur.user_id = ?1 AND cr.company_id = ?2 ORDER BY a.created_at DESC"
    ))
    .bind(user_id)
    .bind(company_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(audits))
}

/// Case-insensitive substring search on the protocol name.
async fn search_audits(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(name): Path<String>,
) -> Result<Json<Vec<Audit>>, ApiError> {
    auth.require_role(&[Role::Admin, Role::Auditor, Role::Client])?;

    let audits = sqlx::query_as::<_, Audit>(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audits \
         WHERE LOWER(summary_protocol) LIKE '%' || LOWER(?1) || '%' \
         ORDER BY created_at DESC"
    ))
    .bind(name)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(audits))
}
