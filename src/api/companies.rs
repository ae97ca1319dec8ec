use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::auth::role::{CompanyRole, Role};
use crate::error::ApiError;
use crate::models::{Company, User};
use crate::store::AppState;
use crate::validation;
use crate::workflow::ScopeStatus;

const COMPANY_COLUMNS: &str = "id, role, name, created_at, updated_at";
const USER_COLUMNS: &str = "id, role, public_address, name, company_id, created_at, updated_at";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateCompanyRequest {
    pub role: CompanyRole,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListCompaniesParams {
    pub role: Option<CompanyRole>,
}

/// Company with its membership and report relations resolved.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyResponse {
    #[serde(flatten)]
    pub company: Company,
    pub manager_ids: Vec<Uuid>,
    pub member_ids: Vec<Uuid>,
    pub report_ids: Vec<Uuid>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/company/", get(list_companies).post(create_company))
        .route(
            "/company/{id}",
            get(get_company)
                .patch(update_company)
                .delete(delete_company),
        )
        .route("/company/{id}/users", get(company_users).post(assign_user))
        .route(
            "/company/{id}/users/{user_id}",
            axum::routing::delete(remove_user),
        )
        .route(
            "/company/{id}/managers",
            get(company_managers).post(assign_manager),
        )
        .route(
            "/company/{id}/managers/{user_id}",
            axum::routing::delete(remove_manager),
        )
        .route("/company/user/{user_id}", get(company_by_user))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[tracing::instrument(skip(state, body), fields(user = %auth.user_id), err)]
async fn create_company(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateCompanyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(&[Role::Admin])?;
    validation::check_name(&body.name)?;

    let company = sqlx::query_as::<_, Company>(&format!(
        "INSERT INTO companies (id, role, name, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?4) RETURNING {COMPANY_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(body.role)
    .bind(&body.name)
    .bind(Utc::now())
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(company)))
}

#[tracing::instrument(skip(state, body), fields(user = %auth.user_id, %id), err)]
async fn update_company(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateCompanyRequest>,
) -> Result<Json<Company>, ApiError> {
    if let Some(ref name) = body.name {
        validation::check_name(name)?;
    }
    require_company_admin(&state, &auth, id).await?;

    let company = sqlx::query_as::<_, Company>(&format!(
        "UPDATE companies SET name = COALESCE(?2, name), updated_at = ?3 \
         WHERE id = ?1 RETURNING {COMPANY_COLUMNS}"
    ))
    .bind(id)
    .bind(&body.name)
    .bind(Utc::now())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("company".into()))?;

    Ok(Json(company))
}

/// A company is never deleted while it is a party to a pending scope, and a
/// company with audit history stays for the record.
#[tracing::instrument(skip(state), fields(user = %auth.user_id, %id), err)]
async fn delete_company(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    auth.require_role(&[Role::Admin])?;

    let mut tx = state.pool.begin().await?;

    let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM companies WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(ApiError::NotFound("company".into()));
    }

    let pending: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM scopes \
         WHERE (client_company_id = ?1 OR auditor_company_id = ?1) AND status = ?2",
    )
    .bind(id)
    .bind(ScopeStatus::Pending)
    .fetch_one(&mut *tx)
    .await?;
    if pending > 0 {
        return Err(ApiError::Conflict(
            "company is a party to pending scopes".into(),
        ));
    }

    let history: i64 = sqlx::query_scalar(
        "SELECT (SELECT COUNT(*) FROM scopes WHERE client_company_id = ?1 OR auditor_company_id = ?1) \
         + (SELECT COUNT(*) FROM company_reports WHERE company_id = ?1)",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    if history > 0 {
        return Err(ApiError::Conflict(
            "company has audit history and cannot be deleted".into(),
        ));
    }

    sqlx::query("DELETE FROM company_managers WHERE company_id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE users SET company_id = NULL WHERE company_id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM companies WHERE id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state, body), fields(user = %auth.user_id, company = %id), err)]
async fn assign_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<MembershipRequest>,
) -> Result<Json<User>, ApiError> {
    require_company_admin(&state, &auth, id).await?;

    let user = fetch_user(&state, body.user_id).await?;
    if user.role == Role::Admin {
        return Err(ApiError::BadRequest(
            "admin users do not belong to companies".into(),
        ));
    }
    // Client companies hold client users, auditor companies auditors.
    let company_role: CompanyRole =
        sqlx::query_scalar("SELECT role FROM companies WHERE id = ?1")
            .bind(id)
            .fetch_optional(&state.pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("company".into()))?;
    if company_role.as_str() != user.role.as_str() {
        return Err(ApiError::BadRequest(
            "user role does not match the company role".into(),
        ));
    }
    match user.company_id {
        Some(existing) if existing == id => {
            return Err(ApiError::Conflict("user already in company".into()));
        }
        Some(_) => {
            return Err(ApiError::Conflict(
                "user already belongs to another company".into(),
            ));
        }
        None => {}
    }

    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET company_id = ?2, updated_at = ?3 WHERE id = ?1 \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(body.user_id)
    .bind(id)
    .bind(Utc::now())
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(user))
}

#[tracing::instrument(skip(state), fields(user = %auth.user_id, company = %id), err)]
async fn remove_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    require_company_admin(&state, &auth, id).await?;

    let user = fetch_user(&state, user_id).await?;
    if user.company_id != Some(id) {
        return Err(ApiError::NotFound("company member".into()));
    }

    let mut tx = state.pool.begin().await?;
    sqlx::query("DELETE FROM company_managers WHERE company_id = ?1 AND user_id = ?2")
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE users SET company_id = NULL, updated_at = ?2 WHERE id = ?1")
        .bind(user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state, body), fields(user = %auth.user_id, company = %id), err)]
async fn assign_manager(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<MembershipRequest>,
) -> Result<StatusCode, ApiError> {
    require_company_admin(&state, &auth, id).await?;

    // Managers must already be members.
    let user = fetch_user(&state, body.user_id).await?;
    if user.company_id != Some(id) {
        return Err(ApiError::BadRequest(
            "user must be a company member before becoming a manager".into(),
        ));
    }

    let inserted =
        sqlx::query("INSERT OR IGNORE INTO company_managers (company_id, user_id) VALUES (?1, ?2)")
            .bind(id)
            .bind(body.user_id)
            .execute(&state.pool)
            .await?;
    if inserted.rows_affected() == 0 {
        return Err(ApiError::Conflict("user is already a manager".into()));
    }

    Ok(StatusCode::CREATED)
}

#[tracing::instrument(skip(state), fields(user = %auth.user_id, company = %id), err)]
async fn remove_manager(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    require_company_admin(&state, &auth, id).await?;

    let deleted = sqlx::query("DELETE FROM company_managers WHERE company_id = ?1 AND user_id = ?2")
        .bind(id)
        .bind(user_id)
        .execute(&state.pool)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound("company manager".into()));
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn list_companies(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<ListCompaniesParams>,
) -> Result<Json<Vec<Company>>, ApiError> {
    auth.require_role(&[Role::Admin, Role::Auditor, Role::Client])?;

    let companies = sqlx::query_as::<_, Company>(&format!(
        "SELECT {COMPANY_COLUMNS} FROM companies \
         WHERE ?1 IS NULL OR role = ?1 ORDER BY name ASC"
    ))
    .bind(params.role)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(companies))
}

async fn get_company(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CompanyResponse>, ApiError> {
    auth.require_role(&[Role::Admin, Role::Auditor, Role::Client])?;
    Ok(Json(load_company(&state, id).await?))
}

async fn company_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<User>>, ApiError> {
    auth.require_role(&[Role::Admin, Role::Auditor, Role::Client])?;

    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE company_id = ?1 ORDER BY name ASC"
    ))
    .bind(id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(users))
}

async fn company_managers(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<User>>, ApiError> {
    auth.require_role(&[Role::Admin, Role::Auditor, Role::Client])?;

    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users u \
         JOIN company_managers cm ON cm.user_id = u.id \
         WHERE cm.company_id = ?1 ORDER BY u.name ASC"
    ))
    .bind(id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(users))
}

async fn company_by_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<CompanyResponse>, ApiError> {
    auth.require_role(&[Role::Admin, Role::Auditor, Role::Client])?;

    let user = fetch_user(&state, user_id).await?;
    let company_id = user
        .company_id
        .ok_or_else(|| ApiError::NotFound("company".into()))?;
    Ok(Json(load_company(&state, company_id).await?))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Company administration requires the admin role or a manager seat in this
/// company.
async fn require_company_admin(
    state: &AppState,
    auth: &AuthUser,
    company_id: Uuid,
) -> Result<(), ApiError> {
    if auth.is_admin() {
        return Ok(());
    }
    let is_manager: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM company_managers WHERE company_id = ?1 AND user_id = ?2",
    )
    .bind(company_id)
    .bind(auth.user_id)
    .fetch_one(&state.pool)
    .await?;

    if is_manager == 0 {
        return Err(ApiError::Forbidden(
            "only a company manager or an admin can manage this company".into(),
        ));
    }
    Ok(())
}

async fn fetch_user(state: &AppState, id: Uuid) -> Result<User, ApiError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("user".into()))?;
    Ok(user)
}

async fn load_company(state: &AppState, id: Uuid) -> Result<CompanyResponse, ApiError> {
    let company = sqlx::query_as::<_, Company>(&format!(
        "SELECT {COMPANY_COLUMNS} FROM companies WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("company".into()))?;

    let manager_ids: Vec<(Uuid,)> =
        sqlx::query_as("SELECT user_id FROM company_managers WHERE company_id = ?1")
            .bind(id)
            .fetch_all(&state.pool)
            .await?;
    let member_ids: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE company_id = ?1")
        .bind(id)
        .fetch_all(&state.pool)
        .await?;
    let report_ids: Vec<(Uuid,)> =
        sqlx::query_as("SELECT audit_id FROM company_reports WHERE company_id = ?1")
            .bind(id)
            .fetch_all(&state.pool)
            .await?;

    Ok(CompanyResponse {
        company,
        manager_ids: manager_ids.into_iter().map(|r| r.0).collect(),
        member_ids: member_ids.into_iter().map(|r| r.0).collect(),
        report_ids: report_ids.into_iter().map(|r| r.0).collect(),
    })
}
