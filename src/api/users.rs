use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::auth::role::{CompanyRole, Role};
use crate::auth::signature::SignedAuth;
use crate::error::ApiError;
use crate::models::User;
use crate::store::AppState;
use crate::validation;

const USER_COLUMNS: &str = "id, role, public_address, name, company_id, created_at, updated_at";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub role: Role,
    pub name: String,
    pub public_address: String,
    pub company_id: Option<Uuid>,
    #[serde(flatten)]
    pub auth: SignedAuth,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListUsersParams {
    pub role: Option<Role>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/", get(list_users).post(register_user))
        .route(
            "/user/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/user/address/{public_address}", get(user_by_address))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Self-registration. The caller does not exist yet, so the signature is
/// checked directly against the claimed address instead of resolving an
/// existing user.
#[tracing::instrument(skip(state, body), err)]
async fn register_user(
    State(state): State<AppState>,
    Json(body): Json<RegisterUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.role == Role::Admin {
        return Err(ApiError::Forbidden(
            "admin accounts cannot be self-registered".into(),
        ));
    }
    validation::check_name(&body.name)?;
    validation::check_public_address(&body.public_address)?;

    let (Some(signature), Some(message_hash)) = (
        body.auth.signed_message.as_deref(),
        body.auth.sign_data.as_deref(),
    ) else {
        return Err(ApiError::Unauthorized);
    };
    // The claimed `publicAddress` doubles as the signing account and is
    // consumed by the outer field, so the flattened auth only carries an
    // address through the legacy `account` alias. When present it must
    // agree with the claim.
    if let Some(account) = body.auth.public_address.as_deref() {
        if !account.eq_ignore_ascii_case(&body.public_address) {
            return Err(ApiError::Unauthorized);
        }
    }
    let valid = state
        .verifier
        .verify(&body.public_address, message_hash, signature)
        .await
        .map_err(ApiError::Internal)?;
    if !valid {
        return Err(ApiError::Unauthorized);
    }

    let company_id = match body.company_id {
        Some(company_id) => {
            let company_role: Option<CompanyRole> =
                sqlx::query_scalar("SELECT role FROM companies WHERE id = ?1")
                    .bind(company_id)
                    .fetch_optional(&state.pool)
                    .await?;
            let Some(company_role) = company_role else {
                return Err(ApiError::BadRequest("company does not exist".into()));
            };
            // Client companies hold client users, auditor companies auditors.
            if company_role.as_str() != body.role.as_str() {
                return Err(ApiError::BadRequest(
                    "user role does not match the company role".into(),
                ));
            }
            Some(company_id)
        }
        None => None,
    };

    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (id, role, public_address, name, company_id, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) RETURNING {USER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(body.role)
    .bind(body.public_address.to_lowercase())
    .bind(&body.name)
    .bind(company_id)
    .bind(Utc::now())
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(user = %user.id, role = %user.role, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

#[tracing::instrument(skip(state, body), fields(user = %auth.user_id, %id), err)]
async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    if auth.user_id != id && !auth.is_admin() {
        return Err(ApiError::Forbidden(
            "users can only update their own profile".into(),
        ));
    }
    if let Some(ref name) = body.name {
        validation::check_name(name)?;
    }

    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET name = COALESCE(?2, name), updated_at = ?3 \
         WHERE id = ?1 RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(&body.name)
    .bind(Utc::now())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("user".into()))?;

    Ok(Json(user))
}

#[tracing::instrument(skip(state), fields(user = %auth.user_id, %id), err)]
async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    auth.require_role(&[Role::Admin])?;

    let mut tx = state.pool.begin().await?;
    sqlx::query("DELETE FROM company_managers WHERE user_id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM user_reports WHERE user_id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM users WHERE id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound("user".into()));
    }
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<ListUsersParams>,
) -> Result<Json<Vec<User>>, ApiError> {
    auth.require_role(&[Role::Admin])?;

    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE ?1 IS NULL OR role = ?1 ORDER BY name ASC"
    ))
    .bind(params.role)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(users))
}

async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    auth.require_role(&[Role::Admin, Role::Auditor, Role::Client])?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("user".into()))?;
    Ok(Json(user))
}

/// Unauthenticated on purpose: a wallet needs to find out whether it is
/// registered before it can authenticate.
async fn user_by_address(
    State(state): State<AppState>,
    Path(public_address): Path<String>,
) -> Result<Json<User>, ApiError> {
    validation::check_public_address(&public_address)?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE public_address = ?1"
    ))
    .bind(public_address.to_lowercase())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("user".into()))?;
    Ok(Json(user))
}
