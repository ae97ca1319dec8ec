use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::auth::role::Role;
use crate::error::ApiError;
use crate::models::Comment;
use crate::store::AppState;
use crate::validation;

const COMMENT_COLUMNS: &str =
    "id, content, author_id, author_name, audit_id, issue_id, created_at, updated_at";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub content: String,
    pub audit_id: Uuid,
    pub issue_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/comment/", get(list_comments).post(create_comment))
        .route(
            "/comment/{id}",
            axum::routing::put(update_comment).delete(delete_comment),
        )
        .route("/comment/audit/{audit_id}", get(comments_by_audit))
        .route("/comment/issue/{issue_id}", get(comments_by_issue))
        .route("/comment/author/{author_id}", get(comments_by_author))
}

/// The comment author is always the authenticated caller, never taken from
/// the request body.
#[tracing::instrument(skip(state, body), fields(user = %auth.user_id), err)]
async fn create_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::check_length("content", &body.content, 1, 1000)?;

    let audit_exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM audits WHERE id = ?1")
        .bind(body.audit_id)
        .fetch_optional(&state.pool)
        .await?;
    if audit_exists.is_none() {
        return Err(ApiError::NotFound("audit".into()));
    }

    let comment = sqlx::query_as::<_, Comment>(&format!(
        "INSERT INTO comments (id, content, author_id, author_name, audit_id, issue_id, \
         created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
         RETURNING {COMMENT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&body.content)
    .bind(auth.user_id)
    .bind(&auth.name)
    .bind(body.audit_id)
    .bind(body.issue_id)
    .bind(Utc::now())
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

#[tracing::instrument(skip(state, body), fields(user = %auth.user_id, %id), err)]
async fn update_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateCommentRequest>,
) -> Result<Json<Comment>, ApiError> {
    validation::check_length("content", &body.content, 1, 1000)?;
    require_comment_author_or_admin(&state, &auth, id).await?;

    let comment = sqlx::query_as::<_, Comment>(&format!(
        "UPDATE comments SET content = ?2, updated_at = ?3 WHERE id = ?1 \
         RETURNING {COMMENT_COLUMNS}"
    ))
    .bind(id)
    .bind(&body.content)
    .bind(Utc::now())
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(comment))
}

#[tracing::instrument(skip(state), fields(user = %auth.user_id, %id), err)]
async fn delete_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_comment_author_or_admin(&state, &auth, id).await?;

    sqlx::query("DELETE FROM comments WHERE id = ?1")
        .bind(id)
        .execute(&state.pool)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_comments(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Comment>>, ApiError> {
    auth.require_role(&[Role::Admin])?;

    let comments = sqlx::query_as::<_, Comment>(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments ORDER BY created_at ASC"
    ))
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(comments))
}

async fn comments_by_audit(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(audit_id): Path<Uuid>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    auth.require_role(&[Role::Admin, Role::Auditor, Role::Client])?;

    let comments = sqlx::query_as::<_, Comment>(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments WHERE audit_id = ?1 ORDER BY created_at ASC"
    ))
    .bind(audit_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(comments))
}

async fn comments_by_issue(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(issue_id): Path<Uuid>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    auth.require_role(&[Role::Admin, Role::Auditor, Role::Client])?;

    let comments = sqlx::query_as::<_, Comment>(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments WHERE issue_id = ?1 ORDER BY created_at ASC"
    ))
    .bind(issue_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(comments))
}

async fn comments_by_author(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(author_id): Path<Uuid>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    auth.require_role(&[Role::Admin, Role::Auditor, Role::Client])?;

    let comments = sqlx::query_as::<_, Comment>(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments WHERE author_id = ?1 ORDER BY created_at ASC"
    ))
    .bind(author_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(comments))
}

async fn require_comment_author_or_admin(
    state: &AppState,
    auth: &AuthUser,
    comment_id: Uuid,
) -> Result<(), ApiError> {
    let author: Uuid = sqlx::query_scalar("SELECT author_id FROM comments WHERE id = ?1")
        .bind(comment_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("comment".into()))?;

    if author != auth.user_id && !auth.is_admin() {
        return Err(ApiError::Forbidden(
            "only the author or an admin can modify a comment".into(),
        ));
    }
    Ok(())
}
