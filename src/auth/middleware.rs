use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::auth::role::Role;
use crate::error::ApiError;
use crate::store::AppState;

pub const PUBLIC_ADDRESS_HEADER: &str = "x-public-address";

/// Authenticated caller, resolved from the `x-public-address` header.
///
/// This only proves *who* the caller claims to be and what role the matching
/// user record carries; per-scope authorization (company membership) is
/// re-verified inside the workflow engine.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: String,
    pub role: Role,
    pub company_id: Option<Uuid>,
    pub public_address: String,
}

impl AuthUser {
    /// Gate an endpoint on a set of roles. Fails closed with 403.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            return Ok(());
        }
        let roles: Vec<&str> = allowed.iter().map(|r| r.as_str()).collect();
        Err(ApiError::Forbidden(format!(
            "access denied, {} role required",
            roles.join(" or ")
        )))
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let address = extract_public_address(parts).ok_or(ApiError::Unauthorized)?;
        lookup_by_address(&state.pool, &address)
            .await?
            .ok_or(ApiError::Unauthorized)
    }
}

fn extract_public_address(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(PUBLIC_ADDRESS_HEADER)?.to_str().ok()?;
    if value.is_empty() {
        return None;
    }
    Some(value.to_owned())
}

/// Resolve a public address to its user record, if any. Addresses are
/// stored lowercased, so the lookup normalizes too.
pub async fn lookup_by_address(
    pool: &SqlitePool,
    address: &str,
) -> Result<Option<AuthUser>, ApiError> {
    let address = address.to_lowercase();
    let row: Option<(Uuid, String, Role, Option<Uuid>)> = sqlx::query_as(
        "SELECT id, name, role, company_id FROM users WHERE public_address = ?1",
    )
    .bind(&address)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(user_id, name, role, company_id)| AuthUser {
        user_id,
        name,
        role,
        company_id,
        public_address: address,
    }))
}
