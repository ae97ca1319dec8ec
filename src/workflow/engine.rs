//! Scope approval workflow.
//!
//! All state transitions go through here. Writes use a compare-and-set on
//! `status` so concurrent approve/reject calls on the same scope cannot both
//! succeed, and the multi-entity approval effect (scope update, audit row,
//! report registrations) commits as one transaction.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::auth::role::{CompanyRole, Role};
use crate::error::ApiError;
use crate::models::{Audit, AuditStatus, AuditSummary, AuditTest, Company, IssueBuckets, Scope};
use crate::validation;
use crate::workflow::status::ScopeStatus;

const SCOPE_COLUMNS: &str = "id, protocol, website, description, cairo_ver, repo, \
     initial_commit, docs, status, client_company_id, auditor_company_id, created_by, \
     approved_by, approval_date, rejection_reason, audit_id, created_at, updated_at";

/// Project fields submitted by a client when requesting an audit.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewScope {
    pub protocol: String,
    pub website: Option<String>,
    pub description: Option<String>,
    pub cairo_ver: Option<String>,
    pub repo: Option<String>,
    pub initial_commit: Option<String>,
    pub docs: Option<String>,
    pub auditor_company_id: Uuid,
}

impl NewScope {
    pub fn validate(&self) -> Result<(), ApiError> {
        validation::check_length("protocol", &self.protocol, 1, 100)?;
        if let Some(ref v) = self.website {
            validation::check_url("website", v)?;
        }
        if let Some(ref v) = self.description {
            validation::check_length("description", v, 0, 1000)?;
        }
        if let Some(ref v) = self.cairo_ver {
            validation::check_version("cairoVer", v)?;
        }
        if let Some(ref v) = self.repo {
            validation::check_url("repo", v)?;
        }
        if let Some(ref v) = self.initial_commit {
            validation::check_commit_hash("initialCommit", v)?;
        }
        if let Some(ref v) = self.docs {
            validation::check_url("docs", v)?;
        }
        Ok(())
    }
}

/// Create a scope in `pending` on behalf of a client user.
#[tracing::instrument(skip(pool, data), fields(user = %requester.user_id), err)]
pub async fn create_scope(
    pool: &SqlitePool,
    requester: &AuthUser,
    data: NewScope,
) -> Result<Scope, ApiError> {
    data.validate()?;

    if requester.role != Role::Client {
        return Err(ApiError::Forbidden(
            "only client users can create scopes".into(),
        ));
    }

    let company_id = requester.company_id.ok_or_else(|| {
        ApiError::Forbidden("user must belong to a client company".into())
    })?;
    let client_company = fetch_company(pool, company_id)
        .await?
        .filter(|c| c.role == CompanyRole::Client)
        .ok_or_else(|| ApiError::Forbidden("user must belong to a client company".into()))?;

    let auditor_company = fetch_company(pool, data.auditor_company_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("auditor company".into()))?;
    if auditor_company.role != CompanyRole::Auditor {
        return Err(ApiError::Forbidden(
            "target company is not an auditor company".into(),
        ));
    }

    let now = Utc::now();
    let scope = sqlx::query_as::<_, Scope>(&format!(
        "INSERT INTO scopes (id, protocol, website, description, cairo_ver, repo, \
         initial_commit, docs, status, client_company_id, auditor_company_id, created_by, \
         created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13) \
         RETURNING {SCOPE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&data.protocol)
    .bind(&data.website)
    .bind(&data.description)
    .bind(&data.cairo_ver)
    .bind(&data.repo)
    .bind(&data.initial_commit)
    .bind(&data.docs)
    .bind(ScopeStatus::Pending)
    .bind(client_company.id)
    .bind(auditor_company.id)
    .bind(requester.user_id)
    .bind(now)
    .fetch_one(pool)
    .await?;

    tracing::info!(scope_id = %scope.id, protocol = %scope.protocol, "scope created");
    Ok(scope)
}

/// Approve a pending scope and synthesize its audit.
///
/// The scope lands directly in `audit_created`; the intermediate `approved`
/// status is never durable. Exactly one of two racing approve/reject calls
/// wins the compare-and-set, the loser gets a conflict.
#[tracing::instrument(skip(pool), fields(user = %requester.user_id, %scope_id), err)]
pub async fn approve_scope(
    pool: &SqlitePool,
    requester: &AuthUser,
    scope_id: Uuid,
) -> Result<(Scope, Audit), ApiError> {
    if requester.role != Role::Auditor {
        return Err(ApiError::Forbidden(
            "only auditor users can approve scopes".into(),
        ));
    }

    let mut tx = pool.begin().await?;

    let scope = fetch_scope_tx(&mut tx, scope_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("scope".into()))?;

    if requester.company_id != Some(scope.auditor_company_id) {
        return Err(ApiError::Forbidden(
            "you can only approve scopes assigned to your company".into(),
        ));
    }
    if scope.status != ScopeStatus::Pending {
        return Err(ApiError::Conflict("scope is not pending approval".into()));
    }

    let now = Utc::now();
    let audit = audit_from_scope(&scope, now);
    insert_audit(&mut tx, &audit).await?;

    // Compare-and-set: the transition only proceeds if the scope is still
    // pending at write time.
    let updated = sqlx::query(
        "UPDATE scopes SET status = ?1, approved_by = ?2, approval_date = ?3, \
         audit_id = ?4, updated_at = ?3 \
         WHERE id = ?5 AND status = ?6",
    )
    .bind(ScopeStatus::AuditCreated)
    .bind(requester.user_id)
    .bind(now)
    .bind(audit.id)
    .bind(scope_id)
    .bind(ScopeStatus::Pending)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::Conflict("scope is not pending approval".into()));
    }

    register_report(&mut tx, &audit, &scope, requester.user_id).await?;

    let scope = fetch_scope_tx(&mut tx, scope_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("scope".into()))?;
    tx.commit().await?;

    tracing::info!(%scope_id, audit_id = %audit.id, "scope approved, audit created");
    Ok((scope, audit))
}

/// Reject a pending scope with a reason. Terminal.
#[tracing::instrument(skip(pool, reason), fields(user = %requester.user_id, %scope_id), err)]
pub async fn reject_scope(
    pool: &SqlitePool,
    requester: &AuthUser,
    scope_id: Uuid,
    reason: &str,
) -> Result<Scope, ApiError> {
    validation::check_length("rejectionReason", reason, 1, 500)?;

    if requester.role != Role::Auditor {
        return Err(ApiError::Forbidden(
            "only auditor users can reject scopes".into(),
        ));
    }

    let mut tx = pool.begin().await?;

    let scope = fetch_scope_tx(&mut tx, scope_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("scope".into()))?;

    if requester.company_id != Some(scope.auditor_company_id) {
        return Err(ApiError::Forbidden(
            "you can only reject scopes assigned to your company".into(),
        ));
    }
    if scope.status != ScopeStatus::Pending {
        return Err(ApiError::Conflict("scope is not pending approval".into()));
    }

    let now = Utc::now();
    // approved_by tracks the rejecter as well
    let updated = sqlx::query(
        "UPDATE scopes SET status = ?1, approved_by = ?2, approval_date = ?3, \
         rejection_reason = ?4, updated_at = ?3 \
         WHERE id = ?5 AND status = ?6",
    )
    .bind(ScopeStatus::Rejected)
    .bind(requester.user_id)
    .bind(now)
    .bind(reason)
    .bind(scope_id)
    .bind(ScopeStatus::Pending)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::Conflict("scope is not pending approval".into()));
    }

    let scope = fetch_scope_tx(&mut tx, scope_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("scope".into()))?;
    tx.commit().await?;

    tracing::info!(%scope_id, "scope rejected");
    Ok(scope)
}

// ---------------------------------------------------------------------------
// Read-only projections with role-based visibility
// ---------------------------------------------------------------------------

pub async fn list_scopes(pool: &SqlitePool) -> Result<Vec<Scope>, ApiError> {
    let scopes = sqlx::query_as::<_, Scope>(&format!(
        "SELECT {SCOPE_COLUMNS} FROM scopes ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(scopes)
}

/// Pending scopes. Admins see all, auditors only those assigned to their
/// company.
pub async fn pending_scopes(pool: &SqlitePool, viewer: &AuthUser) -> Result<Vec<Scope>, ApiError> {
    let scopes = match viewer.role {
        Role::Admin => {
            sqlx::query_as::<_, Scope>(&format!(
                "SELECT {SCOPE_COLUMNS} FROM scopes WHERE status = ?1 ORDER BY created_at DESC"
            ))
            .bind(ScopeStatus::Pending)
            .fetch_all(pool)
            .await?
        }
        _ => {
            sqlx::query_as::<_, Scope>(&format!(
                "SELECT {SCOPE_COLUMNS} FROM scopes \
                 WHERE status = ?1 AND auditor_company_id = ?2 ORDER BY created_at DESC"
            ))
            .bind(ScopeStatus::Pending)
            .bind(viewer.company_id)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(scopes)
}

/// Scopes where the given company is a party. Non-admin callers may only
/// query their own company.
pub async fn scopes_for_company(
    pool: &SqlitePool,
    viewer: &AuthUser,
    company_id: Uuid,
) -> Result<Vec<Scope>, ApiError> {
    if viewer.role != Role::Admin && viewer.company_id != Some(company_id) {
        return Err(ApiError::Forbidden(
            "you can only view scopes of your own company".into(),
        ));
    }

    let scopes = sqlx::query_as::<_, Scope>(&format!(
        "SELECT {SCOPE_COLUMNS} FROM scopes \
         WHERE client_company_id = ?1 OR auditor_company_id = ?1 ORDER BY created_at DESC"
    ))
    .bind(company_id)
    .fetch_all(pool)
    .await?;
    Ok(scopes)
}

/// Single scope. Returns 404 (not 403) when the viewer's company is not a
/// party, to avoid leaking existence.
pub async fn scope_by_id(
    pool: &SqlitePool,
    viewer: &AuthUser,
    scope_id: Uuid,
) -> Result<Scope, ApiError> {
    let scope = sqlx::query_as::<_, Scope>(&format!(
        "SELECT {SCOPE_COLUMNS} FROM scopes WHERE id = ?1"
    ))
    .bind(scope_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("scope".into()))?;

    let involved = viewer.company_id == Some(scope.client_company_id)
        || viewer.company_id == Some(scope.auditor_company_id);
    if viewer.role != Role::Admin && !involved {
        return Err(ApiError::NotFound("scope".into()));
    }
    Ok(scope)
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

async fn fetch_company(pool: &SqlitePool, id: Uuid) -> Result<Option<Company>, ApiError> {
    let company = sqlx::query_as::<_, Company>(
        "SELECT id, role, name, created_at, updated_at FROM companies WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(company)
}

async fn fetch_scope_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: Uuid,
) -> Result<Option<Scope>, ApiError> {
    let scope = sqlx::query_as::<_, Scope>(&format!(
        "SELECT {SCOPE_COLUMNS} FROM scopes WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(scope)
}

/// Synthesize the draft audit for a freshly approved scope.
fn audit_from_scope(scope: &Scope, now: DateTime<Utc>) -> Audit {
    Audit {
        id: Uuid::new_v4(),
        status: AuditStatus::Draft,
        scope: vec![scope.repo.clone().unwrap_or_else(|| scope.protocol.clone())],
        summary: AuditSummary {
            protocol: scope.protocol.clone(),
            website: scope.website.clone(),
            description: scope.description.clone(),
            cairo_ver: scope.cairo_ver.clone(),
            repo: scope.repo.clone(),
            initial_commit: scope.initial_commit.clone(),
            final_commit: String::new(),
            docs: scope.docs.clone(),
            final_report_date: String::new(),
            test_suite_assesment: String::new(),
        },
        issues: IssueBuckets::default(),
        test: AuditTest::default(),
        created_at: now,
        updated_at: now,
    }
}

async fn insert_audit(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    audit: &Audit,
) -> Result<(), ApiError> {
    let scope_json =
        serde_json::to_string(&audit.scope).map_err(|e| ApiError::Internal(e.into()))?;
    let issues_json =
        serde_json::to_string(&audit.issues).map_err(|e| ApiError::Internal(e.into()))?;

    sqlx::query(
        "INSERT INTO audits (id, status, scope, summary_protocol, summary_website, \
         summary_description, summary_cairo_ver, summary_repo, summary_initial_commit, \
         summary_final_commit, summary_docs, summary_final_report_date, \
         summary_test_suite_assesment, issues, test_compilation, test_tests, \
         created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)",
    )
    .bind(audit.id)
    .bind(audit.status.as_str())
    .bind(scope_json)
    .bind(&audit.summary.protocol)
    .bind(&audit.summary.website)
    .bind(&audit.summary.description)
    .bind(&audit.summary.cairo_ver)
    .bind(&audit.summary.repo)
    .bind(&audit.summary.initial_commit)
    .bind(&audit.summary.final_commit)
    .bind(&audit.summary.docs)
    .bind(&audit.summary.final_report_date)
    .bind(&audit.summary.test_suite_assesment)
    .bind(issues_json)
    .bind(&audit.test.compilation)
    .bind(&audit.test.tests)
    .bind(audit.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Register the new audit with both companies and with the users who created
/// and approved the scope.
async fn register_report(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    audit: &Audit,
    scope: &Scope,
    approver_id: Uuid,
) -> Result<(), ApiError> {
    for company_id in [scope.client_company_id, scope.auditor_company_id] {
        sqlx::query("INSERT OR IGNORE INTO company_reports (company_id, audit_id) VALUES (?1, ?2)")
            .bind(company_id)
            .bind(audit.id)
            .execute(&mut **tx)
            .await?;
    }
    for user_id in [scope.created_by, approver_id] {
        sqlx::query("INSERT OR IGNORE INTO user_reports (user_id, audit_id) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(audit.id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}
