use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::auth::role::{CompanyRole, Role};
use crate::workflow::status::ScopeStatus;

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub role: Role,
    pub public_address: String,
    pub name: String,
    pub company_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: Uuid,
    pub role: CompanyRole,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Scope — the workflow subject
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub id: Uuid,
    pub protocol: String,
    pub website: Option<String>,
    pub description: Option<String>,
    pub cairo_ver: Option<String>,
    pub repo: Option<String>,
    pub initial_commit: Option<String>,
    pub docs: Option<String>,
    pub status: ScopeStatus,
    pub client_company_id: Uuid,
    pub auditor_company_id: Uuid,
    pub created_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub approval_date: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub audit_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Audit — the deliverable report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditStatus {
    Draft,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl AuditStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Draft" => Ok(Self::Draft),
            "In Progress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            other => anyhow::bail!("unknown audit status: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueStatus {
    Open,
    Fixed,
    Acknowledged,
}

/// One audit finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub title: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub recommendation: String,
    pub status: IssueStatus,
    #[serde(default)]
    pub client_update: String,
    #[serde(default)]
    pub code: String,
}

/// Findings grouped by severity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueBuckets {
    #[serde(default)]
    pub critical: Vec<Issue>,
    #[serde(default)]
    pub high: Vec<Issue>,
    #[serde(default)]
    pub medium: Vec<Issue>,
    #[serde(default)]
    pub low: Vec<Issue>,
    #[serde(default)]
    pub info: Vec<Issue>,
    #[serde(default)]
    pub best_practices: Vec<Issue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub protocol: String,
    pub website: Option<String>,
    pub description: Option<String>,
    pub cairo_ver: Option<String>,
    pub repo: Option<String>,
    pub initial_commit: Option<String>,
    #[serde(default)]
    pub final_commit: String,
    pub docs: Option<String>,
    #[serde(default)]
    pub final_report_date: String,
    #[serde(default)]
    pub test_suite_assesment: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTest {
    #[serde(default)]
    pub compilation: String,
    #[serde(default)]
    pub tests: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    pub id: Uuid,
    pub status: AuditStatus,
    /// Audited artifacts, usually the repository URL or protocol name.
    pub scope: Vec<String>,
    pub summary: AuditSummary,
    pub issues: IssueBuckets,
    pub test: AuditTest,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn decode_err(column: &str, source: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.into(),
        source: Box::new(source),
    }
}

impl sqlx::FromRow<'_, SqliteRow> for Audit {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<AuditStatus>()
            .map_err(|e| decode_err("status", std::io::Error::other(e.to_string())))?;

        let scope: String = row.try_get("scope")?;
        let scope: Vec<String> =
            serde_json::from_str(&scope).map_err(|e| decode_err("scope", e))?;

        let issues: String = row.try_get("issues")?;
        let issues: IssueBuckets =
            serde_json::from_str(&issues).map_err(|e| decode_err("issues", e))?;

        Ok(Self {
            id: row.try_get("id")?,
            status,
            scope,
            summary: AuditSummary {
                protocol: row.try_get("summary_protocol")?,
                website: row.try_get("summary_website")?,
                description: row.try_get("summary_description")?,
                cairo_ver: row.try_get("summary_cairo_ver")?,
                repo: row.try_get("summary_repo")?,
                initial_commit: row.try_get("summary_initial_commit")?,
                final_commit: row.try_get("summary_final_commit")?,
                docs: row.try_get("summary_docs")?,
                final_report_date: row.try_get("summary_final_report_date")?,
                test_suite_assesment: row.try_get("summary_test_suite_assesment")?,
            },
            issues,
            test: AuditTest {
                compilation: row.try_get("test_compilation")?,
                tests: row.try_get("test_tests")?,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Comment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CommentAuthor {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub content: String,
    pub author: CommentAuthor,
    pub audit_id: Uuid,
    pub issue_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, SqliteRow> for Comment {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            content: row.try_get("content")?,
            author: CommentAuthor {
                id: row.try_get("author_id")?,
                name: row.try_get("author_name")?,
            },
            audit_id: row.try_get("audit_id")?,
            issue_id: row.try_get("issue_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
