use std::fmt;
use std::str::FromStr;

/// Lifecycle of a scope request.
///
/// ```text
///         create()                 approve()
///  [none] --------> pending -------------------> approved --> audit_created
///                      |
///                      | reject(reason)
///                      v
///                   rejected
/// ```
///
/// `approved` is transient: approval always advances to `audit_created` in
/// the same transaction, so a persisted scope is never observed in it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ScopeStatus {
    Pending,
    Approved,
    Rejected,
    AuditCreated,
}

impl ScopeStatus {
    /// Whether the workflow can move from `self` to `next`. Transitions are
    /// forward-only; terminal states have no outgoing edges.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Approved, Self::AuditCreated)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::AuditCreated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::AuditCreated => "audit_created",
        }
    }
}

impl fmt::Display for ScopeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "audit_created" => Ok(Self::AuditCreated),
            other => anyhow::bail!("unknown scope status: {other}"),
        }
    }
}
