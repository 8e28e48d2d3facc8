use serde::{Deserialize, Serialize};

/// Audit trail for enforcement actions (auto publish/unpublish) and
/// admin-triggered refunds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub user_id: String,
    pub action: AuditAction,
    /// JSON details (reason, entitlement key, amounts).
    pub details: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AutoUnpublish,
    AutoPublish,
    RefundIssued,
    SessionExpired,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoUnpublish => "auto_unpublish",
            Self::AutoPublish => "auto_publish",
            Self::RefundIssued => "refund_issued",
            Self::SessionExpired => "session_expired",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto_unpublish" => Ok(Self::AutoUnpublish),
            "auto_publish" => Ok(Self::AutoPublish),
            "refund_issued" => Ok(Self::RefundIssued),
            "session_expired" => Ok(Self::SessionExpired),
            _ => Err(()),
        }
    }
}
