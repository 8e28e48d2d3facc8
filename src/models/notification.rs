use serde::{Deserialize, Serialize};

/// A domain event that should reach the user. Upstream components call
/// `notify::notify_once` with one of these; the dispatcher handles dedupe,
/// channel fan-out, and retries.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub user_id: String,
    pub kind: NotificationKind,
    /// Explicit recipient address, overriding the one stored on the user's
    /// notification preferences. Usually None.
    pub email: Option<String>,
    pub subject: String,
    pub body: String,
    /// Stable payload subset mixed into the dedupe hash, so that e.g. two
    /// different invoices notify separately but redundant triggers for the
    /// same invoice collapse.
    pub dedupe_scope: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    InvoiceFinalized,
    PaymentFailed,
    RefundIssued,
    EntitlementRestored,
    ProfileUnpublished,
    SubscriptionExpiring,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvoiceFinalized => "invoice_finalized",
            Self::PaymentFailed => "payment_failed",
            Self::RefundIssued => "refund_issued",
            Self::EntitlementRestored => "entitlement_restored",
            Self::ProfileUnpublished => "profile_unpublished",
            Self::SubscriptionExpiring => "subscription_expiring",
        }
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoice_finalized" => Ok(Self::InvoiceFinalized),
            "payment_failed" => Ok(Self::PaymentFailed),
            "refund_issued" => Ok(Self::RefundIssued),
            "entitlement_restored" => Ok(Self::EntitlementRestored),
            "profile_unpublished" => Ok(Self::ProfileUnpublished),
            "subscription_expiring" => Ok(Self::SubscriptionExpiring),
            _ => Err(()),
        }
    }
}

/// Append-only delivery ledger row, keyed by dedupe hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageLog {
    pub id: String,
    pub dedupe_hash: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub status: MessageLogStatus,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLogStatus {
    Queued,
    Sent,
    Failed,
}

impl MessageLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for MessageLogStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

/// A deferred delivery job, consumed by the retry queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    pub id: String,
    pub log_id: String,
    pub channel: Channel,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub status: JobStatus,
    pub attempts: i64,
    pub max_attempts: i64,
    /// Next eligible delivery time.
    pub run_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Inapp,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Inapp => "inapp",
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "inapp" => Ok(Self::Inapp),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

/// Per-user channel preferences, editable through the signed-token link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPrefs {
    pub user_id: String,
    /// Delivery address for the email channel. None = in-app only, whatever
    /// the channel toggles say.
    pub email: Option<String>,
    pub email_enabled: bool,
    pub inapp_enabled: bool,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNotificationPrefs {
    pub email: Option<String>,
    pub email_enabled: Option<bool>,
    pub inapp_enabled: Option<bool>,
}
