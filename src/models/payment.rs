use serde::{Deserialize, Serialize};

/// A payment in the ledger. Never deleted, only transitioned.
///
/// (provider, provider_ref) is the natural idempotency key for webhook
/// application - redelivered callbacks find the row already terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    /// Null for admin-issued refunds that have no checkout flow.
    pub checkout_session_id: Option<String>,
    pub provider: String,
    /// External reference assigned by the provider, unique per provider.
    pub provider_ref: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
    RefundedPartial,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::RefundedPartial => "refunded_partial",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            "refunded_partial" => Ok(Self::RefundedPartial),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
