use serde::{Deserialize, Serialize};

/// Tracks a checkout flow from /checkout to webhook completion.
///
/// Terminal states (SUCCESS, FAILED, EXPIRED) are set only by the webhook
/// reconciler or the timeout sweep. A newer session for the same
/// (user, price) supersedes older non-terminal ones; nothing is deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub price_id: String,
    pub status: CheckoutStatus,
    /// Provider-hosted payment page the user is sent to.
    pub redirect_url: Option<String>,
    /// Where the provider sends the user back after payment.
    pub return_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Started,
    Pending,
    Success,
    Failed,
    Expired,
}

impl CheckoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

impl std::str::FromStr for CheckoutStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
