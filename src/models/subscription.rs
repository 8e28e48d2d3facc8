use serde::{Deserialize, Serialize};

/// A publication subscription, derived from paid payments.
/// Drives entitlement derivation for subscription-based entitlement keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub started_at: i64,
    pub ends_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Renewing,
    Expired,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Renewing => "renewing",
            Self::Expired => "expired",
            Self::Canceled => "canceled",
        }
    }

    /// States that can carry an entitlement (subject to cancel_at_period_end
    /// and ends_at checks in the synchronizer).
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Active | Self::Renewing)
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "renewing" => Ok(Self::Renewing),
            "expired" => Ok(Self::Expired),
            "canceled" => Ok(Self::Canceled),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
