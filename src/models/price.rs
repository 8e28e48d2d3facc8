use serde::{Deserialize, Serialize};

/// A purchasable price. Prices are configured out-of-band (admin tooling);
/// the billing core only reads them.
///
/// Amounts are whole đồng - VND has no minor unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    pub id: String,
    /// Entitlement key granted by a paid subscription on this price
    /// (e.g., "can_publish_profile").
    pub entitlement_key: String,
    /// Plan identifier for the derived subscription.
    pub plan_id: String,
    pub amount: i64,
    /// ISO 4217, lowercase. Only "vnd" is settleable.
    pub currency: String,
    /// Subscription period granted per payment.
    pub period_days: i64,
    pub active: bool,
    pub created_at: i64,
}

/// The single settlement currency.
pub const SETTLEMENT_CURRENCY: &str = "vnd";

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePrice {
    pub entitlement_key: String,
    pub plan_id: String,
    pub amount: i64,
    pub currency: String,
    pub period_days: i64,
    pub active: bool,
}
