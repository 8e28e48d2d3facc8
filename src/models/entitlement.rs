use serde::{Deserialize, Serialize};

/// Entitlement key for the right to keep a casting profile published.
pub const CAN_PUBLISH_PROFILE: &str = "can_publish_profile";

/// A (user, key) entitlement row. Recomputed, not appended: each sync
/// creates, extends, or marks-expired exactly one row per key. No hard
/// deletes, so "has it ever held this entitlement" stays queryable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entitlement {
    pub user_id: String,
    pub key: String,
    /// None = never expires. Revocation sets this to "now".
    pub expires_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Entitlement {
    pub fn holds_at(&self, now: i64) -> bool {
        match self.expires_at {
            None => true,
            Some(exp) => exp > now,
        }
    }
}

/// Direction of an entitlement change, emitted by the synchronizer and
/// consumed by cascading enforcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementDelta {
    pub key: String,
    pub change: EntitlementChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementChange {
    BecameEligible,
    BecameIneligible,
    Unchanged,
}
