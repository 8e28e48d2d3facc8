//! Prefixed ID generation for castbill entities.
//!
//! All IDs use a `cb_` brand prefix to guarantee collision avoidance with
//! payment provider references (VNPay transaction refs, MoMo order IDs, etc.).
//!
//! Format: `cb_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &[
    "cb_sess_",
    "cb_pay_",
    "cb_inv_",
    "cb_sub_",
    "cb_price_",
    "cb_msg_",
    "cb_job_",
    "cb_note_",
    "cb_aud_",
];

/// Validate that a string is a valid castbill prefixed ID.
///
/// Cheap format check to reject garbage before hitting the database.
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs in castbill.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    CheckoutSession,
    Payment,
    Invoice,
    Subscription,
    Price,
    MessageLog,
    NotificationJob,
    InappNotification,
    AuditEvent,
}

impl EntityType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::CheckoutSession => "cb_sess",
            Self::Payment => "cb_pay",
            Self::Invoice => "cb_inv",
            Self::Subscription => "cb_sub",
            Self::Price => "cb_price",
            Self::MessageLog => "cb_msg",
            Self::NotificationJob => "cb_job",
            Self::InappNotification => "cb_note",
            Self::AuditEvent => "cb_aud",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format() {
        let id = EntityType::Payment.gen_id();
        assert!(id.starts_with("cb_pay_"));
        // cb_pay_ (7 chars) + 32 hex chars
        assert_eq!(id.len(), 39);
    }

    #[test]
    fn test_ids_are_unique() {
        let id1 = EntityType::Invoice.gen_id();
        let id2 = EntityType::Invoice.gen_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_is_valid_prefixed_id() {
        assert!(is_valid_prefixed_id("cb_pay_a1b2c3d4e5f6789012345678901234ab"));
        assert!(is_valid_prefixed_id(&EntityType::CheckoutSession.gen_id()));
        assert!(is_valid_prefixed_id(&EntityType::NotificationJob.gen_id()));

        assert!(!is_valid_prefixed_id(""));
        assert!(!is_valid_prefixed_id("a1b2c3d4-e5f6-7890-1234-567890123456"));
        assert!(!is_valid_prefixed_id("cb_unknown_a1b2c3d4e5f6789012345678901234ab"));
        assert!(!is_valid_prefixed_id("cb_pay_a1b2"));
        assert!(!is_valid_prefixed_id("pay_a1b2c3d4e5f6789012345678901234ab"));
    }
}
