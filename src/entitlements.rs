//! Entitlement synchronizer.
//!
//! Recomputes a user's entitlements from ledger facts (their subscriptions)
//! and reports which keys changed direction. Derivation is a pure function
//! of current state, so the sync is idempotent: running it twice in a row
//! yields `Unchanged` the second time.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{
    EntitlementChange, EntitlementDelta, Subscription, CAN_PUBLISH_PROFILE,
};

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Until when the subscriptions carry `can_publish_profile`, if at all.
/// The furthest paid-through date among live, non-canceling subscriptions.
fn publish_eligibility(subs: &[Subscription], now: i64) -> Option<i64> {
    subs.iter()
        .filter(|s| s.status.is_live() && !s.cancel_at_period_end && s.ends_at > now)
        .map(|s| s.ends_at)
        .max()
}

/// Recompute all entitlement keys for one user and persist the result.
///
/// Grants and extensions write the new expiry; revocations write
/// `expires_at = now` rather than deleting, so history stays queryable.
/// A user who never held a key and still does not qualify gets no row.
pub fn sync_user(conn: &Connection, user_id: &str) -> Result<Vec<EntitlementDelta>> {
    let ts = now();
    let subs = queries::get_subscriptions_for_user(conn, user_id)?;

    let mut deltas = Vec::new();

    let existing = queries::get_entitlement(conn, user_id, CAN_PUBLISH_PROFILE)?;
    let held_before = existing.as_ref().map(|e| e.holds_at(ts)).unwrap_or(false);

    let change = match publish_eligibility(&subs, ts) {
        Some(expires_at) => {
            queries::upsert_entitlement(conn, user_id, CAN_PUBLISH_PROFILE, Some(expires_at))?;
            if held_before {
                EntitlementChange::Unchanged
            } else {
                EntitlementChange::BecameEligible
            }
        }
        None => {
            if held_before {
                queries::upsert_entitlement(conn, user_id, CAN_PUBLISH_PROFILE, Some(ts))?;
                EntitlementChange::BecameIneligible
            } else {
                EntitlementChange::Unchanged
            }
        }
    };

    if change != EntitlementChange::Unchanged {
        tracing::info!(user_id, key = CAN_PUBLISH_PROFILE, ?change, "Entitlement changed");
    }

    deltas.push(EntitlementDelta {
        key: CAN_PUBLISH_PROFILE.to_string(),
        change,
    });

    Ok(deltas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubscriptionStatus;

    fn sub(status: SubscriptionStatus, cancel: bool, ends_at: i64) -> Subscription {
        Subscription {
            id: "cb_sub_t".to_string(),
            user_id: "user_1".to_string(),
            plan_id: "profile_publication".to_string(),
            status,
            cancel_at_period_end: cancel,
            started_at: 0,
            ends_at,
        }
    }

    #[test]
    fn live_subscription_grants() {
        let subs = [sub(SubscriptionStatus::Active, false, 1000)];
        assert_eq!(publish_eligibility(&subs, 500), Some(1000));
    }

    #[test]
    fn expired_and_canceling_do_not_grant() {
        let now = 500;
        assert_eq!(
            publish_eligibility(&[sub(SubscriptionStatus::Expired, false, 1000)], now),
            None
        );
        assert_eq!(
            publish_eligibility(&[sub(SubscriptionStatus::Active, true, 1000)], now),
            None
        );
        assert_eq!(
            publish_eligibility(&[sub(SubscriptionStatus::Active, false, 400)], now),
            None
        );
    }

    #[test]
    fn furthest_expiry_wins() {
        let subs = [
            sub(SubscriptionStatus::Active, false, 1000),
            sub(SubscriptionStatus::Renewing, false, 2000),
        ];
        assert_eq!(publish_eligibility(&subs, 500), Some(2000));
    }
}
