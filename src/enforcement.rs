//! Cascading enforcement: keep profile visibility consistent with the
//! `can_publish_profile` entitlement.
//!
//! Reads current state first, so a redundant call (duplicate webhook drain,
//! overlapping sweep) observes nothing to do and returns `Unchanged`. The
//! guarded UPDATEs in the query layer close the remaining race window.

use rusqlite::Connection;

use crate::config::Config;
use crate::db::queries;
use crate::error::Result;
use crate::models::{
    AuditAction, NotificationEvent, NotificationKind, Visibility, CAN_PUBLISH_PROFILE,
};
use crate::notify;

/// Reason stamped on profiles this module unpublishes.
pub const UNPUBLISH_REASON: &str = "entitlement_lapsed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementOutcome {
    Unchanged,
    AutoUnpublished,
    AutoPublished,
}

/// Align the user's profile visibility with their current entitlement.
///
/// No profile row means there is nothing to enforce. Publication requires
/// moderation approval; the entitlement alone is never sufficient.
pub fn enforce(conn: &Connection, config: &Config, user_id: &str) -> Result<EnforcementOutcome> {
    let Some(profile) = queries::get_profile(conn, user_id)? else {
        return Ok(EnforcementOutcome::Unchanged);
    };

    let ts = chrono::Utc::now().timestamp();
    let holds = queries::get_entitlement(conn, user_id, CAN_PUBLISH_PROFILE)?
        .map(|e| e.holds_at(ts))
        .unwrap_or(false);

    match (profile.visibility, holds) {
        (Visibility::Public, false) => {
            if !queries::set_profile_private(conn, user_id, UNPUBLISH_REASON)? {
                return Ok(EnforcementOutcome::Unchanged);
            }
            queries::create_audit_event(
                conn,
                user_id,
                AuditAction::AutoUnpublish,
                Some(&serde_json::json!({
                    "reason": UNPUBLISH_REASON,
                    "key": CAN_PUBLISH_PROFILE,
                })),
            )?;
            tracing::info!(user_id, "Profile auto-unpublished");
            notify::notify_once(
                conn,
                config,
                &NotificationEvent {
                    user_id: user_id.to_string(),
                    kind: NotificationKind::ProfileUnpublished,
                    email: None,
                    subject: "Hồ sơ casting của bạn đã bị ẩn".to_string(),
                    body: "Gói đăng hồ sơ của bạn đã hết hạn nên hồ sơ không còn \
                           hiển thị công khai. Gia hạn để hiển thị lại ngay."
                        .to_string(),
                    dedupe_scope: UNPUBLISH_REASON.to_string(),
                },
            )?;
            Ok(EnforcementOutcome::AutoUnpublished)
        }
        (Visibility::Private, true) => {
            // Moderation approval is the gate; the entitlement alone never
            // publishes an unreviewed profile. The guarded UPDATE re-checks
            // both conditions.
            if !profile.approved {
                return Ok(EnforcementOutcome::Unchanged);
            }
            if !queries::set_profile_public(conn, user_id)? {
                return Ok(EnforcementOutcome::Unchanged);
            }
            queries::create_audit_event(
                conn,
                user_id,
                AuditAction::AutoPublish,
                Some(&serde_json::json!({ "key": CAN_PUBLISH_PROFILE })),
            )?;
            tracing::info!(user_id, "Profile auto-published");
            notify::notify_once(
                conn,
                config,
                &NotificationEvent {
                    user_id: user_id.to_string(),
                    kind: NotificationKind::EntitlementRestored,
                    email: None,
                    subject: "Hồ sơ casting của bạn đã hiển thị trở lại".to_string(),
                    body: "Thanh toán thành công, hồ sơ của bạn đã được hiển thị \
                           công khai trở lại."
                        .to_string(),
                    dedupe_scope: "restored".to_string(),
                },
            )?;
            Ok(EnforcementOutcome::AutoPublished)
        }
        _ => Ok(EnforcementOutcome::Unchanged),
    }
}

/// Drain the entitlement-sync outbox: for each queued user, recompute
/// entitlements and enforce the result. Best-effort per user; one failure
/// is logged and does not starve the rest.
pub fn drain_sync_backlog(conn: &Connection, config: &Config, limit: usize) -> Result<usize> {
    let users = queries::take_sync_backlog(conn, limit)?;
    let count = users.len();
    for user_id in users {
        if let Err(e) = sync_and_enforce(conn, config, &user_id) {
            tracing::error!(user_id = %user_id, error = %e, "Entitlement sync failed");
            // Put the user back so the next drain retries.
            queries::enqueue_entitlement_sync(conn, &user_id)?;
        }
    }
    Ok(count)
}

fn sync_and_enforce(conn: &Connection, config: &Config, user_id: &str) -> Result<()> {
    crate::entitlements::sync_user(conn, user_id)?;
    enforce(conn, config, user_id)?;
    Ok(())
}
