//! Tests for cascading enforcement: profile visibility following the
//! `can_publish_profile` entitlement.

use castbill::enforcement::{self, EnforcementOutcome, UNPUBLISH_REASON};

mod common;
use common::*;

/// Grant or revoke the entitlement directly; enforcement only reads it.
fn set_entitlement(conn: &rusqlite::Connection, user_id: &str, expires_at: i64) {
    queries::upsert_entitlement(conn, user_id, CAN_PUBLISH_PROFILE, Some(expires_at)).unwrap();
}

#[test]
fn test_lapse_unpublishes_public_profile() {
    let conn = setup_test_db();
    let config = test_config();
    create_test_profile(&conn, "user_1", Visibility::Public, true);
    set_entitlement(&conn, "user_1", past_timestamp(1));

    let outcome = enforcement::enforce(&conn, &config, "user_1").unwrap();
    assert_eq!(outcome, EnforcementOutcome::AutoUnpublished);

    let profile = queries::get_profile(&conn, "user_1").unwrap().unwrap();
    assert_eq!(profile.visibility, Visibility::Private);
    assert_eq!(profile.unpublished_reason, Some(UNPUBLISH_REASON.to_string()));

    let events = queries::list_audit_events(&conn, "user_1").unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::AutoUnpublish);

    // The user was told, in-app.
    assert_eq!(queries::count_inapp_for_user(&conn, "user_1").unwrap(), 1);
}

#[test]
fn test_enforce_is_idempotent() {
    let conn = setup_test_db();
    let config = test_config();
    create_test_profile(&conn, "user_1", Visibility::Public, true);
    set_entitlement(&conn, "user_1", past_timestamp(1));

    assert_eq!(
        enforcement::enforce(&conn, &config, "user_1").unwrap(),
        EnforcementOutcome::AutoUnpublished
    );
    assert_eq!(
        enforcement::enforce(&conn, &config, "user_1").unwrap(),
        EnforcementOutcome::Unchanged
    );

    // One audit event, one notification.
    assert_eq!(queries::list_audit_events(&conn, "user_1").unwrap().len(), 1);
    assert_eq!(queries::count_inapp_for_user(&conn, "user_1").unwrap(), 1);
}

#[test]
fn test_restore_publishes_approved_profile() {
    let conn = setup_test_db();
    let config = test_config();
    create_test_profile(&conn, "user_1", Visibility::Private, true);
    set_entitlement(&conn, "user_1", future_timestamp(30));

    let outcome = enforcement::enforce(&conn, &config, "user_1").unwrap();
    assert_eq!(outcome, EnforcementOutcome::AutoPublished);

    let profile = queries::get_profile(&conn, "user_1").unwrap().unwrap();
    assert_eq!(profile.visibility, Visibility::Public);
    assert!(profile.published_at.is_some());
    assert_eq!(profile.unpublished_reason, None);
}

#[test]
fn test_entitlement_never_publishes_unapproved_profile() {
    let conn = setup_test_db();
    let config = test_config();
    create_test_profile(&conn, "user_1", Visibility::Private, false);
    set_entitlement(&conn, "user_1", future_timestamp(30));

    let outcome = enforcement::enforce(&conn, &config, "user_1").unwrap();
    assert_eq!(outcome, EnforcementOutcome::Unchanged);

    let profile = queries::get_profile(&conn, "user_1").unwrap().unwrap();
    assert_eq!(profile.visibility, Visibility::Private);
    assert!(queries::list_audit_events(&conn, "user_1").unwrap().is_empty());
}

#[test]
fn test_no_profile_is_a_noop() {
    let conn = setup_test_db();
    let config = test_config();
    set_entitlement(&conn, "user_1", future_timestamp(30));

    assert_eq!(
        enforcement::enforce(&conn, &config, "user_1").unwrap(),
        EnforcementOutcome::Unchanged
    );
}

#[test]
fn test_drain_backlog_syncs_and_enforces() {
    let conn = setup_test_db();
    let config = test_config();
    create_test_profile(&conn, "user_1", Visibility::Public, true);
    // Their subscription is gone; the backlog entry triggers the cascade.
    queries::enqueue_entitlement_sync(&conn, "user_1").unwrap();
    set_entitlement(&conn, "user_1", past_timestamp(1));

    let synced = enforcement::drain_sync_backlog(&conn, &config, 32).unwrap();
    assert_eq!(synced, 1);

    let profile = queries::get_profile(&conn, "user_1").unwrap().unwrap();
    assert_eq!(profile.visibility, Visibility::Private);

    // Backlog drained; a second sweep has nothing to do.
    assert_eq!(enforcement::drain_sync_backlog(&conn, &config, 32).unwrap(), 0);
}
