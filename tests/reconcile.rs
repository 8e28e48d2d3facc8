//! Tests for webhook reconciliation: ledger effects of paid and failed
//! callbacks, idempotent re-application, and the full purchase-to-publish
//! cascade.

use castbill::notify;
use castbill::reconcile;

mod common;
use common::*;

fn vnpay_adapter(state: &AppState) -> Box<dyn castbill::providers::WebhookAdapter> {
    webhook_adapter(PaymentProvider::VnPay, &state.config)
}

#[tokio::test]
async fn test_paid_webhook_settles_ledger_and_publishes_profile() {
    let (state, mailer) = create_test_state();
    let provider_ref;
    let payment_id;
    {
        let conn = state.db.get().unwrap();
        let price = create_test_price(&conn);
        // Approved but private profile, waiting on the entitlement.
        create_test_profile(&conn, "user_1", Visibility::Private, true);
        queries::upsert_notification_prefs(
            &conn,
            "user_1",
            Some("user1@example.com"),
            true,
            true,
        )
        .unwrap();
        let trio = create_test_checkout(&conn, "user_1", &price);
        provider_ref = trio.session.id.clone();
        payment_id = trio.payment.id.clone();
    }

    let adapter = vnpay_adapter(&state);
    let body = vnpay_webhook_body(&provider_ref, true);
    let outcome = reconcile::reconcile(&state, adapter.as_ref(), &body).unwrap();
    assert!(outcome.applied);

    let conn = state.db.get().unwrap();

    let payment = queries::get_payment(&conn, &payment_id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Paid);

    let invoice = queries::get_sale_invoice_for_payment(&conn, &payment_id)
        .unwrap()
        .unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Paid);
    let number = invoice.number.unwrap();
    assert!(number.starts_with("CB-"), "got invoice number {}", number);
    assert!(invoice.issued_at.is_some());

    let session = queries::get_checkout_session(&conn, &provider_ref)
        .unwrap()
        .unwrap();
    assert_eq!(session.status, CheckoutStatus::Success);

    // Thirty paid days, give or take test runtime.
    let sub = queries::get_subscription(&conn, "user_1", "profile_publication")
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert!((sub.ends_at - future_timestamp(30)).abs() < 5);

    // Entitlement synced from the subscription, expiry aligned.
    let ent = queries::get_entitlement(&conn, "user_1", CAN_PUBLISH_PROFILE)
        .unwrap()
        .unwrap();
    assert_eq!(ent.expires_at, Some(sub.ends_at));
    assert!(ent.holds_at(now()));

    // Cascade: the approved private profile went public.
    let profile = queries::get_profile(&conn, "user_1").unwrap().unwrap();
    assert_eq!(profile.visibility, Visibility::Public);
    assert!(profile.published_at.is_some());
    assert_eq!(profile.unpublished_reason, None);

    let actions: Vec<_> = queries::list_audit_events(&conn, "user_1")
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert!(actions.contains(&AuditAction::AutoPublish));

    // Exactly one restored notice despite sync running again on replays.
    let hash = notify::dedupe_hash("user_1", "entitlement_restored", "restored");
    assert_eq!(queries::count_message_logs_for_hash(&conn, &hash).unwrap(), 1);
    // In-app rows written synchronously: restored + invoice-finalized.
    assert_eq!(queries::count_inapp_for_user(&conn, "user_1").unwrap(), 2);
    drop(conn);

    // Email jobs deliver on the next sweep.
    let processed = notify::process_due_jobs(&state.db, &state.config, mailer.as_ref(), 50)
        .await
        .unwrap();
    assert_eq!(processed, 2);
    assert_eq!(mailer.sent_count(), 2);
    let sent = mailer.sent.lock().unwrap();
    assert!(sent.iter().all(|e| e.recipient == "user1@example.com"));
}

#[tokio::test]
async fn test_paid_webhook_replay_is_noop() {
    let (state, _mailer) = create_test_state();
    let provider_ref;
    let payment_id;
    {
        let conn = state.db.get().unwrap();
        let price = create_test_price(&conn);
        let trio = create_test_checkout(&conn, "user_1", &price);
        provider_ref = trio.session.id.clone();
        payment_id = trio.payment.id.clone();
    }

    let adapter = vnpay_adapter(&state);
    let body = vnpay_webhook_body(&provider_ref, true);
    assert!(reconcile::reconcile(&state, adapter.as_ref(), &body)
        .unwrap()
        .applied);

    let ends_at_first = {
        let conn = state.db.get().unwrap();
        queries::get_subscription(&conn, "user_1", "profile_publication")
            .unwrap()
            .unwrap()
            .ends_at
    };

    let outcome = reconcile::reconcile(&state, adapter.as_ref(), &body).unwrap();
    assert!(!outcome.applied);

    let conn = state.db.get().unwrap();
    let sub = queries::get_subscription(&conn, "user_1", "profile_publication")
        .unwrap()
        .unwrap();
    assert_eq!(sub.ends_at, ends_at_first, "replay must not extend the period");
    let payment = queries::get_payment(&conn, &payment_id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_failed_webhook_marks_payment_and_session_failed() {
    let (state, _mailer) = create_test_state();
    let provider_ref;
    let payment_id;
    {
        let conn = state.db.get().unwrap();
        let price = create_test_price(&conn);
        let trio = create_test_checkout(&conn, "user_1", &price);
        provider_ref = trio.session.id.clone();
        payment_id = trio.payment.id.clone();
    }

    let adapter = vnpay_adapter(&state);
    let body = vnpay_webhook_body(&provider_ref, false);
    let outcome = reconcile::reconcile(&state, adapter.as_ref(), &body).unwrap();
    assert!(outcome.applied);

    let conn = state.db.get().unwrap();
    let payment = queries::get_payment(&conn, &payment_id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);

    let session = queries::get_checkout_session(&conn, &provider_ref)
        .unwrap()
        .unwrap();
    assert_eq!(session.status, CheckoutStatus::Failed);

    // No grant, no subscription, invoice still open.
    assert!(queries::get_subscription(&conn, "user_1", "profile_publication")
        .unwrap()
        .is_none());
    assert!(queries::get_entitlement(&conn, "user_1", CAN_PUBLISH_PROFILE)
        .unwrap()
        .is_none());
    let invoice = queries::get_sale_invoice_for_payment(&conn, &payment_id)
        .unwrap()
        .unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Open);
}

#[tokio::test]
async fn test_unknown_provider_ref_is_ignored() {
    let (state, _mailer) = create_test_state();
    let adapter = vnpay_adapter(&state);

    let body = vnpay_webhook_body("cs_never_created", true);
    let outcome = reconcile::reconcile(&state, adapter.as_ref(), &body).unwrap();
    assert!(!outcome.applied);
}

#[tokio::test]
async fn test_failure_after_success_does_not_downgrade() {
    let (state, _mailer) = create_test_state();
    let provider_ref;
    let payment_id;
    {
        let conn = state.db.get().unwrap();
        let price = create_test_price(&conn);
        let trio = create_test_checkout(&conn, "user_1", &price);
        provider_ref = trio.session.id.clone();
        payment_id = trio.payment.id.clone();
    }

    let adapter = vnpay_adapter(&state);
    let paid = vnpay_webhook_body(&provider_ref, true);
    assert!(reconcile::reconcile(&state, adapter.as_ref(), &paid)
        .unwrap()
        .applied);

    // A late or contradictory failure callback lands after settlement.
    let failed = vnpay_webhook_body(&provider_ref, false);
    let outcome = reconcile::reconcile(&state, adapter.as_ref(), &failed).unwrap();
    assert!(!outcome.applied);

    let conn = state.db.get().unwrap();
    let payment = queries::get_payment(&conn, &payment_id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Paid);
}
