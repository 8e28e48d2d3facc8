//! Tests for POST /refunds: bounds, invoice ledger effects, and the full
//! refund cascade back through subscription and profile.

use axum::{body::Body, http::Request};
use serde_json::{json, Value};
use tower::ServiceExt;

use castbill::reconcile;

mod common;
use common::*;

/// Seed a paid payment the way production gets one: checkout trio plus a
/// settled vnpay webhook.
fn seed_paid_payment(state: &AppState, user_id: &str) -> String {
    let (provider_ref, payment_id) = {
        let conn = state.db.get().unwrap();
        let price = create_test_price(&conn);
        let trio = create_test_checkout(&conn, user_id, &price);
        (trio.session.id.clone(), trio.payment.id.clone())
    };
    let adapter = webhook_adapter(PaymentProvider::VnPay, &state.config);
    let body = vnpay_webhook_body(&provider_ref, true);
    assert!(reconcile::reconcile(state, adapter.as_ref(), &body)
        .unwrap()
        .applied);
    payment_id
}

fn refund_request(body: &Value, secret: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/refunds")
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header("x-castbill-secret", secret);
    }
    builder
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_refund_requires_secret() {
    let (state, _mailer) = create_test_state();
    let payment_id = seed_paid_payment(&state, "user_1");

    let response = test_app(state)
        .oneshot(refund_request(&json!({ "payment_id": payment_id }), None))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_partial_refund_creates_negative_invoice() {
    let (state, _mailer) = create_test_state();
    let payment_id = seed_paid_payment(&state, "user_1");

    let response = test_app(state.clone())
        .oneshot(refund_request(
            &json!({ "payment_id": payment_id, "amount": 1_000_000 }),
            Some("test-internal-secret"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["amount"], 1_000_000);
    assert_eq!(json["payment_status"], "refunded_partial");
    assert!(json["number"].as_str().unwrap().starts_with("CB-"));

    let conn = state.db.get().unwrap();
    let payment = queries::get_payment(&conn, &payment_id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::RefundedPartial);

    let invoices = queries::list_invoices_for_payment(&conn, &payment_id).unwrap();
    let refund = invoices
        .iter()
        .find(|i| i.kind == InvoiceKind::Refund)
        .unwrap();
    assert_eq!(refund.total, -1_000_000);
    assert_eq!(refund.status, InvoiceStatus::Refunded);
    // The sale invoice is untouched.
    let sale = invoices.iter().find(|i| i.kind == InvoiceKind::Sale).unwrap();
    assert_eq!(sale.total, 5_000_000);
    assert_eq!(sale.status, InvoiceStatus::Paid);

    // Partial refund leaves the subscription running.
    let sub = queries::get_subscription(&conn, "user_1", "profile_publication")
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn test_refund_cannot_exceed_refundable() {
    let (state, _mailer) = create_test_state();
    let payment_id = seed_paid_payment(&state, "user_1");

    let response = test_app(state.clone())
        .oneshot(refund_request(
            &json!({ "payment_id": payment_id, "amount": 6_000_000 }),
            Some("test-internal-secret"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);

    // Cumulative bound: 4M after a 2M partial is also over.
    let response = test_app(state.clone())
        .oneshot(refund_request(
            &json!({ "payment_id": payment_id, "amount": 2_000_000 }),
            Some("test-internal-secret"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let response = test_app(state)
        .oneshot(refund_request(
            &json!({ "payment_id": payment_id, "amount": 4_000_000 }),
            Some("test-internal-secret"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unpaid_payment_not_refundable() {
    let (state, _mailer) = create_test_state();
    let payment_id = {
        let conn = state.db.get().unwrap();
        let price = create_test_price(&conn);
        create_test_checkout(&conn, "user_1", &price).payment.id
    };

    let response = test_app(state)
        .oneshot(refund_request(
            &json!({ "payment_id": payment_id }),
            Some("test-internal-secret"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_payment_404() {
    let (state, _mailer) = create_test_state();

    let response = test_app(state)
        .oneshot(refund_request(
            &json!({ "payment_id": "pay_nope" }),
            Some("test-internal-secret"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_full_refund_cascades_to_profile() {
    let (state, _mailer) = create_test_state();
    {
        let conn = state.db.get().unwrap();
        create_test_profile(&conn, "user_1", Visibility::Private, true);
    }
    // The paid webhook publishes the approved profile.
    let payment_id = seed_paid_payment(&state, "user_1");
    {
        let conn = state.db.get().unwrap();
        let profile = queries::get_profile(&conn, "user_1").unwrap().unwrap();
        assert_eq!(profile.visibility, Visibility::Public);
    }

    // Omitted amount = everything refundable.
    let response = test_app(state.clone())
        .oneshot(refund_request(
            &json!({ "payment_id": payment_id }),
            Some("test-internal-secret"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["amount"], 5_000_000);
    assert_eq!(json["payment_status"], "refunded");

    let conn = state.db.get().unwrap();
    let payment = queries::get_payment(&conn, &payment_id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);

    let sub = queries::get_subscription(&conn, "user_1", "profile_publication")
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Expired);

    // The cascade took the profile down with it.
    let profile = queries::get_profile(&conn, "user_1").unwrap().unwrap();
    assert_eq!(profile.visibility, Visibility::Private);
    assert_eq!(
        profile.unpublished_reason,
        Some("entitlement_lapsed".to_string())
    );

    let actions: Vec<_> = queries::list_audit_events(&conn, "user_1")
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert!(actions.contains(&AuditAction::RefundIssued));
    assert!(actions.contains(&AuditAction::AutoUnpublish));
}
