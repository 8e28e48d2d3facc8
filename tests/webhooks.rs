//! Tests for the POST /webhooks/{provider} endpoints: signature
//! enforcement, idempotent application, and the simulation gate.

use axum::{body::Body, http::Request};
use tower::ServiceExt;

mod common;
use common::*;

fn vnpay_request(body: Vec<u8>, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/vnpay")
        .header("content-type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header("x-vnpay-secure-hash", sig);
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn test_webhook_unknown_provider_404() {
    let (state, _mailer) = create_test_state();
    let app = test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/stripe")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_missing_signature_rejected() {
    let (state, _mailer) = create_test_state();
    let app = test_app(state);

    let body = vnpay_webhook_body("cs_whatever", true);
    let response = app.oneshot(vnpay_request(body, None)).await.unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_bad_signature_rejected() {
    let (state, _mailer) = create_test_state();
    let provider_ref;
    {
        let conn = state.db.get().unwrap();
        let price = create_test_price(&conn);
        provider_ref = create_test_checkout(&conn, "user_1", &price).session.id;
    }

    let app = test_app(state.clone());
    let body = vnpay_webhook_body(&provider_ref, true);
    let bad_sig = vnpay_signature(&body, "wrong-secret");
    let response = app
        .oneshot(vnpay_request(body, Some(&bad_sig)))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);

    // Nothing settled.
    let conn = state.db.get().unwrap();
    let payment = queries::get_payment_by_provider_ref(&conn, "vnpay", &provider_ref)
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_webhook_valid_signature_applies_then_dedupes() {
    let (state, _mailer) = create_test_state();
    let secret = state.config.vnpay.hash_secret.clone();
    let provider_ref;
    {
        let conn = state.db.get().unwrap();
        let price = create_test_price(&conn);
        provider_ref = create_test_checkout(&conn, "user_1", &price).session.id;
    }

    let body = vnpay_webhook_body(&provider_ref, true);
    let sig = vnpay_signature(&body, &secret);

    let response = test_app(state.clone())
        .oneshot(vnpay_request(body.clone(), Some(&sig)))
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    {
        let conn = state.db.get().unwrap();
        let payment = queries::get_payment_by_provider_ref(&conn, "vnpay", &provider_ref)
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
    }

    // Replay of the exact same delivery is a 200 no-op.
    let response = test_app(state.clone())
        .oneshot(vnpay_request(body, Some(&sig)))
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let conn = state.db.get().unwrap();
    let payment = queries::get_payment_by_provider_ref(&conn, "vnpay", &provider_ref)
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Paid);
    let invoices = queries::list_invoices_for_payment(&conn, &payment.id).unwrap();
    assert_eq!(invoices.len(), 1, "replay must not duplicate invoices");
}

#[tokio::test]
async fn test_webhook_malformed_payload_rejected() {
    let (state, _mailer) = create_test_state();
    let secret = state.config.vnpay.hash_secret.clone();

    let body = b"not json at all".to_vec();
    let sig = vnpay_signature(&body, &secret);
    let response = test_app(state)
        .oneshot(vnpay_request(body, Some(&sig)))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
}

fn simulation_state() -> (AppState, std::sync::Arc<MockMailer>) {
    let mailer = std::sync::Arc::new(MockMailer::default());
    let mut config = test_config();
    config.simulation_enabled = true;
    let state = create_test_state_with(config, mailer.clone());
    (state, mailer)
}

fn simulate_request(
    provider_ref: &str,
    secret: Option<&str>,
    role: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/vnpay/simulate")
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header("x-castbill-secret", secret);
    }
    if let Some(role) = role {
        builder = builder.header("x-castbill-role", role);
    }
    builder
        .body(Body::from(vnpay_webhook_body(provider_ref, true)))
        .unwrap()
}

#[tokio::test]
async fn test_simulate_disabled_looks_like_missing_route() {
    let (state, _mailer) = create_test_state(); // simulation_enabled = false
    let app = test_app(state);

    let response = app
        .oneshot(simulate_request("cs_x", Some("test-internal-secret"), Some("admin")))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_simulate_requires_secret() {
    let (state, _mailer) = simulation_state();
    let app = test_app(state);

    let response = app
        .oneshot(simulate_request("cs_x", None, Some("admin")))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_simulate_requires_admin_role() {
    let (state, _mailer) = simulation_state();
    let app = test_app(state);

    let response = app
        .oneshot(simulate_request("cs_x", Some("test-internal-secret"), Some("support")))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_simulate_applies_without_signature() {
    let (state, _mailer) = simulation_state();
    let provider_ref;
    {
        let conn = state.db.get().unwrap();
        let price = create_test_price(&conn);
        provider_ref = create_test_checkout(&conn, "user_1", &price).session.id;
    }

    let response = test_app(state.clone())
        .oneshot(simulate_request(
            &provider_ref,
            Some("test-internal-secret"),
            Some("admin"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let conn = state.db.get().unwrap();
    let payment = queries::get_payment_by_provider_ref(&conn, "vnpay", &provider_ref)
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Paid);
}
