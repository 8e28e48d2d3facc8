//! Provider webhook endpoints.
//!
//! Responses follow provider expectations: 200 tells the provider to stop
//! retrying (including for idempotent no-ops and unknown references),
//! 4xx rejects bad input, and response bodies never leak internal state.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::db::AppState;
use crate::error::AppError;
use crate::extractors::Path;
use crate::providers::{webhook_adapter, PaymentProvider};
use crate::reconcile;

use super::{require_internal_secret, ROLE_HEADER};

pub type WebhookResult = (StatusCode, &'static str);

/// POST /webhooks/{provider} - signature-verified payment callback.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    let Ok(provider) = provider.parse::<PaymentProvider>() else {
        return (StatusCode::NOT_FOUND, "Unknown provider");
    };
    let adapter = webhook_adapter(provider, &state.config);

    let Some(signature) = headers
        .get(adapter.signature_header())
        .and_then(|v| v.to_str().ok())
    else {
        return (StatusCode::BAD_REQUEST, "Missing signature header");
    };

    match adapter.verify_signature(&body, signature) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(provider = %provider, "Webhook signature verification failed");
            return (StatusCode::UNAUTHORIZED, "Invalid signature");
        }
        Err(e) => {
            tracing::error!(provider = %provider, error = %e, "Signature verification error");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Verification error");
        }
    }

    apply(&state, adapter.as_ref(), &body)
}

/// POST /webhooks/{provider}/simulate - test-only delivery path.
///
/// Bypasses signature verification ONLY. Reachable exclusively when the
/// simulation gate is enabled in configuration, and even then requires the
/// shared secret plus an explicit admin role header.
pub async fn simulate_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    if !state.config.simulation_enabled {
        // Indistinguishable from a route that does not exist.
        return (StatusCode::NOT_FOUND, "Not found");
    }
    if require_internal_secret(&state.config, &headers).is_err() {
        return (StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    if headers
        .get(ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|r| r != "admin")
        .unwrap_or(true)
    {
        return (StatusCode::FORBIDDEN, "Admin role required");
    }

    let Ok(provider) = provider.parse::<PaymentProvider>() else {
        return (StatusCode::NOT_FOUND, "Unknown provider");
    };
    let adapter = webhook_adapter(provider, &state.config);

    tracing::warn!(provider = %provider, "Simulated webhook accepted");
    apply(&state, adapter.as_ref(), &body)
}

fn apply(
    state: &AppState,
    adapter: &dyn crate::providers::WebhookAdapter,
    body: &[u8],
) -> WebhookResult {
    match reconcile::reconcile(state, adapter, body) {
        Ok(outcome) if outcome.applied => (StatusCode::OK, "Applied"),
        Ok(_) => (StatusCode::OK, "Already applied"),
        Err(AppError::BadRequest(_)) => (StatusCode::BAD_REQUEST, "Malformed payload"),
        Err(e) => {
            tracing::error!(error = %e, "Webhook reconciliation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}
