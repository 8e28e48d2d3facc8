pub mod checkout;
pub mod cron;
pub mod preferences;
pub mod refunds;
pub mod webhooks;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use subtle::ConstantTimeEq;

use crate::config::Config;
use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::rate_limit;

/// Header carrying the shared secret for internal endpoints.
pub const INTERNAL_SECRET_HEADER: &str = "x-castbill-secret";
/// Role header the webhook-simulation endpoint additionally requires.
pub const ROLE_HEADER: &str = "x-castbill-role";

/// Check the shared-secret header on internal (cron, refund, simulation)
/// endpoints. Constant-time compare; missing and wrong are indistinguishable.
pub(crate) fn require_internal_secret(config: &Config, headers: &HeaderMap) -> Result<()> {
    let provided = headers
        .get(INTERNAL_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let expected = config.internal_secret.as_bytes();
    let matches: bool = expected.ct_eq(provided.as_bytes()).into();
    if matches {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Public surface: checkout, webhooks, preferences, health.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route(
            "/checkout",
            post(checkout::start_checkout).layer(rate_limit::strict_layer()),
        )
        .route(
            "/notifications/preferences",
            get(preferences::get_preferences)
                .put(preferences::update_preferences)
                .layer(rate_limit::standard_layer()),
        )
        .route("/health", get(health).layer(rate_limit::relaxed_layer()))
}

/// Provider callbacks. No client rate limiting: these come from provider
/// infrastructure and are already guarded by signature verification.
pub fn webhook_router() -> Router<AppState> {
    Router::new()
        .route("/webhooks/{provider}", post(webhooks::handle_webhook))
        .route(
            "/webhooks/{provider}/simulate",
            post(webhooks::simulate_webhook),
        )
}

/// Shared-secret surface: refunds, cron triggers, token issuance.
pub fn internal_router() -> Router<AppState> {
    Router::new()
        .route("/refunds", post(refunds::issue_refund))
        .route(
            "/internal/cron/notifications",
            post(cron::run_notifications),
        )
        .route(
            "/internal/cron/subscription-reminders",
            post(cron::run_subscription_reminders),
        )
        .route(
            "/internal/cron/expire-sessions",
            post(cron::run_expire_sessions),
        )
        .route(
            "/internal/preferences-token",
            post(preferences::issue_token),
        )
}
