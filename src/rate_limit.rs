//! Rate limiting for public endpoints, applied per client IP.
//!
//! Tiers:
//! - Strict: /checkout - every request costs an outbound provider call
//! - Standard: /notifications/preferences
//! - Relaxed: /health
//!
//! Webhook and internal endpoints are not IP-limited; they are guarded by
//! signatures and the shared secret instead.
//!
//! Configure via environment variables:
//! - RATE_LIMIT_STRICT_RPM (default: 10)
//! - RATE_LIMIT_STANDARD_RPM (default: 60)
//! - RATE_LIMIT_RELAXED_RPM (default: 120)

use std::sync::Arc;
use std::time::Duration;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;

pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

fn create_layer(requests_per_minute: u32) -> RateLimitLayer {
    assert!(requests_per_minute > 0, "Rate limit must be greater than 0");

    let period_secs = 60 / requests_per_minute as u64;
    let config = GovernorConfigBuilder::default()
        .period(Duration::from_secs(period_secs.max(1)))
        .burst_size(requests_per_minute)
        .finish()
        .expect("Failed to build rate limiter config");

    GovernorLayer::new(Arc::new(config))
}

fn rpm_from_env(var: &str, default: u32) -> u32 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Strict tier: endpoints that trigger outbound provider calls.
pub fn strict_layer() -> RateLimitLayer {
    create_layer(rpm_from_env("RATE_LIMIT_STRICT_RPM", 10))
}

/// Standard tier: DB-bound public endpoints.
pub fn standard_layer() -> RateLimitLayer {
    create_layer(rpm_from_env("RATE_LIMIT_STANDARD_RPM", 60))
}

/// Relaxed tier: health checks.
pub fn relaxed_layer() -> RateLimitLayer {
    create_layer(rpm_from_env("RATE_LIMIT_RELAXED_RPM", 120))
}
