//! Test utilities and fixtures for castbill integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use castbill::handlers;

pub use castbill::config::{Config, MoMoConfig, VnPayConfig, ZaloPayConfig};
pub use castbill::db::{init_db, queries, AppState};
pub use castbill::models::*;
pub use castbill::notify::{Mailer, SendFuture};
pub use castbill::providers::{webhook_adapter, PaymentProvider};

/// Deterministic test configuration; no env lookups.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: ":memory:".to_string(),
        base_url: "http://localhost:3000".to_string(),
        internal_secret: "test-internal-secret".to_string(),
        token_key: "test-token-key".to_string(),
        simulation_enabled: false,
        dedupe_window_secs: 600,
        retry_base_secs: 60,
        max_delivery_attempts: 3,
        session_ttl_secs: 86400,
        outbound_timeout: Duration::from_secs(5),
        dev_mode: true,
        resend_api_key: None,
        email_from: "test@castbill.local".to_string(),
        vnpay: VnPayConfig {
            tmn_code: "TESTTMN".to_string(),
            hash_secret: "test-vnpay-secret".to_string(),
        },
        momo: MoMoConfig {
            partner_code: "TESTMOMO".to_string(),
            access_key: "test-momo-access".to_string(),
            secret_key: "test-momo-secret".to_string(),
        },
        zalopay: ZaloPayConfig {
            app_id: "553".to_string(),
            key1: "test-zalopay-key1".to_string(),
        },
    }
}

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Recording mailer. `fail_next(n)` makes the next n sends fail, for
/// exercising the retry queue.
#[derive(Default)]
pub struct MockMailer {
    pub sent: Mutex<Vec<SentEmail>>,
    failures: AtomicUsize,
}

impl MockMailer {
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Mailer for MockMailer {
    fn send<'a>(&'a self, recipient: &'a str, subject: &'a str, body: &'a str) -> SendFuture<'a> {
        Box::pin(async move {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(castbill::error::AppError::Internal(
                    "simulated delivery failure".to_string(),
                ));
            }
            self.sent.lock().unwrap().push(SentEmail {
                recipient: recipient.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
            Ok(())
        })
    }
}

/// AppState over a single-connection in-memory pool. One connection keeps
/// every `get()` on the same database.
pub fn create_test_state_with(config: Config, mailer: Arc<MockMailer>) -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }
    AppState {
        db: pool,
        config,
        mailer,
    }
}

pub fn create_test_state() -> (AppState, Arc<MockMailer>) {
    let mailer = Arc::new(MockMailer::default());
    let state = create_test_state_with(test_config(), mailer.clone());
    (state, mailer)
}

/// Router with every endpoint mounted, without rate limiting for tests.
pub fn test_app(state: AppState) -> Router {
    Router::new()
        .route("/checkout", post(handlers::checkout::start_checkout))
        .route(
            "/notifications/preferences",
            get(handlers::preferences::get_preferences).put(handlers::preferences::update_preferences),
        )
        .route("/webhooks/{provider}", post(handlers::webhooks::handle_webhook))
        .route(
            "/webhooks/{provider}/simulate",
            post(handlers::webhooks::simulate_webhook),
        )
        .route("/refunds", post(handlers::refunds::issue_refund))
        .route(
            "/internal/cron/notifications",
            post(handlers::cron::run_notifications),
        )
        .route(
            "/internal/cron/subscription-reminders",
            post(handlers::cron::run_subscription_reminders),
        )
        .route(
            "/internal/cron/expire-sessions",
            post(handlers::cron::run_expire_sessions),
        )
        .route(
            "/internal/preferences-token",
            post(handlers::preferences::issue_token),
        )
        .with_state(state)
}

/// A 5,000,000 VND / 30-day publication price.
pub fn create_test_price(conn: &Connection) -> Price {
    queries::create_price(
        conn,
        &CreatePrice {
            entitlement_key: CAN_PUBLISH_PROFILE.to_string(),
            plan_id: "profile_publication".to_string(),
            amount: 5_000_000,
            currency: "vnd".to_string(),
            period_days: 30,
            active: true,
        },
    )
    .expect("Failed to create test price")
}

pub fn create_test_profile(
    conn: &Connection,
    user_id: &str,
    visibility: Visibility,
    approved: bool,
) -> Profile {
    let profile = Profile {
        user_id: user_id.to_string(),
        visibility,
        approved,
        published_at: match visibility {
            Visibility::Public => Some(now()),
            Visibility::Private => None,
        },
        unpublished_reason: None,
    };
    queries::upsert_profile(conn, &profile).expect("Failed to create test profile");
    profile
}

/// Create the full checkout trio the way the orchestrator does, without the
/// provider round-trip. provider_ref = session id, as VNPay does it.
pub fn create_test_checkout(
    conn: &Connection,
    user_id: &str,
    price: &Price,
) -> queries::CheckoutTrio {
    let session_id = castbill::id::EntityType::CheckoutSession.gen_id();
    queries::create_checkout_trio(
        conn,
        &session_id,
        user_id,
        "vnpay",
        price,
        &session_id,
        "https://pay.vnpay.vn/vpcpay.html?stub",
        Some("http://localhost:3000/billing/return"),
    )
    .expect("Failed to create test checkout")
}

/// VNPay-shaped webhook body for a provider_ref.
pub fn vnpay_webhook_body(provider_ref: &str, paid: bool) -> Vec<u8> {
    let code = if paid { "00" } else { "24" };
    serde_json::json!({
        "vnp_TxnRef": provider_ref,
        "vnp_ResponseCode": code,
    })
    .to_string()
    .into_bytes()
}

/// HMAC-SHA512 signature over a raw body, as VNPay signs its IPN calls.
pub fn vnpay_signature(body: &[u8], secret: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    let mut mac =
        Hmac::<Sha512>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn future_timestamp(days: i64) -> i64 {
    now() + (days * 86400)
}

pub fn past_timestamp(days: i64) -> i64 {
    now() - (days * 86400)
}
