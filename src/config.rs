use std::env;
use std::time::Duration;

/// Minimum gap between two subscription-reminder sweeps, regardless of how
/// often the external cron trigger fires.
pub const REMINDER_MIN_INTERVAL_SECS: i64 = 600;

/// How far ahead of `ends_at` expiry reminders are enqueued.
pub const REMINDER_LEAD_DAYS: i64 = 3;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// Shared secret required by cron and webhook-simulation endpoints.
    pub internal_secret: String,
    /// Key for signing notification-preferences tokens.
    pub token_key: String,
    /// Whether the unauthenticated webhook-simulation path is reachable at all.
    /// Must stay off in production configuration.
    pub simulation_enabled: bool,
    /// Duplicate notifications with the same dedupe hash inside this window
    /// are silently dropped.
    pub dedupe_window_secs: i64,
    /// Base delay for notification retry backoff (doubles per attempt).
    pub retry_base_secs: i64,
    pub max_delivery_attempts: i64,
    /// Checkout sessions that never receive a webhook are expired after this.
    pub session_ttl_secs: i64,
    /// Bounded timeout for outbound provider and email calls.
    pub outbound_timeout: Duration,
    pub dev_mode: bool,
    /// Resend API key for outbound email. None = email delivery disabled
    /// (logged and treated as sent, for local development).
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub vnpay: VnPayConfig,
    pub momo: MoMoConfig,
    pub zalopay: ZaloPayConfig,
}

#[derive(Debug, Clone)]
pub struct VnPayConfig {
    /// Merchant terminal code.
    pub tmn_code: String,
    pub hash_secret: String,
}

#[derive(Debug, Clone)]
pub struct MoMoConfig {
    pub partner_code: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone)]
pub struct ZaloPayConfig {
    pub app_id: String,
    pub key1: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("CASTBILL_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "castbill.db".to_string()),
            base_url,
            internal_secret: env::var("CASTBILL_INTERNAL_SECRET")
                .unwrap_or_else(|_| "dev-internal-secret".to_string()),
            token_key: env::var("CASTBILL_TOKEN_KEY")
                .unwrap_or_else(|_| "dev-token-key".to_string()),
            simulation_enabled: env::var("CASTBILL_SIMULATION")
                .map(|v| v == "1" || v == "true")
                .unwrap_or(false),
            dedupe_window_secs: env_i64("NOTIFY_DEDUPE_WINDOW_SECS", 600),
            retry_base_secs: env_i64("NOTIFY_RETRY_BASE_SECS", 60),
            max_delivery_attempts: env_i64("NOTIFY_MAX_ATTEMPTS", 5),
            session_ttl_secs: env_i64("CHECKOUT_SESSION_TTL_SECS", 24 * 3600),
            outbound_timeout: Duration::from_secs(env_i64("OUTBOUND_TIMEOUT_SECS", 10) as u64),
            dev_mode,
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "billing@castbill.vn".to_string()),
            vnpay: VnPayConfig {
                tmn_code: env::var("VNPAY_TMN_CODE").unwrap_or_else(|_| "CASTBILL01".to_string()),
                hash_secret: env::var("VNPAY_HASH_SECRET")
                    .unwrap_or_else(|_| "dev-vnpay-secret".to_string()),
            },
            momo: MoMoConfig {
                partner_code: env::var("MOMO_PARTNER_CODE")
                    .unwrap_or_else(|_| "CASTBILL".to_string()),
                access_key: env::var("MOMO_ACCESS_KEY")
                    .unwrap_or_else(|_| "dev-momo-access".to_string()),
                secret_key: env::var("MOMO_SECRET_KEY")
                    .unwrap_or_else(|_| "dev-momo-secret".to_string()),
            },
            zalopay: ZaloPayConfig {
                app_id: env::var("ZALOPAY_APP_ID").unwrap_or_else(|_| "2554".to_string()),
                key1: env::var("ZALOPAY_KEY1")
                    .unwrap_or_else(|_| "dev-zalopay-key1".to_string()),
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
