//! Payment provider adapters.
//!
//! Each provider implements the same capability pair - start a checkout and
//! parse/verify its webhook callbacks - behind the `WebhookAdapter` trait and
//! the `start_checkout` dispatch below. Callers never branch on provider
//! identity outside this module.

mod momo;
mod vnpay;
mod zalopay;

pub use momo::MoMoClient;
pub use vnpay::VnPayClient;
pub use zalopay::ZaloPayClient;

use std::time::Duration;

use crate::config::Config;
use crate::error::Result;

/// Closed set of supported providers. Adding one means adding a variant and
/// a client module implementing both capabilities, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentProvider {
    VnPay,
    MoMo,
    ZaloPay,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VnPay => "vnpay",
            Self::MoMo => "momo",
            Self::ZaloPay => "zalopay",
        }
    }
}

impl std::str::FromStr for PaymentProvider {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vnpay" => Ok(Self::VnPay),
            "momo" => Ok(Self::MoMo),
            "zalopay" => Ok(Self::ZaloPay),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Arguments for starting a provider checkout.
#[derive(Debug)]
pub struct StartArgs<'a> {
    /// Our checkout session id; becomes the provider's order reference.
    pub session_id: &'a str,
    /// Whole đồng.
    pub amount: i64,
    pub order_info: &'a str,
    /// Where the provider redirects the user afterwards.
    pub return_url: &'a str,
    /// Where the provider POSTs the payment result webhook.
    pub notify_url: &'a str,
}

/// Outcome of a successful checkout start.
#[derive(Debug)]
pub struct StartOutcome {
    pub redirect_url: String,
    /// Reference the provider's webhook will carry; stored on the Payment
    /// row as the idempotency key half.
    pub provider_ref: String,
}

/// Provider-agnostic view of a payment result callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookNotice {
    pub provider_ref: String,
    pub paid: bool,
}

/// Typed rejection for untrusted webhook bodies. Never a panic - malformed
/// payloads are an expected input class, not an exceptional one.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WebhookParseError {
    #[error("payload is not valid JSON")]
    InvalidJson,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unrecognized result code: {0}")]
    UnrecognizedResultCode(String),
}

/// Webhook-side capability of a provider: signature extraction/verification
/// and payload parsing. Checkout start lives on the concrete clients since
/// it is async and provider-shaped.
pub trait WebhookAdapter: Send + Sync {
    /// Provider name for logging and database storage.
    fn provider_name(&self) -> &'static str;

    /// Name of the HTTP header carrying the webhook signature.
    fn signature_header(&self) -> &'static str;

    /// Verify the webhook signature over the raw body.
    fn verify_signature(&self, body: &[u8], signature: &str) -> Result<bool>;

    /// Parse the webhook payload into a provider-agnostic notice.
    fn parse_webhook(&self, body: &[u8]) -> std::result::Result<WebhookNotice, WebhookParseError>;
}

/// Construct the webhook adapter for a provider from application config.
pub fn webhook_adapter(provider: PaymentProvider, config: &Config) -> Box<dyn WebhookAdapter> {
    match provider {
        PaymentProvider::VnPay => Box::new(VnPayClient::new(&config.vnpay)),
        PaymentProvider::MoMo => {
            Box::new(MoMoClient::new(&config.momo, config.outbound_timeout))
        }
        PaymentProvider::ZaloPay => {
            Box::new(ZaloPayClient::new(&config.zalopay, config.outbound_timeout))
        }
    }
}

/// Start a checkout with the given provider. The only place provider
/// identity is dispatched on for the start capability.
pub async fn start_checkout(
    provider: PaymentProvider,
    config: &Config,
    args: StartArgs<'_>,
) -> Result<StartOutcome> {
    match provider {
        PaymentProvider::VnPay => VnPayClient::new(&config.vnpay).start(args),
        PaymentProvider::MoMo => {
            MoMoClient::new(&config.momo, config.outbound_timeout)
                .start(args)
                .await
        }
        PaymentProvider::ZaloPay => {
            ZaloPayClient::new(&config.zalopay, config.outbound_timeout)
                .start(args)
                .await
        }
    }
}

/// Shared helper: constant-time hex HMAC comparison.
pub(crate) fn constant_time_hex_eq(expected_hex: &str, provided: &str) -> bool {
    use subtle::ConstantTimeEq;

    let expected = expected_hex.as_bytes();
    let provided = provided.as_bytes();
    // Length is not secret - hex digest length is fixed per algorithm.
    if expected.len() != provided.len() {
        return false;
    }
    expected.ct_eq(provided).into()
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}
