use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;

use crate::config::VnPayConfig;
use crate::error::{msg, AppError, Result};

use super::{
    constant_time_hex_eq, StartArgs, StartOutcome, WebhookAdapter, WebhookNotice,
    WebhookParseError,
};

type HmacSha512 = Hmac<Sha512>;

const PAY_URL: &str = "https://pay.vnpay.vn/vpcpay.html";

/// VNPay settles in VND but the gateway expects amounts multiplied by 100.
const AMOUNT_SCALE: i64 = 100;

/// Response code VNPay sends for a successful payment.
const RESPONSE_CODE_OK: &str = "00";

/// VNPay adapter. Checkout start is a locally-built signed redirect URL -
/// no API round-trip - and the IPN callback is verified with HMAC-SHA512.
#[derive(Debug, Clone)]
pub struct VnPayClient {
    tmn_code: String,
    hash_secret: String,
}

impl VnPayClient {
    pub fn new(config: &VnPayConfig) -> Self {
        Self {
            tmn_code: config.tmn_code.clone(),
            hash_secret: config.hash_secret.clone(),
        }
    }

    /// Build the signed payment URL. The session id doubles as vnp_TxnRef,
    /// which is what the IPN callback later reports back.
    pub fn start(&self, args: StartArgs<'_>) -> Result<StartOutcome> {
        // Parameters must be signed in lexicographic key order.
        let params: Vec<(&str, String)> = vec![
            ("vnp_Amount", (args.amount * AMOUNT_SCALE).to_string()),
            ("vnp_Command", "pay".to_string()),
            ("vnp_CurrCode", "VND".to_string()),
            ("vnp_IpnUrl", args.notify_url.to_string()),
            ("vnp_OrderInfo", args.order_info.to_string()),
            ("vnp_ReturnUrl", args.return_url.to_string()),
            ("vnp_TmnCode", self.tmn_code.clone()),
            ("vnp_TxnRef", args.session_id.to_string()),
            ("vnp_Version", "2.1.0".to_string()),
        ];

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let mut mac = HmacSha512::new_from_slice(self.hash_secret.as_bytes())
            .map_err(|_| AppError::Internal("Invalid VNPay hash secret".into()))?;
        mac.update(query.as_bytes());
        let secure_hash = hex::encode(mac.finalize().into_bytes());

        Ok(StartOutcome {
            redirect_url: format!("{}?{}&vnp_SecureHash={}", PAY_URL, query, secure_hash),
            provider_ref: args.session_id.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct VnPayIpn {
    #[serde(rename = "vnp_TxnRef")]
    txn_ref: Option<String>,
    #[serde(rename = "vnp_ResponseCode")]
    response_code: Option<String>,
}

impl WebhookAdapter for VnPayClient {
    fn provider_name(&self) -> &'static str {
        "vnpay"
    }

    fn signature_header(&self) -> &'static str {
        "x-vnpay-secure-hash"
    }

    fn verify_signature(&self, body: &[u8], signature: &str) -> Result<bool> {
        let mut mac = HmacSha512::new_from_slice(self.hash_secret.as_bytes())
            .map_err(|_| AppError::Internal("Invalid VNPay hash secret".into()))?;
        mac.update(body);
        let expected = hex::encode(mac.finalize().into_bytes());
        Ok(constant_time_hex_eq(&expected, signature))
    }

    fn parse_webhook(&self, body: &[u8]) -> std::result::Result<WebhookNotice, WebhookParseError> {
        let ipn: VnPayIpn =
            serde_json::from_slice(body).map_err(|_| WebhookParseError::InvalidJson)?;

        let provider_ref = ipn
            .txn_ref
            .filter(|r| !r.is_empty())
            .ok_or(WebhookParseError::MissingField("vnp_TxnRef"))?;
        let code = ipn
            .response_code
            .ok_or(WebhookParseError::MissingField("vnp_ResponseCode"))?;

        // "00" is success; the documented failure codes are all two-digit
        // strings. Anything else is garbage we refuse to interpret.
        let paid = match code.as_str() {
            RESPONSE_CODE_OK => true,
            c if c.len() == 2 && c.chars().all(|ch| ch.is_ascii_digit()) => false,
            other => return Err(WebhookParseError::UnrecognizedResultCode(other.to_string())),
        };

        Ok(WebhookNotice { provider_ref, paid })
    }
}

/// Minimal percent-encoding for query values, VNPay-style (spaces as '+').
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> VnPayClient {
        VnPayClient::new(&VnPayConfig {
            tmn_code: "TESTTMN".to_string(),
            hash_secret: "test-secret".to_string(),
        })
    }

    #[test]
    fn start_builds_signed_url() {
        let client = test_client();
        let outcome = client
            .start(StartArgs {
                session_id: "cb_sess_00000000000000000000000000000001",
                amount: 5_000_000,
                order_info: "Publication subscription",
                return_url: "https://app.example/return",
                notify_url: "https://app.example/webhooks/vnpay",
            })
            .unwrap();

        assert!(outcome.redirect_url.starts_with(PAY_URL));
        assert!(outcome.redirect_url.contains("vnp_Amount=500000000"));
        assert!(outcome.redirect_url.contains("vnp_SecureHash="));
        assert_eq!(
            outcome.provider_ref,
            "cb_sess_00000000000000000000000000000001"
        );
    }

    #[test]
    fn parse_paid_ipn() {
        let client = test_client();
        let notice = client
            .parse_webhook(br#"{"vnp_TxnRef":"ref1","vnp_ResponseCode":"00"}"#)
            .unwrap();
        assert!(notice.paid);
        assert_eq!(notice.provider_ref, "ref1");
    }

    #[test]
    fn parse_failed_ipn() {
        let client = test_client();
        let notice = client
            .parse_webhook(br#"{"vnp_TxnRef":"ref1","vnp_ResponseCode":"24"}"#)
            .unwrap();
        assert!(!notice.paid);
    }

    #[test]
    fn parse_rejects_garbage() {
        let client = test_client();
        assert_eq!(
            client.parse_webhook(b"not json"),
            Err(WebhookParseError::InvalidJson)
        );
        assert_eq!(
            client.parse_webhook(br#"{"vnp_ResponseCode":"00"}"#),
            Err(WebhookParseError::MissingField("vnp_TxnRef"))
        );
        assert_eq!(
            client.parse_webhook(br#"{"vnp_TxnRef":"r","vnp_ResponseCode":"weird"}"#),
            Err(WebhookParseError::UnrecognizedResultCode("weird".to_string()))
        );
    }

    #[test]
    fn signature_roundtrip() {
        use hmac::{Hmac, Mac};

        let client = test_client();
        let body = br#"{"vnp_TxnRef":"ref1","vnp_ResponseCode":"00"}"#;

        let mut mac = Hmac::<Sha512>::new_from_slice(b"test-secret").unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());

        assert!(client.verify_signature(body, &sig).unwrap());
        assert!(!client.verify_signature(b"tampered", &sig).unwrap());
        assert!(!client.verify_signature(body, "deadbeef").unwrap());
    }
}
