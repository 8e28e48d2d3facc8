use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;

use crate::config::MoMoConfig;
use crate::error::{AppError, Result};

use super::{
    constant_time_hex_eq, http_client, StartArgs, StartOutcome, WebhookAdapter, WebhookNotice,
    WebhookParseError,
};

type HmacSha256 = Hmac<Sha256>;

const CREATE_URL: &str = "https://payment.momo.vn/v2/gateway/api/create";

/// Result code MoMo sends for a successful payment.
const RESULT_CODE_OK: i64 = 0;

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    #[serde(rename = "payUrl")]
    pay_url: String,
    #[serde(rename = "orderId")]
    order_id: String,
}

/// MoMo wallet adapter. Checkout start is a signed create-order API call;
/// the IPN callback is verified with HMAC-SHA256.
#[derive(Debug, Clone)]
pub struct MoMoClient {
    client: Client,
    partner_code: String,
    access_key: String,
    secret_key: String,
}

impl MoMoClient {
    pub fn new(config: &MoMoConfig, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            partner_code: config.partner_code.clone(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
        }
    }

    fn sign(&self, raw: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|_| AppError::Internal("Invalid MoMo secret key".into()))?;
        mac.update(raw.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Create a MoMo order and return the hosted payment URL.
    pub async fn start(&self, args: StartArgs<'_>) -> Result<StartOutcome> {
        // The raw-signature field order is fixed by the MoMo API contract.
        let raw_signature = format!(
            "accessKey={}&amount={}&ipnUrl={}&orderId={}&orderInfo={}&partnerCode={}&redirectUrl={}&requestId={}",
            self.access_key,
            args.amount,
            args.notify_url,
            args.session_id,
            args.order_info,
            self.partner_code,
            args.return_url,
            args.session_id,
        );
        let signature = self.sign(&raw_signature)?;

        let response = self
            .client
            .post(CREATE_URL)
            .json(&serde_json::json!({
                "partnerCode": self.partner_code,
                "accessKey": self.access_key,
                "requestId": args.session_id,
                "orderId": args.session_id,
                "orderInfo": args.order_info,
                "amount": args.amount,
                "redirectUrl": args.return_url,
                "ipnUrl": args.notify_url,
                "requestType": "captureWallet",
                "signature": signature,
            }))
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("MoMo API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!("MoMo API error: {}", error_text)));
        }

        let order: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse MoMo response: {}", e)))?;

        Ok(StartOutcome {
            redirect_url: order.pay_url,
            provider_ref: order.order_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MoMoIpn {
    #[serde(rename = "orderId")]
    order_id: Option<String>,
    #[serde(rename = "resultCode")]
    result_code: Option<i64>,
}

impl WebhookAdapter for MoMoClient {
    fn provider_name(&self) -> &'static str {
        "momo"
    }

    fn signature_header(&self) -> &'static str {
        "x-momo-signature"
    }

    fn verify_signature(&self, body: &[u8], signature: &str) -> Result<bool> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|_| AppError::Internal("Invalid MoMo secret key".into()))?;
        mac.update(body);
        let expected = hex::encode(mac.finalize().into_bytes());
        Ok(constant_time_hex_eq(&expected, signature))
    }

    fn parse_webhook(&self, body: &[u8]) -> std::result::Result<WebhookNotice, WebhookParseError> {
        let ipn: MoMoIpn =
            serde_json::from_slice(body).map_err(|_| WebhookParseError::InvalidJson)?;

        let provider_ref = ipn
            .order_id
            .filter(|r| !r.is_empty())
            .ok_or(WebhookParseError::MissingField("orderId"))?;
        let result_code = ipn
            .result_code
            .ok_or(WebhookParseError::MissingField("resultCode"))?;

        Ok(WebhookNotice {
            provider_ref,
            paid: result_code == RESULT_CODE_OK,
        })
    }
}
