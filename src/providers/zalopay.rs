use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;

use crate::config::ZaloPayConfig;
use crate::error::{AppError, Result};

use super::{
    constant_time_hex_eq, http_client, StartArgs, StartOutcome, WebhookAdapter, WebhookNotice,
    WebhookParseError,
};

type HmacSha256 = Hmac<Sha256>;

const CREATE_URL: &str = "https://openapi.zalopay.vn/v2/create";

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    return_code: i64,
    return_message: Option<String>,
    order_url: Option<String>,
}

/// ZaloPay adapter. Orders are created through the open API with an
/// HMAC-SHA256 "mac" over pipe-joined fields; callbacks carry the same mac.
#[derive(Debug, Clone)]
pub struct ZaloPayClient {
    client: Client,
    app_id: String,
    key1: String,
}

impl ZaloPayClient {
    pub fn new(config: &ZaloPayConfig, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            app_id: config.app_id.clone(),
            key1: config.key1.clone(),
        }
    }

    fn mac(&self, data: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.key1.as_bytes())
            .map_err(|_| AppError::Internal("Invalid ZaloPay key".into()))?;
        mac.update(data.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Create a ZaloPay order and return the hosted payment URL.
    pub async fn start(&self, args: StartArgs<'_>) -> Result<StartOutcome> {
        let app_trans_id = args.session_id;
        let app_time = chrono::Utc::now().timestamp_millis();

        // mac input order: app_id|app_trans_id|app_user|amount|app_time|embed_data|item
        let mac_data = format!(
            "{}|{}|castbill|{}|{}|{{}}|[]",
            self.app_id, app_trans_id, args.amount, app_time
        );
        let mac = self.mac(&mac_data)?;

        let response = self
            .client
            .post(CREATE_URL)
            .form(&[
                ("app_id", self.app_id.as_str()),
                ("app_trans_id", app_trans_id),
                ("app_user", "castbill"),
                ("amount", &args.amount.to_string()),
                ("app_time", &app_time.to_string()),
                ("embed_data", "{}"),
                ("item", "[]"),
                ("description", args.order_info),
                ("callback_url", args.notify_url),
                ("redirect_url", args.return_url),
                ("mac", &mac),
            ])
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("ZaloPay API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "ZaloPay API error: {}",
                error_text
            )));
        }

        let order: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse ZaloPay response: {}", e)))?;

        if order.return_code != 1 {
            return Err(AppError::Internal(format!(
                "ZaloPay create order rejected: {}",
                order.return_message.unwrap_or_default()
            )));
        }

        let redirect_url = order
            .order_url
            .ok_or_else(|| AppError::Internal("ZaloPay response missing order_url".into()))?;

        Ok(StartOutcome {
            redirect_url,
            provider_ref: app_trans_id.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ZaloPayCallback {
    app_trans_id: Option<String>,
    /// 1 = paid; ZaloPay only calls back on success, but the simulation
    /// path can post failures too.
    status: Option<i64>,
}

impl WebhookAdapter for ZaloPayClient {
    fn provider_name(&self) -> &'static str {
        "zalopay"
    }

    fn signature_header(&self) -> &'static str {
        "x-zalopay-mac"
    }

    fn verify_signature(&self, body: &[u8], signature: &str) -> Result<bool> {
        let mut mac = HmacSha256::new_from_slice(self.key1.as_bytes())
            .map_err(|_| AppError::Internal("Invalid ZaloPay key".into()))?;
        mac.update(body);
        let expected = hex::encode(mac.finalize().into_bytes());
        Ok(constant_time_hex_eq(&expected, signature))
    }

    fn parse_webhook(&self, body: &[u8]) -> std::result::Result<WebhookNotice, WebhookParseError> {
        let cb: ZaloPayCallback =
            serde_json::from_slice(body).map_err(|_| WebhookParseError::InvalidJson)?;

        let provider_ref = cb
            .app_trans_id
            .filter(|r| !r.is_empty())
            .ok_or(WebhookParseError::MissingField("app_trans_id"))?;
        let status = cb.status.ok_or(WebhookParseError::MissingField("status"))?;

        Ok(WebhookNotice {
            provider_ref,
            paid: status == 1,
        })
    }
}
