//! Signed, time-limited tokens for the notification-preferences page.
//!
//! Preference links land in emails, so the page is reachable without a
//! session: the token itself proves who is asking. Format is
//! `base64url(user_id|exp) . hex(HMAC-SHA256(key, user_id|exp))`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{msg, AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Default validity for preference links.
pub const DEFAULT_TTL_SECS: i64 = 7 * 86400;

fn sign(key: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|_| AppError::Internal("Invalid token key".into()))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Issue a token for `user_id` valid until `now + ttl_secs`.
pub fn issue(key: &str, user_id: &str, ttl_secs: i64) -> Result<String> {
    let exp = chrono::Utc::now().timestamp() + ttl_secs;
    let payload = format!("{}|{}", user_id, exp);
    let sig = sign(key, &payload)?;
    Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(&payload), sig))
}

/// Verify a token and return the embedded user id.
///
/// Signature is checked in constant time before expiry, so the two failure
/// modes are distinguishable to the caller but not probe-able by timing.
pub fn verify(key: &str, token: &str) -> Result<String> {
    let invalid = || AppError::Unauthorized;

    let (encoded, provided_sig) = token.split_once('.').ok_or_else(invalid)?;
    let payload_bytes = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| invalid())?;
    let payload = String::from_utf8(payload_bytes).map_err(|_| invalid())?;

    let expected_sig = sign(key, &payload)?;
    let matches: bool = expected_sig
        .as_bytes()
        .ct_eq(provided_sig.as_bytes())
        .into();
    if !matches {
        tracing::warn!("Preferences token signature mismatch");
        return Err(AppError::Forbidden(msg::INVALID_TOKEN.to_string()));
    }

    let (user_id, exp) = payload.split_once('|').ok_or_else(invalid)?;
    let exp: i64 = exp.parse().map_err(|_| invalid())?;
    if exp <= chrono::Utc::now().timestamp() {
        return Err(AppError::Forbidden(msg::TOKEN_EXPIRED.to_string()));
    }

    Ok(user_id.to_string())
}
