use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable, user-facing reason strings.
///
/// Callers map these to localized messages; anything not listed here is
/// reported as `UNKNOWN_ERROR` with the real cause logged internally.
pub mod msg {
    pub const PRICE_NOT_AVAILABLE: &str = "PRICE_NOT_AVAILABLE";
    pub const INVALID_PROVIDER: &str = "INVALID_PROVIDER";
    pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
    pub const PAYMENT_NOT_FOUND: &str = "PAYMENT_NOT_FOUND";
    pub const PAYMENT_NOT_REFUNDABLE: &str = "PAYMENT_NOT_REFUNDABLE";
    pub const REFUND_EXCEEDS_PAID: &str = "REFUND_EXCEEDS_PAID";
    pub const INVALID_TOKEN: &str = "INVALID_TOKEN";
    pub const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rej: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest(rej.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for AppError {
    fn from(rej: axum::extract::rejection::QueryRejection) -> Self {
        AppError::BadRequest(rej.body_text())
    }
}

impl From<axum::extract::rejection::PathRejection> for AppError {
    fn from(rej: axum::extract::rejection::PathRejection) -> Self {
        AppError::BadRequest(rej.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "Forbidden", Some(msg.clone())),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg.clone())),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::UNKNOWN_ERROR, None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::UNKNOWN_ERROR, None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::UNKNOWN_ERROR, None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Convenience for turning `Option<T>` lookups into `NotFound` errors.
pub trait OptionExt<T> {
    fn or_not_found(self, msg: &str) -> Result<T>;
    fn or_bad_request(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(msg.to_string()))
    }

    fn or_bad_request(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AppError::BadRequest(msg.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
