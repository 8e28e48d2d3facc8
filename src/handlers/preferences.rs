//! Notification preferences, reachable through a signed link - no session.

use axum::extract::State;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::models::{NotificationPrefs, UpdateNotificationPrefs};
use crate::token;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

/// GET /notifications/preferences?token=…
pub async fn get_preferences(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<NotificationPrefs>> {
    let user_id = token::verify(&state.config.token_key, &query.token)?;
    let conn = state.db.get()?;
    let prefs = queries::get_notification_prefs(&conn, &user_id)?;
    Ok(Json(prefs))
}

/// PUT /notifications/preferences?token=… - partial update, omitted fields
/// keep their current value.
pub async fn update_preferences(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    Json(update): Json<UpdateNotificationPrefs>,
) -> Result<Json<NotificationPrefs>> {
    let user_id = token::verify(&state.config.token_key, &query.token)?;
    let conn = state.db.get()?;

    let current = queries::get_notification_prefs(&conn, &user_id)?;
    let prefs = queries::upsert_notification_prefs(
        &conn,
        &user_id,
        update.email.as_deref().or(current.email.as_deref()),
        update.email_enabled.unwrap_or(current.email_enabled),
        update.inapp_enabled.unwrap_or(current.inapp_enabled),
    )?;

    tracing::info!(user_id = %user_id, "Notification preferences updated");
    Ok(Json(prefs))
}

#[derive(Debug, Deserialize)]
pub struct IssueTokenRequest {
    pub user_id: String,
    /// Validity in seconds; defaults to a week.
    pub ttl_secs: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct IssueTokenResponse {
    pub token: String,
    pub url: String,
}

/// POST /internal/preferences-token - mint a signed preferences link, for
/// embedding in outbound email.
pub async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IssueTokenRequest>,
) -> Result<Json<IssueTokenResponse>> {
    super::require_internal_secret(&state.config, &headers)?;

    let ttl = request.ttl_secs.unwrap_or(token::DEFAULT_TTL_SECS);
    let token = token::issue(&state.config.token_key, &request.user_id, ttl)?;
    let url = format!(
        "{}/notifications/preferences?token={}",
        state.config.base_url, token
    );
    Ok(Json(IssueTokenResponse { token, url }))
}
