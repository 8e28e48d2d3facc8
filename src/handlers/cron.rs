//! Cron-trigger endpoints.
//!
//! castbill owns no scheduler: an external timer (systemd timer, k8s
//! CronJob) POSTs these with the shared secret. Every sweep is guarded
//! server-side - a persisted watermark for the reminder scan, conditional
//! updates everywhere else - so overlapping or over-eager triggers from
//! multiple schedulers stay harmless.

use axum::extract::State;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::config::{REMINDER_LEAD_DAYS, REMINDER_MIN_INTERVAL_SECS};
use crate::db::{queries, AppState};
use crate::enforcement;
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::models::{AuditAction, NotificationEvent, NotificationKind};
use crate::notify;

const DEFAULT_BATCH_SIZE: usize = 50;
const SWEEP_DRAIN_LIMIT: usize = 256;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationsSweepParams {
    pub batch_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct NotificationsSweepResponse {
    pub processed: usize,
}

/// POST /internal/cron/notifications - drain due delivery jobs.
/// Batch size comes from the query string so the trigger can POST an
/// empty body.
pub async fn run_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(request): Query<NotificationsSweepParams>,
) -> Result<Json<NotificationsSweepResponse>> {
    super::require_internal_secret(&state.config, &headers)?;

    let batch = request.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
    let processed =
        notify::process_due_jobs(&state.db, &state.config, state.mailer.as_ref(), batch).await?;

    tracing::info!(processed, "Notification sweep done");
    Ok(Json(NotificationsSweepResponse { processed }))
}

#[derive(Debug, Serialize)]
pub struct RemindersResponse {
    /// False when the watermark was claimed too recently and the sweep was
    /// skipped entirely.
    pub claimed: bool,
    pub enqueued: usize,
}

/// POST /internal/cron/subscription-reminders - enqueue expiry reminders
/// for subscriptions ending within the lead window.
pub async fn run_subscription_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RemindersResponse>> {
    super::require_internal_secret(&state.config, &headers)?;

    let conn = state.db.get()?;
    if !queries::try_claim_watermark(&conn, "subscription_reminders", REMINDER_MIN_INTERVAL_SECS)? {
        tracing::debug!("Reminder sweep skipped, watermark too recent");
        return Ok(Json(RemindersResponse {
            claimed: false,
            enqueued: 0,
        }));
    }

    let lead_secs = REMINDER_LEAD_DAYS * 86400;
    let ending = queries::subscriptions_ending_within(&conn, lead_secs)?;
    let mut enqueued = 0;
    for sub in &ending {
        let days_left = ((sub.ends_at - chrono::Utc::now().timestamp()) / 86400).max(0);
        let event = NotificationEvent {
            user_id: sub.user_id.clone(),
            kind: NotificationKind::SubscriptionExpiring,
            email: None,
            subject: "Gói đăng hồ sơ sắp hết hạn".to_string(),
            body: format!(
                "Gói đăng hồ sơ của bạn sẽ hết hạn sau {} ngày. Gia hạn để hồ sơ \
                 không bị ẩn.",
                days_left
            ),
            // One reminder per subscription per period: the scope pins the
            // current ends_at, the window covers the whole lead window.
            dedupe_scope: format!("{}:{}", sub.id, sub.ends_at),
        };
        if let notify::EnqueueOutcome::Enqueued { .. } =
            notify::notify_once_within(&conn, &state.config, &event, lead_secs + 86400)?
        {
            enqueued += 1;
        }
    }

    tracing::info!(
        candidates = ending.len(),
        enqueued,
        "Subscription reminder sweep done"
    );
    Ok(Json(RemindersResponse {
        claimed: true,
        enqueued,
    }))
}

#[derive(Debug, Serialize)]
pub struct ExpireSessionsResponse {
    pub expired: usize,
    pub synced: usize,
}

/// POST /internal/cron/expire-sessions - garbage-collect abandoned checkout
/// sessions and re-run the sync backlog as the eventual-consistency net.
pub async fn run_expire_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ExpireSessionsResponse>> {
    super::require_internal_secret(&state.config, &headers)?;

    let conn = state.db.get()?;
    let stale = queries::expire_stale_sessions(&conn, state.config.session_ttl_secs)?;
    for session in &stale {
        queries::create_audit_event(
            &conn,
            &session.user_id,
            AuditAction::SessionExpired,
            Some(&serde_json::json!({ "session_id": session.id })),
        )?;
    }

    let synced = enforcement::drain_sync_backlog(&conn, &state.config, SWEEP_DRAIN_LIMIT)?;

    if !stale.is_empty() || synced > 0 {
        tracing::info!(expired = stale.len(), synced, "Session expiry sweep done");
    }
    Ok(Json(ExpireSessionsResponse {
        expired: stale.len(),
        synced,
    }))
}
