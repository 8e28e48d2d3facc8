//! Notification dispatcher and retry queue.
//!
//! Upstream components (reconciler, enforcement, refunds, reminder sweep)
//! emit `NotificationEvent`s through [`notify_once`], which deduplicates by
//! content hash, writes the in-app row synchronously, and defers email to
//! the job queue. Jobs are drained by [`process_due_jobs`], with exponential
//! backoff on transient failure and a terminal FAILED state once attempts
//! are exhausted.

use std::future::Future;
use std::pin::Pin;

use reqwest::Client;
use rusqlite::Connection;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::db::{queries, DbPool};
use crate::error::{AppError, Result};
use crate::models::{Channel, JobStatus, MessageLogStatus, NotificationEvent, NotificationJob};

/// Boxed send future, so `Mailer` stays object-safe behind `Arc<dyn Mailer>`.
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Email delivery seam. Production wires [`EmailService`]; tests substitute
/// a recording mock to assert on delivery without network access.
pub trait Mailer: Send + Sync {
    fn send<'a>(&'a self, recipient: &'a str, subject: &'a str, body: &'a str) -> SendFuture<'a>;
}

/// Content hash identifying "the same notification": two events collapse
/// when user, kind, and scope all match inside the dedupe window.
pub fn dedupe_hash(user_id: &str, kind: &str, scope: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b"|");
    hasher.update(kind.as_bytes());
    hasher.update(b"|");
    hasher.update(scope.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued { log_id: String },
    Deduplicated,
}

/// Enqueue a notification exactly once per dedupe window.
///
/// The message-log insert is the atomic claim: whichever caller wins it
/// creates the delivery jobs, every other caller sees `Deduplicated` and
/// writes nothing. Safe to call from concurrent webhook deliveries.
pub fn notify_once(
    conn: &Connection,
    config: &Config,
    event: &NotificationEvent,
) -> Result<EnqueueOutcome> {
    notify_once_within(conn, config, event, config.dedupe_window_secs)
}

/// [`notify_once`] with an explicit dedupe window, for events whose natural
/// repeat horizon is wider than the global setting (expiry reminders fire
/// once per period, not once per ten minutes).
pub fn notify_once_within(
    conn: &Connection,
    config: &Config,
    event: &NotificationEvent,
    window_secs: i64,
) -> Result<EnqueueOutcome> {
    let hash = dedupe_hash(&event.user_id, event.kind.as_str(), &event.dedupe_scope);

    let log_id = match queries::insert_message_log_if_absent(
        conn,
        &hash,
        &event.user_id,
        event.kind,
        window_secs,
    )? {
        Some(id) => id,
        None => {
            tracing::debug!(
                user_id = %event.user_id,
                kind = event.kind.as_str(),
                "Duplicate notification suppressed"
            );
            return Ok(EnqueueOutcome::Deduplicated);
        }
    };

    let prefs = queries::get_notification_prefs(conn, &event.user_id)?;

    // In-app is a local insert, done here and now; only email crosses a
    // network boundary and goes through the retry queue.
    if prefs.inapp_enabled {
        queries::insert_inapp_notification(conn, &event.user_id, event.kind, &event.body)?;
    }

    let recipient = event.email.as_deref().or(prefs.email.as_deref());
    let mut deferred = false;
    if prefs.email_enabled {
        if let Some(email) = recipient {
            queries::create_notification_job(
                conn,
                &log_id,
                Channel::Email,
                email,
                &event.subject,
                &event.body,
                config.max_delivery_attempts,
            )?;
            deferred = true;
        }
    }

    // Nothing deferred means delivery is already complete (or fully opted
    // out); either way the log row keeps deduplicating for the window.
    if !deferred {
        queries::set_message_log_status(conn, &log_id, MessageLogStatus::Sent)?;
    }

    tracing::info!(
        user_id = %event.user_id,
        kind = event.kind.as_str(),
        deferred,
        "Notification enqueued"
    );

    Ok(EnqueueOutcome::Enqueued { log_id })
}

#[derive(Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Delivered,
    Rescheduled { run_at: i64 },
    Exhausted,
    /// Not PENDING, or not yet due. Nothing was attempted or written.
    Skipped,
}

/// Attempt delivery of a single job.
///
/// Completed, failed, and not-yet-due jobs are skipped untouched. Success
/// completes the job and marks its message log SENT. Failure reschedules
/// with exponential backoff until `max_attempts`, then parks the job FAILED
/// and the log FAILED for operator attention.
pub async fn process_job(
    db: &DbPool,
    config: &Config,
    mailer: &dyn Mailer,
    job: &NotificationJob,
) -> Result<JobOutcome> {
    if job.status != JobStatus::Pending || job.run_at > chrono::Utc::now().timestamp() {
        return Ok(JobOutcome::Skipped);
    }

    let delivery = match job.channel {
        Channel::Email => mailer.send(&job.recipient, &job.subject, &job.body).await,
        Channel::Inapp => deliver_inapp(db, job),
    };

    let conn = db.get()?;
    match delivery {
        Ok(()) => {
            queries::mark_job_completed(&conn, &job.id)?;
            queries::set_message_log_status(&conn, &job.log_id, MessageLogStatus::Sent)?;
            Ok(JobOutcome::Delivered)
        }
        Err(e) => {
            let attempts = job.attempts + 1;
            if attempts >= job.max_attempts {
                tracing::error!(
                    job_id = %job.id,
                    channel = job.channel.as_str(),
                    attempts,
                    error = %e,
                    "Notification delivery exhausted"
                );
                queries::mark_job_failed(&conn, &job.id, attempts)?;
                queries::set_message_log_status(&conn, &job.log_id, MessageLogStatus::Failed)?;
                Ok(JobOutcome::Exhausted)
            } else {
                // base, 2*base, 4*base, ... per completed attempt; the
                // exponent is capped so large max-attempt settings cannot
                // overflow the shift.
                let delay = config.retry_base_secs << (attempts - 1).min(16);
                let run_at = chrono::Utc::now().timestamp() + delay;
                tracing::warn!(
                    job_id = %job.id,
                    channel = job.channel.as_str(),
                    attempts,
                    retry_in_secs = delay,
                    error = %e,
                    "Notification delivery failed, rescheduled"
                );
                queries::reschedule_job(&conn, &job.id, attempts, run_at)?;
                Ok(JobOutcome::Rescheduled { run_at })
            }
        }
    }
}

fn deliver_inapp(db: &DbPool, job: &NotificationJob) -> Result<()> {
    let conn = db.get()?;
    let log = queries::get_message_log(&conn, &job.log_id)?
        .ok_or_else(|| AppError::Internal(format!("Message log {} vanished", job.log_id)))?;
    queries::insert_inapp_notification(&conn, &job.recipient, log.kind, &job.body)?;
    Ok(())
}

/// Drain one batch of due jobs. Returns the number delivered.
pub async fn process_due_jobs(
    db: &DbPool,
    config: &Config,
    mailer: &dyn Mailer,
    batch_size: usize,
) -> Result<usize> {
    let jobs = {
        let conn = db.get()?;
        queries::due_notification_jobs(&conn, batch_size)?
    };

    let mut delivered = 0;
    for job in &jobs {
        match process_job(db, config, mailer, job).await {
            Ok(JobOutcome::Delivered) => delivered += 1,
            Ok(_) => {}
            Err(e) => {
                // A broken job must not stall the rest of the batch.
                tracing::error!(job_id = %job.id, error = %e, "Job processing error");
            }
        }
    }
    Ok(delivered)
}

#[derive(Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

/// Production mailer: Resend when an API key is configured, otherwise a
/// log-and-succeed no-op for local development.
pub struct EmailService {
    api_key: Option<String>,
    from: String,
    client: Client,
}

impl EmailService {
    pub fn new(config: &Config) -> Self {
        Self {
            api_key: config.resend_api_key.clone(),
            from: config.email_from.clone(),
            client: Client::builder()
                .timeout(config.outbound_timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    async fn deliver(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        let Some(api_key) = &self.api_key else {
            tracing::info!(to = %recipient, subject, "Email delivery disabled, dropping");
            return Ok(());
        };

        let request = ResendEmailRequest {
            from: &self.from,
            to: [recipient],
            subject,
            text: body,
        };

        let response = self
            .client
            .post("https://api.resend.com/emails")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Email service error: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(to = %recipient, "Email sent");
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(AppError::Internal(format!(
                "Email service returned {}: {}",
                status, text
            )))
        }
    }
}

impl Mailer for EmailService {
    fn send<'a>(&'a self, recipient: &'a str, subject: &'a str, body: &'a str) -> SendFuture<'a> {
        Box::pin(self.deliver(recipient, subject, body))
    }
}
