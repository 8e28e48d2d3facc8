use chrono::{Datelike, Utc};
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::id::EntityType;
use crate::models::*;

use super::from_row::{
    query_all, query_one, AUDIT_EVENT_COLS, ENTITLEMENT_COLS, INVOICE_COLS, JOB_COLS,
    MESSAGE_LOG_COLS, PAYMENT_COLS, PREFS_COLS, PRICE_COLS, PROFILE_COLS, SESSION_COLS,
    SUBSCRIPTION_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

// ============ Prices ============

pub fn create_price(conn: &Connection, input: &CreatePrice) -> Result<Price> {
    let id = EntityType::Price.gen_id();
    let created_at = now();
    conn.execute(
        "INSERT INTO prices (id, entitlement_key, plan_id, amount, currency, period_days, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &id,
            &input.entitlement_key,
            &input.plan_id,
            input.amount,
            &input.currency,
            input.period_days,
            input.active,
            created_at
        ],
    )?;
    Ok(Price {
        id,
        entitlement_key: input.entitlement_key.clone(),
        plan_id: input.plan_id.clone(),
        amount: input.amount,
        currency: input.currency.clone(),
        period_days: input.period_days,
        active: input.active,
        created_at,
    })
}

pub fn get_price(conn: &Connection, id: &str) -> Result<Option<Price>> {
    query_one(
        conn,
        &format!("SELECT {} FROM prices WHERE id = ?1", PRICE_COLS),
        &[&id],
    )
}

// ============ Checkout sessions ============

pub fn get_checkout_session(conn: &Connection, id: &str) -> Result<Option<CheckoutSession>> {
    query_one(
        conn,
        &format!("SELECT {} FROM checkout_sessions WHERE id = ?1", SESSION_COLS),
        &[&id],
    )
}

/// Set a session's status only while it is still non-terminal.
/// Returns whether the row was updated.
pub fn advance_checkout_session(
    conn: &Connection,
    id: &str,
    status: CheckoutStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE checkout_sessions SET status = ?1, updated_at = ?2
         WHERE id = ?3 AND status IN ('started', 'pending')",
        params![status.as_str(), now(), id],
    )?;
    Ok(affected > 0)
}

/// Mark non-terminal sessions older than `ttl_secs` as expired.
/// Returns the sessions actually swept, for audit logging. Each row is
/// expired through the same non-terminal guard as
/// [`advance_checkout_session`], so a webhook settling a listed session
/// between the scan and the update wins and the session is skipped.
pub fn expire_stale_sessions(conn: &Connection, ttl_secs: i64) -> Result<Vec<CheckoutSession>> {
    let cutoff = now() - ttl_secs;
    let stale: Vec<CheckoutSession> = query_all(
        conn,
        &format!(
            "SELECT {} FROM checkout_sessions
             WHERE status IN ('started', 'pending') AND created_at < ?1",
            SESSION_COLS
        ),
        &[&cutoff],
    )?;
    let mut swept = Vec::with_capacity(stale.len());
    for session in stale {
        if advance_checkout_session(conn, &session.id, CheckoutStatus::Expired)? {
            swept.push(session);
        }
    }
    Ok(swept)
}

// ============ Payments ============

pub fn get_payment(conn: &Connection, id: &str) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLS),
        &[&id],
    )
}

pub fn get_payment_by_provider_ref(
    conn: &Connection,
    provider: &str,
    provider_ref: &str,
) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payments WHERE provider = ?1 AND provider_ref = ?2",
            PAYMENT_COLS
        ),
        &[&provider, &provider_ref],
    )
}

/// Atomically settle a pending payment to PAID or FAILED.
///
/// The `status = 'pending'` guard is the idempotency barrier: a redelivered
/// or concurrently-arriving webhook finds zero affected rows and becomes a
/// no-op, without deduplicating on message id.
pub fn try_settle_payment(conn: &Connection, payment_id: &str, paid: bool) -> Result<bool> {
    let status = if paid {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Failed
    };
    let affected = conn.execute(
        "UPDATE payments SET status = ?1, updated_at = ?2
         WHERE id = ?3 AND status = 'pending'",
        params![status.as_str(), now(), payment_id],
    )?;
    Ok(affected > 0)
}

pub fn set_payment_refund_status(
    conn: &Connection,
    payment_id: &str,
    status: PaymentStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payments SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now(), payment_id],
    )?;
    Ok(affected > 0)
}

// ============ Invoices ============

pub fn get_sale_invoice_for_payment(
    conn: &Connection,
    payment_id: &str,
) -> Result<Option<Invoice>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM invoices WHERE payment_id = ?1 AND kind = 'sale'",
            INVOICE_COLS
        ),
        &[&payment_id],
    )
}

pub fn list_invoices_for_payment(conn: &Connection, payment_id: &str) -> Result<Vec<Invoice>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM invoices WHERE payment_id = ?1 ORDER BY created_at",
            INVOICE_COLS
        ),
        &[&payment_id],
    )
}

/// Sum of finalized SALE totals for a payment.
pub fn sale_total_for_payment(conn: &Connection, payment_id: &str) -> Result<i64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(total), 0) FROM invoices
         WHERE payment_id = ?1 AND kind = 'sale' AND status = 'paid'",
        params![payment_id],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Absolute sum of prior REFUND totals for a payment.
pub fn refunded_total_for_payment(conn: &Connection, payment_id: &str) -> Result<i64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(-SUM(total), 0) FROM invoices
         WHERE payment_id = ?1 AND kind = 'refund'",
        params![payment_id],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Next invoice number from the per-year counter. Atomic within the caller's
/// transaction: the counter row is claimed with an upsert before being read.
pub fn next_invoice_number(conn: &Connection) -> Result<String> {
    let year = Utc::now().year();
    conn.execute(
        "INSERT INTO invoice_counters (year, next_seq) VALUES (?1, 2)
         ON CONFLICT(year) DO UPDATE SET next_seq = next_seq + 1",
        params![year],
    )?;
    let seq: i64 = conn.query_row(
        "SELECT next_seq - 1 FROM invoice_counters WHERE year = ?1",
        params![year],
        |row| row.get(0),
    )?;
    Ok(format!("CB-{}-{:06}", year, seq))
}

/// Finalize an OPEN invoice: assign its number and issue date, mark PAID.
/// Returns the assigned number, or None if the invoice was not OPEN.
pub fn finalize_invoice(conn: &Connection, invoice_id: &str) -> Result<Option<String>> {
    let number = next_invoice_number(conn)?;
    let affected = conn.execute(
        "UPDATE invoices SET status = 'paid', number = ?1, issued_at = ?2
         WHERE id = ?3 AND status = 'open'",
        params![&number, now(), invoice_id],
    )?;
    Ok(if affected > 0 { Some(number) } else { None })
}

/// Insert a REFUND invoice (negative total), finalized immediately.
pub fn create_refund_invoice(
    conn: &Connection,
    payment_id: &str,
    user_id: &str,
    amount: i64,
    currency: &str,
) -> Result<Invoice> {
    let id = EntityType::Invoice.gen_id();
    let number = next_invoice_number(conn)?;
    let created_at = now();
    conn.execute(
        "INSERT INTO invoices (id, payment_id, user_id, kind, total, currency, status, number, issued_at, created_at)
         VALUES (?1, ?2, ?3, 'refund', ?4, ?5, 'refunded', ?6, ?7, ?8)",
        params![&id, payment_id, user_id, -amount, currency, &number, created_at, created_at],
    )?;
    Ok(Invoice {
        id,
        payment_id: Some(payment_id.to_string()),
        user_id: user_id.to_string(),
        kind: InvoiceKind::Refund,
        total: -amount,
        currency: currency.to_string(),
        status: InvoiceStatus::Refunded,
        number: Some(number),
        issued_at: Some(created_at),
        created_at,
    })
}

// ============ Subscriptions ============

pub fn get_subscriptions_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Subscription>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE user_id = ?1",
            SUBSCRIPTION_COLS
        ),
        &[&user_id],
    )
}

pub fn get_subscription(conn: &Connection, user_id: &str, plan_id: &str) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE user_id = ?1 AND plan_id = ?2",
            SUBSCRIPTION_COLS
        ),
        &[&user_id, &plan_id],
    )
}

/// Apply a paid billing period: create the subscription or extend it from
/// max(now, current ends_at). A payment on a canceled/expired plan revives it.
pub fn apply_paid_period(
    conn: &Connection,
    user_id: &str,
    plan_id: &str,
    period_days: i64,
) -> Result<Subscription> {
    let ts = now();
    let extension = period_days * 86400;

    let existing = get_subscription(conn, user_id, plan_id)?;
    match existing {
        Some(sub) => {
            let base = sub.ends_at.max(ts);
            let ends_at = base + extension;
            conn.execute(
                "UPDATE subscriptions SET status = 'active', cancel_at_period_end = 0, ends_at = ?1
                 WHERE id = ?2",
                params![ends_at, &sub.id],
            )?;
            Ok(Subscription {
                status: SubscriptionStatus::Active,
                cancel_at_period_end: false,
                ends_at,
                ..sub
            })
        }
        None => {
            let id = EntityType::Subscription.gen_id();
            let ends_at = ts + extension;
            conn.execute(
                "INSERT INTO subscriptions (id, user_id, plan_id, status, cancel_at_period_end, started_at, ends_at)
                 VALUES (?1, ?2, ?3, 'active', 0, ?4, ?5)",
                params![&id, user_id, plan_id, ts, ends_at],
            )?;
            Ok(Subscription {
                id,
                user_id: user_id.to_string(),
                plan_id: plan_id.to_string(),
                status: SubscriptionStatus::Active,
                cancel_at_period_end: false,
                started_at: ts,
                ends_at,
            })
        }
    }
}

/// Force a subscription into the expired state (full refund path).
pub fn expire_subscription(conn: &Connection, subscription_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE subscriptions SET status = 'expired', ends_at = ?1 WHERE id = ?2",
        params![now(), subscription_id],
    )?;
    Ok(affected > 0)
}

/// Live subscriptions ending within the lead window (for expiry reminders).
pub fn subscriptions_ending_within(conn: &Connection, lead_secs: i64) -> Result<Vec<Subscription>> {
    let ts = now();
    query_all(
        conn,
        &format!(
            "SELECT {} FROM subscriptions
             WHERE status IN ('active', 'renewing') AND ends_at > ?1 AND ends_at <= ?2",
            SUBSCRIPTION_COLS
        ),
        &[&ts, &(ts + lead_secs)],
    )
}

// ============ Entitlements ============

pub fn get_entitlement(conn: &Connection, user_id: &str, key: &str) -> Result<Option<Entitlement>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM entitlements WHERE user_id = ?1 AND key = ?2",
            ENTITLEMENT_COLS
        ),
        &[&user_id, &key],
    )
}

/// Upsert a single (user, key) entitlement row. Last writer wins; the
/// synchronizer reads inputs fresh each call so this is race-tolerant.
pub fn upsert_entitlement(
    conn: &Connection,
    user_id: &str,
    key: &str,
    expires_at: Option<i64>,
) -> Result<()> {
    let ts = now();
    conn.execute(
        "INSERT INTO entitlements (user_id, key, expires_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(user_id, key) DO UPDATE SET expires_at = ?3, updated_at = ?4",
        params![user_id, key, expires_at, ts],
    )?;
    Ok(())
}

// ============ Profiles ============

pub fn get_profile(conn: &Connection, user_id: &str) -> Result<Option<Profile>> {
    query_one(
        conn,
        &format!("SELECT {} FROM profiles WHERE user_id = ?1", PROFILE_COLS),
        &[&user_id],
    )
}

pub fn upsert_profile(conn: &Connection, profile: &Profile) -> Result<()> {
    conn.execute(
        "INSERT INTO profiles (user_id, visibility, approved, published_at, unpublished_reason)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
             visibility = ?2, approved = ?3, published_at = ?4, unpublished_reason = ?5",
        params![
            &profile.user_id,
            profile.visibility.as_str(),
            profile.approved,
            profile.published_at,
            &profile.unpublished_reason
        ],
    )?;
    Ok(())
}

pub fn set_profile_private(conn: &Connection, user_id: &str, reason: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE profiles SET visibility = 'private', unpublished_reason = ?1
         WHERE user_id = ?2 AND visibility = 'public'",
        params![reason, user_id],
    )?;
    Ok(affected > 0)
}

pub fn set_profile_public(conn: &Connection, user_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE profiles SET visibility = 'public', published_at = ?1, unpublished_reason = NULL
         WHERE user_id = ?2 AND visibility = 'private' AND approved = 1",
        params![now(), user_id],
    )?;
    Ok(affected > 0)
}

// ============ Notification message log ============

/// Atomically insert a message-log row unless a row with the same dedupe
/// hash exists inside the window. Returns the new log id, or None on dedupe.
pub fn insert_message_log_if_absent(
    conn: &Connection,
    dedupe_hash: &str,
    user_id: &str,
    kind: NotificationKind,
    window_secs: i64,
) -> Result<Option<String>> {
    let id = EntityType::MessageLog.gen_id();
    let ts = now();
    let affected = conn.execute(
        "INSERT INTO notification_message_log (id, dedupe_hash, user_id, kind, status, created_at)
         SELECT ?1, ?2, ?3, ?4, 'queued', ?5
         WHERE NOT EXISTS (
             SELECT 1 FROM notification_message_log
             WHERE dedupe_hash = ?2 AND created_at > ?6
         )",
        params![&id, dedupe_hash, user_id, kind.as_str(), ts, ts - window_secs],
    )?;
    Ok(if affected > 0 { Some(id) } else { None })
}

pub fn get_message_log(conn: &Connection, id: &str) -> Result<Option<MessageLog>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM notification_message_log WHERE id = ?1",
            MESSAGE_LOG_COLS
        ),
        &[&id],
    )
}

pub fn set_message_log_status(
    conn: &Connection,
    id: &str,
    status: MessageLogStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE notification_message_log SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    Ok(affected > 0)
}

pub fn count_message_logs_for_hash(conn: &Connection, dedupe_hash: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notification_message_log WHERE dedupe_hash = ?1",
        params![dedupe_hash],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============ Notification jobs ============

pub fn create_notification_job(
    conn: &Connection,
    log_id: &str,
    channel: Channel,
    recipient: &str,
    subject: &str,
    body: &str,
    max_attempts: i64,
) -> Result<NotificationJob> {
    let id = EntityType::NotificationJob.gen_id();
    let ts = now();
    conn.execute(
        "INSERT INTO notification_jobs
         (id, log_id, channel, recipient, subject, body, status, attempts, max_attempts, run_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 0, ?7, ?8, ?8, ?8)",
        params![&id, log_id, channel.as_str(), recipient, subject, body, max_attempts, ts],
    )?;
    Ok(NotificationJob {
        id,
        log_id: log_id.to_string(),
        channel,
        recipient: recipient.to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        status: JobStatus::Pending,
        attempts: 0,
        max_attempts,
        run_at: ts,
        created_at: ts,
        updated_at: ts,
    })
}

pub fn get_notification_job(conn: &Connection, id: &str) -> Result<Option<NotificationJob>> {
    query_one(
        conn,
        &format!("SELECT {} FROM notification_jobs WHERE id = ?1", JOB_COLS),
        &[&id],
    )
}

/// PENDING jobs that are due, oldest first.
pub fn due_notification_jobs(conn: &Connection, batch_size: usize) -> Result<Vec<NotificationJob>> {
    let ts = now();
    let limit = batch_size as i64;
    query_all(
        conn,
        &format!(
            "SELECT {} FROM notification_jobs
             WHERE status = 'pending' AND run_at <= ?1
             ORDER BY run_at ASC, created_at ASC LIMIT ?2",
            JOB_COLS
        ),
        &[&ts, &limit],
    )
}

pub fn mark_job_completed(conn: &Connection, job_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE notification_jobs SET status = 'completed', updated_at = ?1 WHERE id = ?2",
        params![now(), job_id],
    )?;
    Ok(affected > 0)
}

/// Record a failed delivery attempt with a rescheduled run_at.
pub fn reschedule_job(conn: &Connection, job_id: &str, attempts: i64, run_at: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE notification_jobs SET attempts = ?1, run_at = ?2, updated_at = ?3 WHERE id = ?4",
        params![attempts, run_at, now(), job_id],
    )?;
    Ok(affected > 0)
}

pub fn mark_job_failed(conn: &Connection, job_id: &str, attempts: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE notification_jobs SET status = 'failed', attempts = ?1, updated_at = ?2 WHERE id = ?3",
        params![attempts, now(), job_id],
    )?;
    Ok(affected > 0)
}

// ============ In-app notifications & prefs ============

pub fn insert_inapp_notification(
    conn: &Connection,
    user_id: &str,
    kind: NotificationKind,
    body: &str,
) -> Result<String> {
    let id = EntityType::InappNotification.gen_id();
    conn.execute(
        "INSERT INTO inapp_notifications (id, user_id, kind, body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, user_id, kind.as_str(), body, now()],
    )?;
    Ok(id)
}

pub fn count_inapp_for_user(conn: &Connection, user_id: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM inapp_notifications WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Preferences default to all channels enabled when no row exists.
pub fn get_notification_prefs(conn: &Connection, user_id: &str) -> Result<NotificationPrefs> {
    let prefs: Option<NotificationPrefs> = query_one(
        conn,
        &format!(
            "SELECT {} FROM notification_prefs WHERE user_id = ?1",
            PREFS_COLS
        ),
        &[&user_id],
    )?;
    Ok(prefs.unwrap_or(NotificationPrefs {
        user_id: user_id.to_string(),
        email: None,
        email_enabled: true,
        inapp_enabled: true,
        updated_at: 0,
    }))
}

pub fn upsert_notification_prefs(
    conn: &Connection,
    user_id: &str,
    email: Option<&str>,
    email_enabled: bool,
    inapp_enabled: bool,
) -> Result<NotificationPrefs> {
    let ts = now();
    conn.execute(
        "INSERT INTO notification_prefs (user_id, email, email_enabled, inapp_enabled, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
             email = ?2, email_enabled = ?3, inapp_enabled = ?4, updated_at = ?5",
        params![user_id, email, email_enabled, inapp_enabled, ts],
    )?;
    Ok(NotificationPrefs {
        user_id: user_id.to_string(),
        email: email.map(String::from),
        email_enabled,
        inapp_enabled,
        updated_at: ts,
    })
}

// ============ Sync backlog (outbox) ============

/// Record that a user's entitlements need recomputing. Written inside the
/// same transaction as the ledger mutation so a crash between commit and
/// trigger execution cannot silently skip the sync.
pub fn enqueue_entitlement_sync(conn: &Connection, user_id: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_backlog (user_id, enqueued_at) VALUES (?1, ?2)
         ON CONFLICT(user_id) DO UPDATE SET enqueued_at = ?2",
        params![user_id, now()],
    )?;
    Ok(())
}

/// Remove and return up to `limit` users awaiting entitlement sync.
pub fn take_sync_backlog(conn: &Connection, limit: usize) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM sync_backlog ORDER BY enqueued_at ASC LIMIT ?1",
    )?;
    let users = stmt
        .query_map(params![limit as i64], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for user_id in &users {
        conn.execute("DELETE FROM sync_backlog WHERE user_id = ?1", params![user_id])?;
    }
    Ok(users)
}

// ============ Cron watermarks ============

/// Claim a sweep slot: succeeds only if the watermark is older than
/// `min_interval_secs`. Single conditional upsert, so concurrent triggers
/// from multiple processes cannot both claim the same window.
pub fn try_claim_watermark(conn: &Connection, name: &str, min_interval_secs: i64) -> Result<bool> {
    let ts = now();
    let cutoff = ts - min_interval_secs;
    let affected = conn.execute(
        "INSERT INTO cron_watermarks (name, last_run_at) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET last_run_at = ?2
         WHERE last_run_at <= ?3",
        params![name, ts, cutoff],
    )?;
    Ok(affected > 0)
}

// ============ Audit events ============

pub fn create_audit_event(
    conn: &Connection,
    user_id: &str,
    action: AuditAction,
    details: Option<&serde_json::Value>,
) -> Result<AuditEvent> {
    let id = EntityType::AuditEvent.gen_id();
    let created_at = now();
    let details_str = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO audit_events (id, user_id, action, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, user_id, action.as_str(), &details_str, created_at],
    )?;
    Ok(AuditEvent {
        id,
        user_id: user_id.to_string(),
        action,
        details: details_str,
        created_at,
    })
}

pub fn list_audit_events(conn: &Connection, user_id: &str) -> Result<Vec<AuditEvent>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM audit_events WHERE user_id = ?1 ORDER BY created_at DESC",
            AUDIT_EVENT_COLS
        ),
        &[&user_id],
    )
}

// ============ Ledger creation (checkout transaction) ============

/// Insert the full checkout trio inside the caller's transaction:
/// CheckoutSession (already advanced to PENDING with resolved URLs),
/// Payment (PENDING), and the linked SALE Invoice (OPEN). All or nothing.
pub struct CheckoutTrio {
    pub session: CheckoutSession,
    pub payment: Payment,
    pub invoice: Invoice,
}

#[allow(clippy::too_many_arguments)]
pub fn create_checkout_trio(
    conn: &Connection,
    session_id: &str,
    user_id: &str,
    provider: &str,
    price: &Price,
    provider_ref: &str,
    redirect_url: &str,
    return_url: Option<&str>,
) -> Result<CheckoutTrio> {
    let ts = now();

    // The session is born STARTED and advanced to PENDING in the same
    // transaction once the redirect URL is attached.
    conn.execute(
        "INSERT INTO checkout_sessions (id, user_id, provider, price_id, status, redirect_url, return_url, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'started', NULL, ?5, ?6, ?6)",
        params![session_id, user_id, provider, &price.id, return_url, ts],
    )?;

    let payment_id = EntityType::Payment.gen_id();
    conn.execute(
        "INSERT INTO payments (id, user_id, checkout_session_id, provider, provider_ref, amount, currency, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?8)",
        params![&payment_id, user_id, session_id, provider, provider_ref, price.amount, &price.currency, ts],
    )?;

    let invoice_id = EntityType::Invoice.gen_id();
    conn.execute(
        "INSERT INTO invoices (id, payment_id, user_id, kind, total, currency, status, created_at)
         VALUES (?1, ?2, ?3, 'sale', ?4, ?5, 'open', ?6)",
        params![&invoice_id, &payment_id, user_id, price.amount, &price.currency, ts],
    )?;

    conn.execute(
        "UPDATE checkout_sessions SET status = 'pending', redirect_url = ?1, updated_at = ?2
         WHERE id = ?3",
        params![redirect_url, ts, session_id],
    )?;

    let payment_id_for_invoice = payment_id.clone();

    Ok(CheckoutTrio {
        session: CheckoutSession {
            id: session_id.to_string(),
            user_id: user_id.to_string(),
            provider: provider.to_string(),
            price_id: price.id.clone(),
            status: CheckoutStatus::Pending,
            redirect_url: Some(redirect_url.to_string()),
            return_url: return_url.map(String::from),
            created_at: ts,
            updated_at: ts,
        },
        payment: Payment {
            id: payment_id,
            user_id: user_id.to_string(),
            checkout_session_id: Some(session_id.to_string()),
            provider: provider.to_string(),
            provider_ref: provider_ref.to_string(),
            amount: price.amount,
            currency: price.currency.clone(),
            status: PaymentStatus::Pending,
            created_at: ts,
            updated_at: ts,
        },
        invoice: Invoice {
            id: invoice_id,
            payment_id: Some(payment_id_for_invoice),
            user_id: user_id.to_string(),
            kind: InvoiceKind::Sale,
            total: price.amount,
            currency: price.currency.clone(),
            status: InvoiceStatus::Open,
            number: None,
            issued_at: None,
            created_at: ts,
        },
    })
}

/// The most recent non-terminal session for a (user, price) pair, if any.
/// Older ones are treated as superseded, not deleted.
pub fn live_session_for(
    conn: &Connection,
    user_id: &str,
    price_id: &str,
) -> Result<Option<CheckoutSession>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM checkout_sessions
             WHERE user_id = ?1 AND price_id = ?2 AND status IN ('started', 'pending')
             ORDER BY created_at DESC LIMIT 1",
            SESSION_COLS
        ),
        &[&user_id, &price_id],
    )
}
