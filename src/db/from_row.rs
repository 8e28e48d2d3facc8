//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const PRICE_COLS: &str =
    "id, entitlement_key, plan_id, amount, currency, period_days, active, created_at";

pub const SESSION_COLS: &str =
    "id, user_id, provider, price_id, status, redirect_url, return_url, created_at, updated_at";

pub const PAYMENT_COLS: &str = "id, user_id, checkout_session_id, provider, provider_ref, amount, currency, status, created_at, updated_at";

pub const INVOICE_COLS: &str =
    "id, payment_id, user_id, kind, total, currency, status, number, issued_at, created_at";

pub const SUBSCRIPTION_COLS: &str =
    "id, user_id, plan_id, status, cancel_at_period_end, started_at, ends_at";

pub const ENTITLEMENT_COLS: &str = "user_id, key, expires_at, created_at, updated_at";

pub const PROFILE_COLS: &str =
    "user_id, visibility, approved, published_at, unpublished_reason";

pub const MESSAGE_LOG_COLS: &str = "id, dedupe_hash, user_id, kind, status, created_at";

pub const JOB_COLS: &str = "id, log_id, channel, recipient, subject, body, status, attempts, max_attempts, run_at, created_at, updated_at";

pub const PREFS_COLS: &str = "user_id, email, email_enabled, inapp_enabled, updated_at";

pub const AUDIT_EVENT_COLS: &str = "id, user_id, action, details, created_at";

// ============ FromRow Implementations ============

impl FromRow for Price {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Price {
            id: row.get(0)?,
            entitlement_key: row.get(1)?,
            plan_id: row.get(2)?,
            amount: row.get(3)?,
            currency: row.get(4)?,
            period_days: row.get(5)?,
            active: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

impl FromRow for CheckoutSession {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(CheckoutSession {
            id: row.get(0)?,
            user_id: row.get(1)?,
            provider: row.get(2)?,
            price_id: row.get(3)?,
            status: parse_enum(row, 4, "status")?,
            redirect_url: row.get(5)?,
            return_url: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl FromRow for Payment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Payment {
            id: row.get(0)?,
            user_id: row.get(1)?,
            checkout_session_id: row.get(2)?,
            provider: row.get(3)?,
            provider_ref: row.get(4)?,
            amount: row.get(5)?,
            currency: row.get(6)?,
            status: parse_enum(row, 7, "status")?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl FromRow for Invoice {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Invoice {
            id: row.get(0)?,
            payment_id: row.get(1)?,
            user_id: row.get(2)?,
            kind: parse_enum(row, 3, "kind")?,
            total: row.get(4)?,
            currency: row.get(5)?,
            status: parse_enum(row, 6, "status")?,
            number: row.get(7)?,
            issued_at: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            user_id: row.get(1)?,
            plan_id: row.get(2)?,
            status: parse_enum(row, 3, "status")?,
            cancel_at_period_end: row.get(4)?,
            started_at: row.get(5)?,
            ends_at: row.get(6)?,
        })
    }
}

impl FromRow for Entitlement {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Entitlement {
            user_id: row.get(0)?,
            key: row.get(1)?,
            expires_at: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

impl FromRow for Profile {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Profile {
            user_id: row.get(0)?,
            visibility: parse_enum(row, 1, "visibility")?,
            approved: row.get(2)?,
            published_at: row.get(3)?,
            unpublished_reason: row.get(4)?,
        })
    }
}

impl FromRow for MessageLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(MessageLog {
            id: row.get(0)?,
            dedupe_hash: row.get(1)?,
            user_id: row.get(2)?,
            kind: parse_enum(row, 3, "kind")?,
            status: parse_enum(row, 4, "status")?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for NotificationJob {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(NotificationJob {
            id: row.get(0)?,
            log_id: row.get(1)?,
            channel: parse_enum(row, 2, "channel")?,
            recipient: row.get(3)?,
            subject: row.get(4)?,
            body: row.get(5)?,
            status: parse_enum(row, 6, "status")?,
            attempts: row.get(7)?,
            max_attempts: row.get(8)?,
            run_at: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl FromRow for NotificationPrefs {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(NotificationPrefs {
            user_id: row.get(0)?,
            email: row.get(1)?,
            email_enabled: row.get(2)?,
            inapp_enabled: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

impl FromRow for AuditEvent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(AuditEvent {
            id: row.get(0)?,
            user_id: row.get(1)?,
            action: parse_enum(row, 2, "action")?,
            details: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}
