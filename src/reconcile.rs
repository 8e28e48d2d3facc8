//! Webhook reconciler.
//!
//! Applies provider payment callbacks to the ledger with
//! at-most-one-effective-application semantics. The idempotency barrier is
//! the conditional settle (`UPDATE … WHERE status = 'pending'`), not
//! message-id bookkeeping: replays, duplicates, and concurrent deliveries
//! all collapse into a no-op after the first effective application.

use crate::db::{queries, AppState};
use crate::enforcement;
use crate::error::{AppError, Result};
use crate::models::{CheckoutStatus, NotificationEvent, NotificationKind, Payment};
use crate::notify;
use crate::providers::WebhookAdapter;

/// How many backlog users one post-commit drain processes. Whatever is left
/// gets picked up by the periodic sweep.
const DRAIN_LIMIT: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Whether this delivery was the effective one. Duplicates and unknown
    /// references report `false`; both still answer 200 so the provider
    /// stops retrying.
    pub applied: bool,
}

/// Parse and apply one webhook delivery.
///
/// Malformed payloads are rejected with `BadRequest` before any state is
/// touched. Everything else succeeds: an unknown provider_ref is a logged
/// no-op, a replay is a silent no-op.
pub fn reconcile(
    state: &AppState,
    adapter: &dyn WebhookAdapter,
    raw: &[u8],
) -> Result<ReconcileOutcome> {
    let notice = adapter.parse_webhook(raw).map_err(|e| {
        tracing::warn!(provider = adapter.provider_name(), error = %e, "Malformed webhook discarded");
        AppError::BadRequest(e.to_string())
    })?;

    let mut conn = state.db.get()?;

    let Some(payment) = queries::get_payment_by_provider_ref(
        &conn,
        adapter.provider_name(),
        &notice.provider_ref,
    )?
    else {
        tracing::warn!(
            provider = adapter.provider_name(),
            provider_ref = %notice.provider_ref,
            "Webhook for unknown payment, ignoring"
        );
        return Ok(ReconcileOutcome { applied: false });
    };

    let tx = conn.transaction()?;

    if !queries::try_settle_payment(&tx, &payment.id, notice.paid)? {
        tracing::info!(
            payment_id = %payment.id,
            "Webhook already applied, ignoring"
        );
        return Ok(ReconcileOutcome { applied: false });
    }

    if notice.paid {
        apply_paid(&tx, &payment)?;
    } else if let Some(session_id) = &payment.checkout_session_id {
        queries::advance_checkout_session(&tx, session_id, CheckoutStatus::Failed)?;
    }

    // Outbox row in the same transaction: a crash after commit cannot lose
    // the entitlement sync, only defer it to the sweep.
    queries::enqueue_entitlement_sync(&tx, &payment.user_id)?;
    tx.commit()?;

    tracing::info!(
        payment_id = %payment.id,
        paid = notice.paid,
        "Webhook applied"
    );

    // Post-commit, best-effort. The ledger is already consistent; failures
    // here are logged and recovered by the periodic sweeps.
    if let Err(e) = enforcement::drain_sync_backlog(&conn, &state.config, DRAIN_LIMIT) {
        tracing::error!(error = %e, "Post-commit sync drain failed");
    }
    if let Err(e) = enqueue_settlement_notice(&conn, &state.config, &payment, notice.paid) {
        tracing::error!(error = %e, "Settlement notification failed");
    }

    Ok(ReconcileOutcome { applied: true })
}

/// Paid-path ledger mutations, inside the settle transaction: finalize the
/// sale invoice, grant the subscription period, close the session.
fn apply_paid(tx: &rusqlite::Connection, payment: &Payment) -> Result<()> {
    if let Some(invoice) = queries::get_sale_invoice_for_payment(tx, &payment.id)? {
        if let Some(number) = queries::finalize_invoice(tx, &invoice.id)? {
            tracing::info!(invoice_id = %invoice.id, number = %number, "Invoice finalized");
        }
    } else {
        tracing::error!(payment_id = %payment.id, "Paid payment has no sale invoice");
    }

    match session_price(tx, payment)? {
        Some(price) => {
            queries::apply_paid_period(tx, &payment.user_id, &price.plan_id, price.period_days)?;
        }
        None => {
            tracing::error!(payment_id = %payment.id, "Paid payment has no resolvable price");
        }
    }

    if let Some(session_id) = &payment.checkout_session_id {
        queries::advance_checkout_session(tx, session_id, CheckoutStatus::Success)?;
    }

    Ok(())
}

fn session_price(
    tx: &rusqlite::Connection,
    payment: &Payment,
) -> Result<Option<crate::models::Price>> {
    let Some(session_id) = &payment.checkout_session_id else {
        return Ok(None);
    };
    let Some(session) = queries::get_checkout_session(tx, session_id)? else {
        return Ok(None);
    };
    queries::get_price(tx, &session.price_id)
}

fn enqueue_settlement_notice(
    conn: &rusqlite::Connection,
    config: &crate::config::Config,
    payment: &Payment,
    paid: bool,
) -> Result<()> {
    let event = if paid {
        let number = queries::get_sale_invoice_for_payment(conn, &payment.id)?
            .and_then(|i| i.number)
            .unwrap_or_default();
        NotificationEvent {
            user_id: payment.user_id.clone(),
            kind: NotificationKind::InvoiceFinalized,
            email: None,
            subject: format!("Hóa đơn {} đã được phát hành", number),
            body: format!(
                "Thanh toán {} {} của bạn đã thành công. Hóa đơn số {} đã được phát hành.",
                payment.amount, payment.currency, number
            ),
            dedupe_scope: payment.id.clone(),
        }
    } else {
        NotificationEvent {
            user_id: payment.user_id.clone(),
            kind: NotificationKind::PaymentFailed,
            email: None,
            subject: "Thanh toán không thành công".to_string(),
            body: format!(
                "Thanh toán {} {} qua {} không thành công. Vui lòng thử lại.",
                payment.amount, payment.currency, payment.provider
            ),
            dedupe_scope: payment.id.clone(),
        }
    };
    notify::notify_once(conn, config, &event)?;
    Ok(())
}
