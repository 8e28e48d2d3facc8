//! Refund issuance.
//!
//! A refund is a negative REFUND invoice next to the original SALE; the sale
//! invoice itself is never mutated. The bound check (cumulative refunds
//! never exceed the paid sale total) happens before any write.

use axum::extract::State;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::enforcement;
use crate::error::{msg, AppError, OptionExt, Result};
use crate::extractors::Json;
use crate::models::{AuditAction, NotificationEvent, NotificationKind, PaymentStatus};
use crate::notify;

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub payment_id: String,
    /// Whole đồng. Omitted = refund everything still refundable.
    pub amount: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub refund_invoice_id: String,
    pub number: Option<String>,
    pub amount: i64,
    pub payment_status: PaymentStatus,
}

/// POST /refunds - issue a (partial) refund for a paid payment.
pub async fn issue_refund(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RefundRequest>,
) -> Result<Json<RefundResponse>> {
    super::require_internal_secret(&state.config, &headers)?;

    if !crate::id::is_valid_prefixed_id(&request.payment_id) {
        return Err(AppError::NotFound(msg::PAYMENT_NOT_FOUND.to_string()));
    }

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;

    let payment =
        queries::get_payment(&tx, &request.payment_id)?.or_not_found(msg::PAYMENT_NOT_FOUND)?;
    if !matches!(
        payment.status,
        PaymentStatus::Paid | PaymentStatus::RefundedPartial
    ) {
        return Err(AppError::Conflict(msg::PAYMENT_NOT_REFUNDABLE.to_string()));
    }

    let sale_total = queries::sale_total_for_payment(&tx, &payment.id)?;
    let already_refunded = queries::refunded_total_for_payment(&tx, &payment.id)?;
    let refundable = sale_total - already_refunded;

    let amount = request.amount.unwrap_or(refundable);
    if amount <= 0 || amount > refundable {
        return Err(AppError::BadRequest(msg::REFUND_EXCEEDS_PAID.to_string()));
    }

    let invoice = queries::create_refund_invoice(
        &tx,
        &payment.id,
        &payment.user_id,
        amount,
        &payment.currency,
    )?;

    let full = amount == refundable;
    let new_status = if full {
        PaymentStatus::Refunded
    } else {
        PaymentStatus::RefundedPartial
    };
    queries::set_payment_refund_status(&tx, &payment.id, new_status)?;

    // A full refund takes the subscription with it; a partial one leaves
    // the granted period alone.
    if full {
        if let Some(sub) = subscription_for_payment(&tx, &payment)? {
            queries::expire_subscription(&tx, &sub.id)?;
        }
    }

    queries::create_audit_event(
        &tx,
        &payment.user_id,
        AuditAction::RefundIssued,
        Some(&serde_json::json!({
            "payment_id": payment.id,
            "invoice_id": invoice.id,
            "amount": amount,
            "full": full,
        })),
    )?;
    queries::enqueue_entitlement_sync(&tx, &payment.user_id)?;
    tx.commit()?;

    tracing::info!(
        payment_id = %payment.id,
        invoice_id = %invoice.id,
        amount,
        full,
        "Refund issued"
    );

    // Post-commit, best-effort: entitlement fallout and the user notice.
    if let Err(e) = enforcement::drain_sync_backlog(&conn, &state.config, 8) {
        tracing::error!(error = %e, "Post-refund sync drain failed");
    }
    let notice = NotificationEvent {
        user_id: payment.user_id.clone(),
        kind: NotificationKind::RefundIssued,
        email: None,
        subject: "Hoàn tiền đã được thực hiện".to_string(),
        body: format!(
            "Chúng tôi đã hoàn {} {} cho thanh toán của bạn.",
            amount, payment.currency
        ),
        dedupe_scope: invoice.id.clone(),
    };
    if let Err(e) = notify::notify_once(&conn, &state.config, &notice) {
        tracing::error!(error = %e, "Refund notification failed");
    }

    Ok(Json(RefundResponse {
        refund_invoice_id: invoice.id,
        number: invoice.number,
        amount,
        payment_status: new_status,
    }))
}

fn subscription_for_payment(
    tx: &rusqlite::Connection,
    payment: &crate::models::Payment,
) -> Result<Option<crate::models::Subscription>> {
    let Some(session_id) = &payment.checkout_session_id else {
        return Ok(None);
    };
    let Some(session) = queries::get_checkout_session(tx, session_id)? else {
        return Ok(None);
    };
    let Some(price) = queries::get_price(tx, &session.price_id)? else {
        return Ok(None);
    };
    queries::get_subscription(tx, &payment.user_id, &price.plan_id)
}
