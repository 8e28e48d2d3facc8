//! Checkout orchestrator.
//!
//! Drives a user from a price to a provider-hosted payment page. The
//! provider call happens before any ledger write, so a provider timeout or
//! rejection commits nothing; once the provider has answered, one
//! transaction creates the session/payment/invoice trio atomically.

use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{msg, AppError, OptionExt, Result};
use crate::id::EntityType;
use crate::models::{CheckoutStatus, SETTLEMENT_CURRENCY};
use crate::providers::{self, PaymentProvider, StartArgs};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub price_id: String,
    /// One of "vnpay", "momo", "zalopay".
    pub provider: String,
    pub return_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutStarted {
    pub session_id: String,
    /// Provider-hosted payment page.
    pub redirect_url: String,
    pub return_url: String,
}

/// Start a checkout: validate the price, obtain the provider redirect, then
/// commit CheckoutSession(PENDING) + Payment(PENDING) + Invoice(OPEN) in one
/// transaction. Any prior live session for the same (user, price) is
/// superseded in the same transaction.
pub async fn start(state: &AppState, req: &CheckoutRequest) -> Result<CheckoutStarted> {
    let provider: PaymentProvider = req
        .provider
        .parse()
        .map_err(|_| AppError::BadRequest(msg::INVALID_PROVIDER.to_string()))?;

    // Validate before the provider round-trip; the connection is dropped
    // again before the await since it must not be held across one.
    let price = {
        let conn = state.db.get()?;
        queries::get_price(&conn, &req.price_id)?.or_bad_request(msg::PRICE_NOT_AVAILABLE)?
    };
    if !price.active || price.currency != SETTLEMENT_CURRENCY {
        return Err(AppError::BadRequest(msg::PRICE_NOT_AVAILABLE.to_string()));
    }

    let session_id = EntityType::CheckoutSession.gen_id();
    let return_url = req
        .return_url
        .clone()
        .unwrap_or_else(|| format!("{}/billing/return", state.config.base_url));
    let notify_url = format!("{}/webhooks/{}", state.config.base_url, provider);
    let order_info = format!("Goi dang ho so casting - {}", price.plan_id);

    let outcome = providers::start_checkout(
        provider,
        &state.config,
        StartArgs {
            session_id: &session_id,
            amount: price.amount,
            order_info: &order_info,
            return_url: &return_url,
            notify_url: &notify_url,
        },
    )
    .await?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;

    if let Some(stale) = queries::live_session_for(&tx, &req.user_id, &price.id)? {
        queries::advance_checkout_session(&tx, &stale.id, CheckoutStatus::Expired)?;
        tracing::info!(session_id = %stale.id, "Superseded stale checkout session");
    }

    let trio = queries::create_checkout_trio(
        &tx,
        &session_id,
        &req.user_id,
        provider.as_str(),
        &price,
        &outcome.provider_ref,
        &outcome.redirect_url,
        Some(&return_url),
    )?;
    tx.commit()?;

    tracing::info!(
        session_id = %trio.session.id,
        payment_id = %trio.payment.id,
        provider = %provider,
        amount = price.amount,
        "Checkout started"
    );

    Ok(CheckoutStarted {
        session_id,
        redirect_url: outcome.redirect_url,
        return_url,
    })
}
