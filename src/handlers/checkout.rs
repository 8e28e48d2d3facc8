use axum::extract::State;
use axum::http::StatusCode;

use crate::checkout::{self, CheckoutRequest, CheckoutStarted};
use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;

/// POST /checkout - start a provider checkout for a price.
pub async fn start_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutStarted>)> {
    let started = checkout::start(&state, &request).await?;
    Ok((StatusCode::CREATED, Json(started)))
}
