//! Paystack webhook receiver.
//!
//! Reads the raw body so the signature is checked over the exact bytes
//! Paystack signed. Every verified delivery is acknowledged with 200, even
//! when nothing was credited, so the gateway stops redelivering it.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use service_core::error::AppError;

use crate::{services::webhook::SIGNATURE_HEADER, startup::AppState};

pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.webhooks.handle(signature, &body).await?;
    Ok(Json(json!({ "status": true, "outcome": outcome.as_str() })))
}
