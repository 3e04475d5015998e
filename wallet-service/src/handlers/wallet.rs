//! Wallet endpoints.
//!
//! Each handler authorizes its own capability against the request's
//! principal before touching the ledger.

use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{
        BalanceResponse, DepositRequest, DepositResponse, DepositStatusResponse,
        TransactionResponse, TransferRequest, TransferResponse, WalletResponse,
    },
    middleware::MaybePrincipal,
    services::{authorize, require_session, Capability, WalletError},
    startup::AppState,
};

fn validate<T: Validate>(payload: &T) -> Result<(), WalletError> {
    payload
        .validate()
        .map_err(|e| WalletError::Validation(e.to_string()))
}

/// Create the caller's wallet, or return the existing one.
pub async fn ensure_wallet(
    State(state): State<AppState>,
    principal: MaybePrincipal,
) -> Result<Json<WalletResponse>, AppError> {
    let user_id = require_session(principal.principal())?;
    let wallet = state.wallets.create_wallet(user_id).await?;
    Ok(Json(WalletResponse::from(wallet)))
}

pub async fn deposit(
    State(state): State<AppState>,
    principal: MaybePrincipal,
    Json(payload): Json<DepositRequest>,
) -> Result<Json<DepositResponse>, AppError> {
    let user_id = authorize(principal.principal(), Capability::Deposit)?;
    validate(&payload)?;

    let handle = state.wallets.deposit(user_id, payload.amount).await?;
    Ok(Json(DepositResponse::from(handle)))
}

pub async fn balance(
    State(state): State<AppState>,
    principal: MaybePrincipal,
) -> Result<Json<BalanceResponse>, AppError> {
    let user_id = authorize(principal.principal(), Capability::Read)?;
    let wallet = state.wallets.get_balance(user_id).await?;
    Ok(Json(BalanceResponse::from(wallet)))
}

pub async fn transactions(
    State(state): State<AppState>,
    principal: MaybePrincipal,
) -> Result<Json<Vec<TransactionResponse>>, AppError> {
    let user_id = authorize(principal.principal(), Capability::Read)?;
    let entries = state.wallets.list_transactions(user_id).await?;
    Ok(Json(entries.into_iter().map(TransactionResponse::from).collect()))
}

pub async fn transfer(
    State(state): State<AppState>,
    principal: MaybePrincipal,
    Json(payload): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, AppError> {
    let user_id = authorize(principal.principal(), Capability::Transfer)?;
    validate(&payload)?;

    let receipt = state
        .transfers
        .transfer(user_id, payload.wallet_number.trim(), payload.amount)
        .await?;
    Ok(Json(TransferResponse::from(receipt)))
}

/// Local and gateway status of one of the caller's deposits. Never credits.
pub async fn deposit_status(
    State(state): State<AppState>,
    principal: MaybePrincipal,
    Path(reference): Path<String>,
) -> Result<Json<DepositStatusResponse>, AppError> {
    let user_id = authorize(principal.principal(), Capability::Read)?;
    let status = state.wallets.deposit_status(user_id, &reference).await?;
    Ok(Json(DepositStatusResponse::from(status)))
}
