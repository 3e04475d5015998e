//! API key management. Session principals only.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{
        ApiKeyCreatedResponse, ApiKeyResponse, CreateApiKeyRequest, MessageResponse,
        RolloverApiKeyRequest,
    },
    middleware::MaybePrincipal,
    services::{require_session, WalletError},
    startup::AppState,
};

pub async fn list_keys(
    State(state): State<AppState>,
    principal: MaybePrincipal,
) -> Result<Json<Vec<ApiKeyResponse>>, AppError> {
    let user_id = require_session(principal.principal())?;
    let keys = state.credentials.list(user_id).await?;
    Ok(Json(keys.into_iter().map(ApiKeyResponse::from).collect()))
}

pub async fn create_key(
    State(state): State<AppState>,
    principal: MaybePrincipal,
    Json(payload): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<ApiKeyCreatedResponse>), AppError> {
    let user_id = require_session(principal.principal())?;
    payload
        .validate()
        .map_err(|e| WalletError::Validation(e.to_string()))?;

    let issued = state
        .credentials
        .issue(user_id, &payload.name, &payload.permissions, &payload.expiry)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiKeyCreatedResponse::from(issued))))
}

pub async fn rollover_key(
    State(state): State<AppState>,
    principal: MaybePrincipal,
    Json(payload): Json<RolloverApiKeyRequest>,
) -> Result<(StatusCode, Json<ApiKeyCreatedResponse>), AppError> {
    let user_id = require_session(principal.principal())?;
    payload
        .validate()
        .map_err(|e| WalletError::Validation(e.to_string()))?;

    let issued = state
        .credentials
        .rollover(user_id, &payload.expired_key_id, &payload.expiry)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiKeyCreatedResponse::from(issued))))
}

pub async fn revoke_key(
    State(state): State<AppState>,
    principal: MaybePrincipal,
    Path(key_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let user_id = require_session(principal.principal())?;
    state.credentials.revoke(user_id, &key_id).await?;
    Ok(Json(MessageResponse {
        message: "API key revoked".to_string(),
    }))
}
