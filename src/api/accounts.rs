use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use super::validation::validate_account_id;
use super::{ApiError, ApiJson, ApiResponse, AppState, UsageRequest};
use crate::models::account::{Account, AccountDraft, AccountPatch};

/// POST /accounts
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    ApiJson(draft): ApiJson<AccountDraft>,
) -> Result<(StatusCode, Json<ApiResponse<Account>>), ApiError> {
    let account = state.accounts.create_account(draft).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(account))))
}

/// GET /accounts/{id}
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    let id = validate_account_id(&id)?;
    let account = state.accounts.get_account(id).await?;
    Ok(Json(ApiResponse::success(account)))
}

/// PATCH /accounts/{id}
pub async fn update_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<AccountPatch>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    let id = validate_account_id(&id)?;
    let account = state.accounts.update_account(id, patch).await?;
    Ok(Json(ApiResponse::success(account)))
}

/// POST /accounts/{id}/usage
pub async fn record_usage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UsageRequest>,
) -> Result<StatusCode, ApiError> {
    let id = validate_account_id(&id)?;
    state.accounts.record_usage(id, payload.kind).await?;
    Ok(StatusCode::NO_CONTENT)
}
