use axum::{Json, extract::State};
use std::sync::Arc;

use super::{ApiError, ApiJson, ApiResponse, AppState, LoginRequest};
use crate::models::account::Account;

/// POST /auth/login
/// Authenticate with username or email and password.
///
/// Every failure, including an empty field, reads as "Invalid credentials".
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    let account = state
        .accounts
        .authenticate(&payload.identifier, &payload.password)
        .await?;

    tracing::Span::current().record("account_id", tracing::field::display(account.id));

    Ok(Json(ApiResponse::success(account)))
}
