use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;

use super::{with_request_id, AppState};
use crate::middleware::auth::CurrentUser;
use crate::middleware::error::success_response;

const DEFAULT_HISTORY: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// GET /api/wallet
pub async fn get_wallet(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    headers: HeaderMap,
) -> Response {
    match state.ledger.wallet(user_id).await {
        Ok(wallet) => success_response(wallet).into_response(),
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}

/// POST /api/wallet
pub async fn open_wallet(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    headers: HeaderMap,
) -> Response {
    info!(user_id = %user_id, "Wallet open requested");
    match state.ledger.open_wallet(user_id).await {
        Ok(wallet) => (StatusCode::CREATED, success_response(wallet)).into_response(),
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}

/// GET /api/wallet/transactions?limit=
pub async fn list_transactions(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<HistoryQuery>,
    headers: HeaderMap,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY);
    match state.ledger.history(user_id, limit).await {
        Ok(transactions) => success_response(transactions).into_response(),
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}
