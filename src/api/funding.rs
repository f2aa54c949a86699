use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use super::purchases::body_error;
use super::{with_request_id, AppState};
use crate::middleware::auth::CurrentUser;
use crate::middleware::error::success_response;
use crate::payments::GatewayId;
use crate::services::AccountHolder;

#[derive(Debug, Deserialize)]
pub struct FundWalletRequest {
    pub amount: Decimal,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub gateway: String,
    pub account_name: String,
    pub email: String,
}

/// POST /api/wallet/fund
pub async fn initialize_funding(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    headers: HeaderMap,
    body: Result<Json<FundWalletRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(request) => request,
        Err(rejection) => return body_error(rejection, &headers),
    };

    match state
        .funding
        .initialize(user_id, request.amount, &request.email)
        .await
    {
        Ok(session) => (StatusCode::CREATED, success_response(session)).into_response(),
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}

/// POST /api/wallet/virtual-accounts
pub async fn provision_virtual_account(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    headers: HeaderMap,
    body: Result<Json<ProvisionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(request) => request,
        Err(rejection) => return body_error(rejection, &headers),
    };
    let gateway = match GatewayId::from_str(&request.gateway) {
        Ok(gateway) => gateway,
        Err(e) => return with_request_id(e, &headers).into_response(),
    };
    let holder = AccountHolder {
        account_name: request.account_name,
        email: request.email,
    };

    match state.virtual_accounts.provision(user_id, gateway, holder).await {
        Ok(account) => success_response(account).into_response(),
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}

/// GET /api/wallet/virtual-accounts
pub async fn list_virtual_accounts(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    headers: HeaderMap,
) -> Response {
    match state.virtual_accounts.list(user_id).await {
        Ok(accounts) => success_response(accounts).into_response(),
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}
