//! Operator routes, mounted behind `admin_auth_middleware`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::purchases::body_error;
use super::{with_request_id, AppState};
use crate::database::airtime_to_cash_repository::AirtimeToCashSetting;
use crate::database::provider_config_repository::ProviderConfigUpdate;
use crate::error::AppError;
use crate::middleware::auth::AdminContext;
use crate::middleware::error::success_response;

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

/// GET /admin/providers
pub async fn list_providers(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match state.providers.list_all().await {
        Ok(configs) => success_response(configs).into_response(),
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}

/// PATCH /admin/providers/{code}
pub async fn update_provider(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Path(code): Path<String>,
    headers: HeaderMap,
    body: Result<Json<ProviderConfigUpdate>, JsonRejection>,
) -> Response {
    let Json(update) = match body {
        Ok(update) => update,
        Err(rejection) => return body_error(rejection, &headers),
    };
    if update.active.is_none() && update.priority.is_none() {
        return with_request_id(
            AppError::validation("body", "set active and/or priority"),
            &headers,
        )
        .into_response();
    }

    match state.providers.update(&code, update.clone()).await {
        Ok(Some(config)) => {
            info!(
                provider = %code,
                actor = %admin.actor,
                active = ?update.active,
                priority = ?update.priority,
                "Provider config updated"
            );
            success_response(config).into_response()
        }
        Ok(None) => with_request_id(AppError::not_found("provider", code), &headers).into_response(),
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}

/// PUT /admin/airtime-to-cash/settings
pub async fn configure_airtime_to_cash(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AirtimeToCashSetting>, JsonRejection>,
) -> Response {
    let Json(setting) = match body {
        Ok(setting) => setting,
        Err(rejection) => return body_error(rejection, &headers),
    };
    match state.airtime_to_cash.configure(setting).await {
        Ok(setting) => success_response(setting).into_response(),
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}

/// POST /admin/airtime-to-cash/{id}/approve
pub async fn approve_airtime_to_cash(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Response {
    match state.airtime_to_cash.approve(id, &admin.actor).await {
        Ok(request) => success_response(request).into_response(),
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}

/// POST /admin/airtime-to-cash/{id}/reject
pub async fn reject_airtime_to_cash(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(request) => request,
        Err(rejection) => return body_error(rejection, &headers),
    };
    match state
        .airtime_to_cash
        .reject(id, &admin.actor, &request.reason)
        .await
    {
        Ok(request) => success_response(request).into_response(),
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}

/// POST /admin/transactions/{reference}/refund
pub async fn refund_transaction(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Path(reference): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state.purchases.manual_refund(&reference, &admin.actor).await {
        Ok(transaction) => success_response(transaction).into_response(),
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}

/// POST /admin/transactions/{reference}/requery
pub async fn requery_transaction(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state.purchases.requery(&reference).await {
        Ok(transaction) => success_response(transaction).into_response(),
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}
