use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use super::{with_request_id, AppState};
use crate::database::TransactionStatus;
use crate::error::AppError;
use crate::middleware::auth::CurrentUser;
use crate::middleware::error::success_response;
use crate::services::{ConversionSubmission, PurchaseOrder};

pub(crate) fn body_error(rejection: JsonRejection, headers: &HeaderMap) -> Response {
    with_request_id(AppError::validation("body", rejection.body_text()), headers).into_response()
}

/// POST /api/purchases
///
/// 200 for a settled purchase (successful or failed and refunded), 202 when
/// the provider has not answered yet.
pub async fn create_purchase(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    headers: HeaderMap,
    body: Result<Json<PurchaseOrder>, JsonRejection>,
) -> Response {
    let Json(order) = match body {
        Ok(order) => order,
        Err(rejection) => return body_error(rejection, &headers),
    };
    info!(user_id = %user_id, service = %order.service, amount = %order.amount, "Purchase requested");

    match state.purchases.purchase(user_id, order).await {
        Ok(receipt) => {
            let status = if receipt.status == TransactionStatus::Pending {
                StatusCode::ACCEPTED
            } else {
                StatusCode::OK
            };
            (status, success_response(receipt)).into_response()
        }
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}

/// GET /api/purchases/{reference}
pub async fn get_purchase(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(reference): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state.ledger.transaction(user_id, &reference).await {
        Ok(transaction) => success_response(transaction).into_response(),
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}

/// POST /api/airtime-to-cash
pub async fn submit_airtime_to_cash(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    headers: HeaderMap,
    body: Result<Json<ConversionSubmission>, JsonRejection>,
) -> Response {
    let Json(submission) = match body {
        Ok(submission) => submission,
        Err(rejection) => return body_error(rejection, &headers),
    };

    match state.airtime_to_cash.submit(user_id, submission).await {
        Ok(request) => (StatusCode::CREATED, success_response(request)).into_response(),
        Err(e) => with_request_id(e, &headers).into_response(),
    }
}
