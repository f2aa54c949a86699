use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::str::FromStr;
use tracing::{error, info, warn};

use super::AppState;
use crate::payments::GatewayId;
use crate::services::ReconcileError;

fn ack() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
}

/// POST /webhooks/{gateway}
///
/// Gateways retry anything that is not a 2xx, so only storage failures are
/// reported as errors; everything else is logged and acknowledged.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    info!(gateway = %gateway, bytes = body.len(), "Received webhook");

    let signature = GatewayId::from_str(&gateway)
        .ok()
        .and_then(|id| headers.get(id.signature_header()))
        .and_then(|v| v.to_str().ok());

    match state
        .reconciler
        .handle_webhook(&gateway, &body, signature)
        .await
    {
        Ok(outcome) => {
            info!(
                gateway = %gateway,
                reference = ?outcome.reference,
                status = ?outcome.status,
                already_processed = outcome.already_processed,
                ignored = outcome.ignored,
                "Webhook processed"
            );
            ack()
        }
        Err(e) if e.should_retry() => {
            error!(gateway = %gateway, error = %e, "Webhook processing failed, asking gateway to retry");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"status": "error"})),
            )
                .into_response()
        }
        Err(e @ ReconcileError::InvalidSignature(_)) | Err(e @ ReconcileError::UnknownGateway(_)) => {
            warn!(gateway = %gateway, error = %e, "Webhook rejected");
            ack()
        }
        Err(e) => {
            warn!(gateway = %gateway, error = %e, "Webhook not applied");
            ack()
        }
    }
}
