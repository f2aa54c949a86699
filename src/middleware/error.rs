//! JSON bodies for errors and successes.
//!
//! Every failed request gets the same shape: a machine-readable code, a
//! message safe to show the user, the request id and, for purchase errors,
//! the transaction reference so the client can poll it.

use crate::error::{AppError, AppErrorKind, DomainError, ErrorCode, ExternalError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorCode,
    pub message: String,
    pub request_id: Option<String>,
    /// RFC 3339
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            reference: transaction_reference(error),
            retryable: error.is_retryable(),
        }
    }
}

fn transaction_reference(error: &AppError) -> Option<String> {
    match &error.kind {
        AppErrorKind::External(ExternalError::ProviderUnavailable { reference })
        | AppErrorKind::External(ExternalError::AmbiguousProviderResponse { reference })
        | AppErrorKind::Domain(DomainError::DuplicateReference { reference })
        | AppErrorKind::Domain(DomainError::TransactionNotFound { reference }) => {
            Some(reference.clone())
        }
        _ => None,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = ?self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error = ?self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Client error occurred"
            );
        }

        (status_code, Json(ErrorResponse::from_app_error(&self))).into_response()
    }
}

/// `{"success": true, "data": ..., "timestamp": ...}`
pub fn success_response<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "data": data,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub fn get_request_id_from_headers(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn insufficient_balance_body() {
        let app_error = AppError::new(AppErrorKind::Domain(DomainError::InsufficientBalance {
            available: "500".to_string(),
            required: "1000".to_string(),
        }))
        .with_request_id("req_123");

        let body = ErrorResponse::from_app_error(&app_error);

        assert_eq!(body.error, ErrorCode::InsufficientBalance);
        assert_eq!(body.request_id, Some("req_123".to_string()));
        assert!(body.message.contains("Insufficient wallet balance"));
        assert!(body.reference.is_none());
        assert!(!body.retryable);
    }

    #[test]
    fn reversed_purchase_carries_its_reference() {
        let app_error = AppError::new(AppErrorKind::External(ExternalError::ProviderUnavailable {
            reference: "VTU-42".to_string(),
        }));

        let json = serde_json::to_value(ErrorResponse::from_app_error(&app_error)).unwrap();
        assert_eq!(json["error"], "PROVIDER_UNAVAILABLE");
        assert_eq!(json["reference"], "VTU-42");
        assert_eq!(json["retryable"], true);
    }

    #[test]
    fn validation_error_is_400() {
        let app_error = AppError::new(AppErrorKind::Validation(ValidationError::InvalidAmount {
            amount: "-100".to_string(),
            reason: "Amount cannot be negative".to_string(),
        }));

        let response = app_error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn request_id_header_is_read() {
        let mut headers = axum::http::HeaderMap::new();
        assert_eq!(get_request_id_from_headers(&headers), None);
        headers.insert("x-request-id", "abc-123".parse().unwrap());
        assert_eq!(
            get_request_id_from_headers(&headers),
            Some("abc-123".to_string())
        );
    }
}
