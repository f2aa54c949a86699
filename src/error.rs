//! Error handling for the VTU platform HTTP surface
//!
//! This module provides a unified error system with proper HTTP status mapping,
//! user-friendly messages, and structured error codes for client handling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "INSUFFICIENT_BALANCE")]
    InsufficientBalance,
    #[serde(rename = "WALLET_NOT_FOUND")]
    WalletNotFound,
    #[serde(rename = "NO_PROVIDER_AVAILABLE")]
    NoProviderAvailable,
    #[serde(rename = "DUPLICATE_REFERENCE")]
    DuplicateReference,
    #[serde(rename = "TRANSACTION_NOT_FOUND")]
    TransactionNotFound,
    #[serde(rename = "INVALID_STATE")]
    InvalidState,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,

    // External errors (502, 503, 504)
    #[serde(rename = "PROVIDER_UNAVAILABLE")]
    ProviderUnavailable,
    #[serde(rename = "AMBIGUOUS_PROVIDER_RESPONSE")]
    AmbiguousProviderResponse,
    #[serde(rename = "PAYMENT_GATEWAY_ERROR")]
    PaymentGatewayError,
    #[serde(rename = "RATE_LIMIT_ERROR")]
    RateLimitError,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Domain-specific business logic errors
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Wallet balance is lower than the amount being charged
    InsufficientBalance { available: String, required: String },
    /// User has not opened a wallet
    WalletNotFound { user_id: String },
    /// No active, registered provider sells this service
    NoProviderAvailable { service: String },
    /// Reference already used by another transaction
    DuplicateReference { reference: String },
    /// Transaction with given reference doesn't exist
    TransactionNotFound { reference: String },
    /// Operation not allowed in the record's current state
    InvalidState { message: String },
    /// Some other resource (provider, conversion request) doesn't exist
    NotFound { resource: String, id: String },
}

#[derive(Debug, Clone)]
pub enum AuthError {
    MissingCredentials,
    InvalidCredentials,
}

#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Database connection or query failure
    Database { message: String, is_retryable: bool },
}

/// External service errors (VTU providers, payment gateways)
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// The purchase never reached the provider; the charge was reversed
    ProviderUnavailable { reference: String },
    /// The provider reply could not be classified; the charge was reversed
    AmbiguousProviderResponse { reference: String },
    /// Payment gateway (Paystack, Monnify) error
    PaymentGateway {
        gateway: String,
        message: String,
        is_retryable: bool,
    },
    /// Rate limit exceeded
    RateLimit {
        service: String,
        retry_after: Option<u64>,
    },
    /// External service timeout
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Invalid amount (format or value)
    InvalidAmount { amount: String, reason: String },
    /// Field missing or malformed
    InvalidField { field: String, reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Auth(AuthError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }))
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::NotFound {
            resource: resource.into(),
            id: id.into(),
        }))
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InsufficientBalance { .. } => 422, // Unprocessable Entity
                DomainError::WalletNotFound { .. } => 404,
                DomainError::NoProviderAvailable { .. } => 503,
                DomainError::DuplicateReference { .. } => 409, // Conflict
                DomainError::TransactionNotFound { .. } => 404,
                DomainError::InvalidState { .. } => 409,
                DomainError::NotFound { .. } => 404,
            },
            AppErrorKind::Auth(_) => 401,
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::ProviderUnavailable { .. } => 503,
                ExternalError::AmbiguousProviderResponse { .. } => 502, // Bad Gateway
                ExternalError::PaymentGateway { .. } => 502,
                ExternalError::RateLimit { .. } => 429, // Too Many Requests
                ExternalError::Timeout { .. } => 504,   // Gateway Timeout
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
                DomainError::WalletNotFound { .. } => ErrorCode::WalletNotFound,
                DomainError::NoProviderAvailable { .. } => ErrorCode::NoProviderAvailable,
                DomainError::DuplicateReference { .. } => ErrorCode::DuplicateReference,
                DomainError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
                DomainError::InvalidState { .. } => ErrorCode::InvalidState,
                DomainError::NotFound { .. } => ErrorCode::NotFound,
            },
            AppErrorKind::Auth(_) => ErrorCode::Unauthorized,
            AppErrorKind::Infrastructure(_) => ErrorCode::DatabaseError,
            AppErrorKind::External(err) => match err {
                ExternalError::ProviderUnavailable { .. } => ErrorCode::ProviderUnavailable,
                ExternalError::AmbiguousProviderResponse { .. } => {
                    ErrorCode::AmbiguousProviderResponse
                }
                ExternalError::PaymentGateway { .. } => ErrorCode::PaymentGatewayError,
                ExternalError::RateLimit { .. } => ErrorCode::RateLimitError,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InsufficientBalance {
                    available,
                    required,
                } => {
                    format!(
                        "Insufficient wallet balance. Available: {}, Required: {}",
                        available, required
                    )
                }
                DomainError::WalletNotFound { .. } => {
                    "No wallet found. Please open a wallet first".to_string()
                }
                DomainError::NoProviderAvailable { service } => {
                    format!("{} purchases are unavailable right now. Please try again later", service)
                }
                DomainError::DuplicateReference { reference } => {
                    format!("Transaction '{}' already exists", reference)
                }
                DomainError::TransactionNotFound { reference } => {
                    format!("Transaction '{}' not found", reference)
                }
                DomainError::InvalidState { message } => message.clone(),
                DomainError::NotFound { resource, id } => {
                    format!("{} '{}' not found", resource, id)
                }
            },
            AppErrorKind::Auth(err) => match err {
                AuthError::MissingCredentials => "Authentication required".to_string(),
                AuthError::InvalidCredentials => "Invalid credentials".to_string(),
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::ProviderUnavailable { reference }
                | ExternalError::AmbiguousProviderResponse { reference } => format!(
                    "Purchase {} failed and your wallet has been refunded",
                    reference
                ),
                ExternalError::PaymentGateway {
                    gateway,
                    is_retryable,
                    ..
                } => {
                    if *is_retryable {
                        format!(
                            "Payment gateway ({}) is temporarily unavailable. Please try again",
                            gateway
                        )
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::RateLimit {
                    service,
                    retry_after,
                } => {
                    if let Some(secs) = retry_after {
                        format!(
                            "Rate limit exceeded for {}. Please try again in {} seconds",
                            service, secs
                        )
                    } else {
                        format!(
                            "Rate limit exceeded for {}. Please try again later",
                            service
                        )
                    }
                }
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => {
                    format!(
                        "{} request timed out after {} seconds. Please try again",
                        service, timeout_secs
                    )
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(err) => matches!(err, DomainError::NoProviderAvailable { .. }),
            AppErrorKind::Auth(_) => false,
            AppErrorKind::Infrastructure(InfrastructureError::Database { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::External(err) => match err {
                ExternalError::ProviderUnavailable { .. } => true,
                ExternalError::AmbiguousProviderResponse { .. } => false,
                ExternalError::PaymentGateway { is_retryable, .. } => *is_retryable,
                ExternalError::RateLimit { .. } => true,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError> lives in database/error.rs, From<ServiceError> in
// services/mod.rs and From<PaymentError> in payments/error.rs.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_balance_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::InsufficientBalance {
            available: "500".to_string(),
            required: "1000".to_string(),
        }));

        assert_eq!(error.status_code(), 422);
        assert_eq!(error.error_code(), ErrorCode::InsufficientBalance);
        assert!(error.user_message().contains("Insufficient wallet balance"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_no_provider_is_retryable_503() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::NoProviderAvailable {
            service: "data".to_string(),
        }));

        assert_eq!(error.status_code(), 503);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_ambiguous_provider_response_mentions_refund() {
        let error = AppError::new(AppErrorKind::External(
            ExternalError::AmbiguousProviderResponse {
                reference: "VTU-1".to_string(),
            },
        ));

        assert_eq!(error.status_code(), 502);
        assert!(error.user_message().contains("refunded"));
    }

    #[test]
    fn test_auth_error_is_401() {
        let error = AppError::new(AppErrorKind::Auth(AuthError::InvalidCredentials));
        assert_eq!(error.status_code(), 401);
        assert_eq!(error.error_code(), ErrorCode::Unauthorized);
    }

    #[test]
    fn test_validation_error() {
        let error = AppError::new(AppErrorKind::Validation(ValidationError::InvalidAmount {
            amount: "-100".to_string(),
            reason: "Amount cannot be negative".to_string(),
        }));

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::ValidationError);
        assert!(!error.is_retryable());
    }
}
