use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("{gateway} did not answer within {timeout_secs}s")]
    Timeout { gateway: String, timeout_secs: u64 },

    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Malformed webhook payload: {message}")]
    MalformedPayload { message: String },

    #[error("{gateway} does not support {operation}")]
    Unsupported {
        gateway: String,
        operation: &'static str,
    },

    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::NetworkError { .. }
            | PaymentError::Timeout { .. }
            | PaymentError::RateLimitError { .. } => true,
            PaymentError::ProviderError { retryable, .. } => *retryable,
            PaymentError::ValidationError { .. }
            | PaymentError::MalformedPayload { .. }
            | PaymentError::Unsupported { .. } => false,
        }
    }

    pub(crate) fn provider(gateway: &str, message: impl Into<String>) -> Self {
        PaymentError::ProviderError {
            provider: gateway.to_string(),
            message: message.into(),
            provider_code: None,
            retryable: false,
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};

        match err {
            PaymentError::ValidationError { message, field } => {
                AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.unwrap_or_else(|| "request".to_string()),
                    reason: message,
                }))
            }
            PaymentError::RateLimitError {
                retry_after_seconds,
                ..
            } => AppError::new(AppErrorKind::External(ExternalError::RateLimit {
                service: "payment gateway".to_string(),
                retry_after: retry_after_seconds,
            })),
            PaymentError::Timeout {
                gateway,
                timeout_secs,
            } => AppError::new(AppErrorKind::External(ExternalError::Timeout {
                service: gateway,
                timeout_secs,
            })),
            other => {
                let gateway = match &other {
                    PaymentError::ProviderError { provider, .. } => provider.clone(),
                    PaymentError::Unsupported { gateway, .. } => gateway.clone(),
                    _ => "payments".to_string(),
                };
                AppError::new(AppErrorKind::External(ExternalError::PaymentGateway {
                    gateway,
                    message: other.to_string(),
                    is_retryable: other.is_retryable(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn transient_failures_are_retryable() {
        assert!(PaymentError::NetworkError {
            message: "connection reset".to_string()
        }
        .is_retryable());
        assert!(PaymentError::Timeout {
            gateway: "paystack".to_string(),
            timeout_secs: 30
        }
        .is_retryable());
        assert!(!PaymentError::MalformedPayload {
            message: "not json".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn converts_to_gateway_app_error() {
        let app: AppError = PaymentError::provider("monnify", "boom").into();
        assert_eq!(app.status_code(), 502);
        assert!(!app.is_retryable());
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let app: AppError = PaymentError::Timeout {
            gateway: "payrant".to_string(),
            timeout_secs: 10,
        }
        .into();
        assert_eq!(app.status_code(), 504);
        assert!(app.user_message().contains("payrant"));
    }

    #[test]
    fn rate_limit_is_429() {
        let app: AppError = PaymentError::RateLimitError {
            message: "limited".to_string(),
            retry_after_seconds: Some(30),
        }
        .into();
        assert_eq!(app.status_code(), 429);
        assert!(app.user_message().contains("30 seconds"));
    }
}
