//! Business logic on top of the stores, provider registry and gateways

pub mod airtime_to_cash;
pub mod funding;
pub mod purchase;
pub mod virtual_accounts;
pub mod wallet_ledger;
pub mod webhook_reconciler;

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::LedgerError;
use crate::payments::PaymentError;
use crate::vtu::{RegistryError, ServiceKind};

pub use airtime_to_cash::{AirtimeToCashService, ConversionSubmission};
pub use funding::{FundingService, FundingSession};
pub use purchase::{PurchaseOrder, PurchaseReceipt, PurchaseService};
pub use virtual_accounts::{AccountHolder, VirtualAccountService};
pub use wallet_ledger::WalletLedger;
pub use webhook_reconciler::{deposit_reference, Ack, ReconcileError, WebhookReconciler};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Decimal, required: Decimal },

    #[error("wallet not found for user {0}")]
    WalletNotFound(Uuid),

    #[error("no provider available for {0}")]
    NoProviderAvailable(ServiceKind),

    #[error("amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("transaction reference already exists: {0}")]
    DuplicateReference(String),

    /// The purchase never reached a provider; the charge was reversed.
    #[error("provider unavailable for {reference}")]
    ProviderUnavailable { reference: String },

    /// The provider reply could not be classified; the charge was reversed.
    #[error("ambiguous provider response for {reference}")]
    AmbiguousProviderResponse { reference: String },

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("{0}")]
    InvalidState(String),

    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error(transparent)]
    Gateway(#[from] PaymentError),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

impl ServiceError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<LedgerError> for ServiceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::WalletNotFound(user_id) => ServiceError::WalletNotFound(user_id),
            LedgerError::InsufficientBalance {
                available,
                required,
            } => ServiceError::InsufficientBalance {
                available,
                required,
            },
            LedgerError::InvalidAmount(amount) => ServiceError::InvalidAmount(amount),
            LedgerError::DuplicateReference(reference) => {
                ServiceError::DuplicateReference(reference)
            }
            LedgerError::TransactionNotFound(reference) => {
                ServiceError::TransactionNotFound(reference)
            }
            LedgerError::Database(e) => ServiceError::Storage(e),
        }
    }
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NoProviderAvailable(service) => ServiceError::NoProviderAvailable(service),
            RegistryError::Database(e) => ServiceError::Storage(e),
        }
    }
}

impl From<ServiceError> for crate::error::AppError {
    fn from(err: ServiceError) -> Self {
        use crate::error::{AppError, AppErrorKind, DomainError, ExternalError, ValidationError};

        let kind = match err {
            ServiceError::InsufficientBalance {
                available,
                required,
            } => AppErrorKind::Domain(DomainError::InsufficientBalance {
                available: available.to_string(),
                required: required.to_string(),
            }),
            ServiceError::WalletNotFound(user_id) => {
                AppErrorKind::Domain(DomainError::WalletNotFound {
                    user_id: user_id.to_string(),
                })
            }
            ServiceError::NoProviderAvailable(service) => {
                AppErrorKind::Domain(DomainError::NoProviderAvailable {
                    service: service.to_string(),
                })
            }
            ServiceError::InvalidAmount(amount) => {
                AppErrorKind::Validation(ValidationError::InvalidAmount {
                    amount: amount.to_string(),
                    reason: "amount must be greater than zero".to_string(),
                })
            }
            ServiceError::DuplicateReference(reference) => {
                AppErrorKind::Domain(DomainError::DuplicateReference { reference })
            }
            ServiceError::ProviderUnavailable { reference } => {
                AppErrorKind::External(ExternalError::ProviderUnavailable { reference })
            }
            ServiceError::AmbiguousProviderResponse { reference } => {
                AppErrorKind::External(ExternalError::AmbiguousProviderResponse { reference })
            }
            ServiceError::TransactionNotFound(reference) => {
                AppErrorKind::Domain(DomainError::TransactionNotFound { reference })
            }
            ServiceError::NotFound { resource, id } => AppErrorKind::Domain(DomainError::NotFound {
                resource: resource.to_string(),
                id,
            }),
            ServiceError::InvalidState(message) => {
                AppErrorKind::Domain(DomainError::InvalidState { message })
            }
            ServiceError::Validation { field, message } => {
                AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.to_string(),
                    reason: message,
                })
            }
            ServiceError::Gateway(e) => return e.into(),
            ServiceError::Storage(e) => return e.into(),
        };
        AppError::new(kind)
    }
}
