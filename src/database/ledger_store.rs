use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::transaction::{
    NewTransaction, SettleOutcome, Settlement, Transaction, TransactionKind, Wallet,
};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("wallet not found for user {0}")]
    WalletNotFound(Uuid),

    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Decimal, required: Decimal },

    #[error("amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("transaction reference already exists: {0}")]
    DuplicateReference(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub(crate) fn ensure_positive(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}

/// Storage for wallets and their transactions.
///
/// Every method that touches a balance is atomic with respect to other calls on
/// the same wallet, and `settle` only ever moves a row out of `pending` once.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Returns the existing wallet when the user already has one.
    async fn create_wallet(&self, user_id: Uuid, currency: &str) -> Result<Wallet, LedgerError>;

    async fn find_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, DatabaseError>;

    /// Raw balance primitive: writes no transaction row. Wallet-facing flows
    /// go through `open_debit` and `settle` so the history explains the balance.
    async fn credit(&self, user_id: Uuid, amount: Decimal) -> Result<Wallet, LedgerError>;

    /// Raw balance primitive like `credit`. Fails with `InsufficientBalance`
    /// and leaves the balance untouched when `amount` exceeds it.
    async fn debit(&self, user_id: Uuid, amount: Decimal) -> Result<Wallet, LedgerError>;

    /// Debit `total_charged` and record the pending transaction in one step.
    /// Nothing is written when the balance is too low.
    async fn open_debit(&self, tx: NewTransaction) -> Result<(Transaction, Wallet), LedgerError>;

    /// Record a pending transaction without touching the balance.
    async fn insert_transaction(&self, tx: NewTransaction) -> Result<Transaction, LedgerError>;

    async fn find_transaction(&self, reference: &str)
        -> Result<Option<Transaction>, DatabaseError>;

    /// Most recent first.
    async fn list_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Transaction>, DatabaseError>;

    /// Pending transactions of the given kinds created before `older_than`, oldest first.
    async fn find_stale_pending(
        &self,
        kinds: &[TransactionKind],
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Transaction>, DatabaseError>;

    /// Move a pending transaction to a terminal status and apply its wallet effect.
    async fn settle(
        &self,
        reference: &str,
        settlement: Settlement,
    ) -> Result<SettleOutcome, LedgerError>;

    async fn ping(&self) -> Result<(), DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_negative_amounts_are_rejected() {
        assert!(matches!(
            ensure_positive(Decimal::ZERO),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            ensure_positive(Decimal::from(-5)),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(ensure_positive(Decimal::new(1, 2)).is_ok());
    }
}
