use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::ServiceError;
use crate::database::{LedgerStore, Transaction, Wallet};

pub const DEFAULT_CURRENCY: &str = "NGN";
const MAX_HISTORY: i64 = 100;

/// Read side of the wallets. Balances only move through transactions
/// (`open_debit` and `settle`), so every change has a row in the history.
#[derive(Clone)]
pub struct WalletLedger {
    store: Arc<dyn LedgerStore>,
}

impl WalletLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn LedgerStore> {
        self.store.clone()
    }

    /// Idempotent: returns the existing wallet when there is one.
    pub async fn open_wallet(&self, user_id: Uuid) -> Result<Wallet, ServiceError> {
        let wallet = self.store.create_wallet(user_id, DEFAULT_CURRENCY).await?;
        info!(user_id = %user_id, wallet_id = %wallet.id, "wallet opened");
        Ok(wallet)
    }

    pub async fn wallet(&self, user_id: Uuid) -> Result<Wallet, ServiceError> {
        self.store
            .find_wallet(user_id)
            .await?
            .ok_or(ServiceError::WalletNotFound(user_id))
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<Decimal, ServiceError> {
        Ok(self.wallet(user_id).await?.balance)
    }

    /// A transaction owned by `user_id`; other users' references read as missing.
    pub async fn transaction(&self, user_id: Uuid, reference: &str) -> Result<Transaction, ServiceError> {
        self.store
            .find_transaction(reference)
            .await?
            .filter(|tx| tx.user_id == user_id)
            .ok_or_else(|| ServiceError::TransactionNotFound(reference.to_string()))
    }

    /// Most recent first, capped at 100 rows.
    pub async fn history(&self, user_id: Uuid, limit: i64) -> Result<Vec<Transaction>, ServiceError> {
        self.wallet(user_id).await?;
        let limit = limit.clamp(1, MAX_HISTORY);
        Ok(self.store.list_transactions(user_id, limit).await?)
    }
}
