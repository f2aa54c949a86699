//! In-memory stores, used when no database is configured and by the tests.
//!
//! All state sits behind one async mutex, so every operation is atomic with
//! respect to every other, which is the same guarantee the Postgres
//! repositories get from row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::database::airtime_to_cash_repository::{
    AirtimeToCashRequest, AirtimeToCashSetting, AirtimeToCashStore, ConversionStatus, Review,
};
use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::ledger_store::{ensure_positive, LedgerError, LedgerStore};
use crate::database::provider_config_repository::{
    sort_for_routing, ProviderConfig, ProviderConfigStore, ProviderConfigUpdate,
};
use crate::database::transaction::{
    merge_metadata, NewTransaction, SettleOutcome, Settlement, Transaction, TransactionKind,
    Wallet, WalletEffect,
};
use crate::database::virtual_account_repository::{
    NewVirtualAccount, VirtualAccount, VirtualAccountStore,
};
use crate::vtu::types::{Network, ServiceKind};

#[derive(Debug, Default)]
struct State {
    /// Keyed by user id.
    wallets: HashMap<Uuid, Wallet>,
    /// Keyed by reference.
    transactions: HashMap<String, Transaction>,
    providers: HashMap<String, ProviderConfig>,
    virtual_accounts: Vec<VirtualAccount>,
    a2c_settings: HashMap<Network, AirtimeToCashSetting>,
    a2c_requests: HashMap<Uuid, AirtimeToCashRequest>,
}

impl State {
    fn wallet_mut(&mut self, user_id: Uuid) -> Result<&mut Wallet, LedgerError> {
        self.wallets
            .get_mut(&user_id)
            .ok_or(LedgerError::WalletNotFound(user_id))
    }

    fn wallet_by_id_mut(&mut self, wallet_id: Uuid) -> Result<&mut Wallet, LedgerError> {
        self.wallets
            .values_mut()
            .find(|w| w.id == wallet_id)
            .ok_or_else(|| LedgerError::Database(DatabaseError::new(DatabaseErrorKind::NotFound)))
    }

    fn insert_pending(
        &mut self,
        tx: NewTransaction,
        wallet_id: Uuid,
    ) -> Result<Transaction, LedgerError> {
        if self.transactions.contains_key(&tx.reference) {
            return Err(LedgerError::DuplicateReference(tx.reference));
        }
        let transaction = tx.into_pending(wallet_id);
        self.transactions
            .insert(transaction.reference.clone(), transaction.clone());
        Ok(transaction)
    }
}

fn unique_violation(constraint: &str) -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::UniqueViolation {
        constraint: Some(constraint.to_string()),
    })
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), DatabaseError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DatabaseError::new(DatabaseErrorKind::Connection {
                message: "memory store marked unavailable".to_string(),
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_wallet(&self, user_id: Uuid, currency: &str) -> Result<Wallet, LedgerError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let wallet = state
            .wallets
            .entry(user_id)
            .or_insert_with(|| Wallet::new(user_id, currency));
        Ok(wallet.clone())
    }

    async fn find_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, DatabaseError> {
        self.check_available()?;
        Ok(self.state.lock().await.wallets.get(&user_id).cloned())
    }

    async fn credit(&self, user_id: Uuid, amount: Decimal) -> Result<Wallet, LedgerError> {
        self.check_available()?;
        ensure_positive(amount)?;
        let mut state = self.state.lock().await;
        let wallet = state.wallet_mut(user_id)?;
        wallet.balance += amount;
        wallet.last_transaction_at = Some(Utc::now());
        Ok(wallet.clone())
    }

    async fn debit(&self, user_id: Uuid, amount: Decimal) -> Result<Wallet, LedgerError> {
        self.check_available()?;
        ensure_positive(amount)?;
        let mut state = self.state.lock().await;
        let wallet = state.wallet_mut(user_id)?;
        if wallet.balance < amount {
            return Err(LedgerError::InsufficientBalance {
                available: wallet.balance,
                required: amount,
            });
        }
        wallet.balance -= amount;
        wallet.last_transaction_at = Some(Utc::now());
        Ok(wallet.clone())
    }

    async fn open_debit(&self, tx: NewTransaction) -> Result<(Transaction, Wallet), LedgerError> {
        self.check_available()?;
        let total = tx.total_charged();
        ensure_positive(total)?;

        let mut state = self.state.lock().await;
        if state.transactions.contains_key(&tx.reference) {
            return Err(LedgerError::DuplicateReference(tx.reference));
        }

        let wallet = state.wallet_mut(tx.user_id)?;
        if wallet.balance < total {
            return Err(LedgerError::InsufficientBalance {
                available: wallet.balance,
                required: total,
            });
        }
        wallet.balance -= total;
        wallet.last_transaction_at = Some(Utc::now());
        let wallet = wallet.clone();

        let transaction = state.insert_pending(tx, wallet.id)?;
        Ok((transaction, wallet))
    }

    async fn insert_transaction(&self, tx: NewTransaction) -> Result<Transaction, LedgerError> {
        self.check_available()?;
        ensure_positive(tx.amount)?;
        let mut state = self.state.lock().await;
        let wallet_id = state.wallet_mut(tx.user_id)?.id;
        state.insert_pending(tx, wallet_id)
    }

    async fn find_transaction(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, DatabaseError> {
        self.check_available()?;
        Ok(self.state.lock().await.transactions.get(reference).cloned())
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        self.check_available()?;
        let state = self.state.lock().await;
        let mut items: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn find_stale_pending(
        &self,
        kinds: &[TransactionKind],
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        self.check_available()?;
        let state = self.state.lock().await;
        let mut items: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| !t.status.is_terminal())
            .filter(|t| kinds.contains(&t.kind))
            .filter(|t| t.created_at < older_than)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn settle(
        &self,
        reference: &str,
        settlement: Settlement,
    ) -> Result<SettleOutcome, LedgerError> {
        self.check_available()?;
        if let WalletEffect::Credit(amount) = settlement.effect {
            ensure_positive(amount)?;
        }

        let mut state = self.state.lock().await;
        let current = state
            .transactions
            .get(reference)
            .cloned()
            .ok_or_else(|| LedgerError::TransactionNotFound(reference.to_string()))?;

        if current.status.is_terminal() {
            return Ok(SettleOutcome::AlreadyTerminal(current));
        }

        let wallet = state.wallet_by_id_mut(current.wallet_id)?;
        if let WalletEffect::Credit(amount) = settlement.effect {
            wallet.balance += amount;
            wallet.last_transaction_at = Some(Utc::now());
        }
        let wallet = wallet.clone();

        let mut transaction = current;
        transaction.status = settlement.status;
        if settlement.external_reference.is_some() {
            transaction.external_reference = settlement.external_reference;
        }
        if settlement.failure_reason.is_some() {
            transaction.failure_reason = settlement.failure_reason;
        }
        if let Some(extra) = settlement.metadata {
            merge_metadata(&mut transaction.metadata, extra);
        }
        transaction.updated_at = Utc::now();
        state
            .transactions
            .insert(transaction.reference.clone(), transaction.clone());

        Ok(SettleOutcome::Applied {
            transaction,
            wallet,
        })
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        self.check_available()
    }
}

#[async_trait]
impl ProviderConfigStore for MemoryStore {
    async fn list_active_for(
        &self,
        service: ServiceKind,
    ) -> Result<Vec<ProviderConfig>, DatabaseError> {
        self.check_available()?;
        let state = self.state.lock().await;
        let mut configs: Vec<ProviderConfig> = state
            .providers
            .values()
            .filter(|c| c.active && c.supports(service))
            .cloned()
            .collect();
        sort_for_routing(&mut configs);
        Ok(configs)
    }

    async fn list_all(&self) -> Result<Vec<ProviderConfig>, DatabaseError> {
        self.check_available()?;
        let state = self.state.lock().await;
        let mut configs: Vec<ProviderConfig> = state.providers.values().cloned().collect();
        sort_for_routing(&mut configs);
        Ok(configs)
    }

    async fn find(&self, code: &str) -> Result<Option<ProviderConfig>, DatabaseError> {
        self.check_available()?;
        Ok(self.state.lock().await.providers.get(code).cloned())
    }

    async fn upsert(&self, mut config: ProviderConfig) -> Result<ProviderConfig, DatabaseError> {
        self.check_available()?;
        config.updated_at = Utc::now();
        self.state
            .lock()
            .await
            .providers
            .insert(config.code.clone(), config.clone());
        Ok(config)
    }

    async fn update(
        &self,
        code: &str,
        update: ProviderConfigUpdate,
    ) -> Result<Option<ProviderConfig>, DatabaseError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let Some(config) = state.providers.get_mut(code) else {
            return Ok(None);
        };
        if let Some(active) = update.active {
            config.active = active;
        }
        if let Some(priority) = update.priority {
            config.priority = priority;
        }
        config.updated_at = Utc::now();
        Ok(Some(config.clone()))
    }
}

#[async_trait]
impl VirtualAccountStore for MemoryStore {
    async fn insert(&self, account: NewVirtualAccount) -> Result<VirtualAccount, DatabaseError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        for existing in &state.virtual_accounts {
            if existing.user_id == account.user_id && existing.provider == account.provider {
                return Err(unique_violation("virtual_accounts_user_provider_key"));
            }
            if existing.account_number == account.account_number {
                return Err(unique_violation("virtual_accounts_account_number_key"));
            }
            if existing.reference == account.reference {
                return Err(unique_violation("virtual_accounts_reference_key"));
            }
        }
        let account = account.into_account();
        state.virtual_accounts.push(account.clone());
        Ok(account)
    }

    async fn find_for_user(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> Result<Option<VirtualAccount>, DatabaseError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .virtual_accounts
            .iter()
            .find(|a| a.user_id == user_id && a.provider == provider)
            .cloned())
    }

    async fn find_by_account_number(
        &self,
        account_number: &str,
    ) -> Result<Option<VirtualAccount>, DatabaseError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .virtual_accounts
            .iter()
            .find(|a| a.account_number == account_number)
            .cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<VirtualAccount>, DatabaseError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .virtual_accounts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AirtimeToCashStore for MemoryStore {
    async fn find_setting(
        &self,
        network: Network,
    ) -> Result<Option<AirtimeToCashSetting>, DatabaseError> {
        self.check_available()?;
        Ok(self.state.lock().await.a2c_settings.get(&network).cloned())
    }

    async fn upsert_setting(
        &self,
        setting: AirtimeToCashSetting,
    ) -> Result<AirtimeToCashSetting, DatabaseError> {
        self.check_available()?;
        self.state
            .lock()
            .await
            .a2c_settings
            .insert(setting.network, setting.clone());
        Ok(setting)
    }

    async fn insert_request(
        &self,
        request: AirtimeToCashRequest,
    ) -> Result<AirtimeToCashRequest, DatabaseError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if state.a2c_requests.contains_key(&request.id) {
            return Err(unique_violation("airtime_to_cash_requests_pkey"));
        }
        state.a2c_requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_request(&self, id: Uuid) -> Result<Option<AirtimeToCashRequest>, DatabaseError> {
        self.check_available()?;
        Ok(self.state.lock().await.a2c_requests.get(&id).cloned())
    }

    async fn review(
        &self,
        id: Uuid,
        review: Review,
    ) -> Result<Option<AirtimeToCashRequest>, DatabaseError> {
        self.check_available()?;
        if review.status == ConversionStatus::Pending {
            return Err(DatabaseError::unknown("a review must approve or reject"));
        }
        let mut state = self.state.lock().await;
        let Some(request) = state.a2c_requests.get_mut(&id) else {
            return Ok(None);
        };
        if request.status != ConversionStatus::Pending {
            return Ok(None);
        }
        request.status = review.status;
        request.reviewed_by = Some(review.reviewed_by);
        request.rejection_reason = review.rejection_reason;
        request.updated_at = Utc::now();
        Ok(Some(request.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::transaction::{PaymentMethod, TransactionStatus};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn purchase(user_id: Uuid, reference: &str, amount: i64) -> NewTransaction {
        NewTransaction {
            reference: reference.to_string(),
            user_id,
            kind: TransactionKind::Airtime,
            amount: Decimal::from(amount),
            fee: Decimal::ZERO,
            payment_method: PaymentMethod::Wallet,
            provider: None,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn create_wallet_is_idempotent() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let first = store.create_wallet(user, "NGN").await.unwrap();
        let second = store.create_wallet(user, "NGN").await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn credit_then_debit() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.create_wallet(user, "NGN").await.unwrap();

        store.credit(user, Decimal::from(5000)).await.unwrap();
        let wallet = store.debit(user, Decimal::from(1200)).await.unwrap();
        assert_eq!(wallet.balance, Decimal::from(3800));
        assert!(wallet.last_transaction_at.is_some());

        let err = store.debit(user, Decimal::from(4000)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(
            store.find_wallet(user).await.unwrap().unwrap().balance,
            Decimal::from(3800)
        );
    }

    #[tokio::test]
    async fn missing_wallet_and_non_positive_amounts() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        assert!(matches!(
            store.credit(user, Decimal::from(10)).await,
            Err(LedgerError::WalletNotFound(_))
        ));
        assert!(matches!(
            store.debit(user, Decimal::from(10)).await,
            Err(LedgerError::WalletNotFound(_))
        ));

        store.create_wallet(user, "NGN").await.unwrap();
        assert!(matches!(
            store.credit(user, Decimal::ZERO).await,
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            store.debit(user, Decimal::from(-5)).await,
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn mixed_credit_debit_sequences_keep_the_books() {
        for seed in 0..20u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let store = MemoryStore::new();
            let user = Uuid::new_v4();
            store.create_wallet(user, "NGN").await.unwrap();

            let initial = Decimal::new(rng.gen_range(0..=100_000), 2);
            if initial > Decimal::ZERO {
                store.credit(user, initial).await.unwrap();
            }
            let mut credits = Decimal::ZERO;
            let mut debits = Decimal::ZERO;

            for _ in 0..200 {
                let amount = Decimal::new(rng.gen_range(1..=80_000), 2);
                let before = store.find_wallet(user).await.unwrap().unwrap().balance;
                if rng.gen_bool(0.5) {
                    store.credit(user, amount).await.unwrap();
                    credits += amount;
                } else {
                    match store.debit(user, amount).await {
                        Ok(_) => {
                            assert!(amount <= before, "seed {}: overdrew {}", seed, before);
                            debits += amount;
                        }
                        Err(LedgerError::InsufficientBalance { available, required }) => {
                            assert!(amount > before);
                            assert_eq!((available, required), (before, amount));
                        }
                        Err(e) => panic!("seed {}: unexpected error {}", seed, e),
                    }
                }
                let balance = store.find_wallet(user).await.unwrap().unwrap().balance;
                assert!(balance >= Decimal::ZERO, "seed {}: negative balance", seed);
            }

            let balance = store.find_wallet(user).await.unwrap().unwrap().balance;
            assert_eq!(balance, initial + credits - debits, "seed {}", seed);
        }
    }

    #[tokio::test]
    async fn open_debit_writes_nothing_when_short() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.create_wallet(user, "NGN").await.unwrap();
        store.credit(user, Decimal::from(500)).await.unwrap();

        let err = store
            .open_debit(purchase(user, "P-1", 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert!(store.find_transaction("P-1").await.unwrap().is_none());
        assert_eq!(
            store.find_wallet(user).await.unwrap().unwrap().balance,
            Decimal::from(500)
        );
    }

    #[tokio::test]
    async fn settle_only_applies_once() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.create_wallet(user, "NGN").await.unwrap();
        let mut funding = purchase(user, "F-1", 2000);
        funding.kind = TransactionKind::Funding;
        store.insert_transaction(funding).await.unwrap();

        let first = store
            .settle(
                "F-1",
                Settlement::successful(WalletEffect::Credit(Decimal::from(2000))),
            )
            .await
            .unwrap();
        assert!(matches!(first, SettleOutcome::Applied { .. }));

        let second = store
            .settle(
                "F-1",
                Settlement::successful(WalletEffect::Credit(Decimal::from(2000))),
            )
            .await
            .unwrap();
        match second {
            SettleOutcome::AlreadyTerminal(tx) => assert_eq!(tx.status, TransactionStatus::Successful),
            other => panic!("expected AlreadyTerminal, got {:?}", other),
        }
        assert_eq!(
            store.find_wallet(user).await.unwrap().unwrap().balance,
            Decimal::from(2000)
        );
    }

    #[tokio::test]
    async fn duplicate_virtual_account_for_provider_is_a_unique_violation() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let account = |number: &str, reference: &str| NewVirtualAccount {
            user_id: user,
            provider: "monnify".to_string(),
            account_number: number.to_string(),
            account_name: "Ada".to_string(),
            bank_name: "Wema".to_string(),
            reference: reference.to_string(),
        };
        store.insert(account("0123456789", "VA-1")).await.unwrap();
        let err = store.insert(account("0987654321", "VA-2")).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn unavailable_store_reports_connection_errors() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = store.ping().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
