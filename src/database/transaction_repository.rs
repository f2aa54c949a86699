use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::ledger_store::{ensure_positive, LedgerError, LedgerStore};
use crate::database::transaction::{
    NewTransaction, SettleOutcome, Settlement, Transaction, TransactionKind, Wallet, WalletEffect,
};

const WALLET_COLUMNS: &str = "id, user_id, balance, currency, last_transaction_at, created_at";

const TRANSACTION_COLUMNS: &str = "id, reference, user_id, wallet_id, kind, amount, fee, \
     total_charged, status, payment_method, provider, external_reference, failure_reason, \
     metadata, created_at, updated_at";

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    reference: String,
    user_id: Uuid,
    wallet_id: Uuid,
    kind: String,
    amount: Decimal,
    fee: Decimal,
    total_charged: Decimal,
    status: String,
    payment_method: String,
    provider: Option<String>,
    external_reference: Option<String>,
    failure_reason: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DatabaseError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: row.id,
            reference: row.reference,
            user_id: row.user_id,
            wallet_id: row.wallet_id,
            kind: row.kind.parse().map_err(DatabaseError::unknown)?,
            amount: row.amount,
            fee: row.fee,
            total_charged: row.total_charged,
            status: row.status.parse().map_err(DatabaseError::unknown)?,
            payment_method: row.payment_method.parse().map_err(DatabaseError::unknown)?,
            provider: row.provider,
            external_reference: row.external_reference,
            failure_reason: row.failure_reason,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn map_insert_error(err: sqlx::Error, reference: &str) -> LedgerError {
    let err = DatabaseError::from_sqlx(err);
    if err.is_unique_violation() {
        LedgerError::DuplicateReference(reference.to_string())
    } else {
        LedgerError::Database(err)
    }
}

/// Postgres ledger: wallets and transactions, mutated together inside
/// database transactions.
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_pending(
        executor: &mut sqlx::PgConnection,
        tx: &NewTransaction,
        wallet_id: Uuid,
    ) -> Result<Transaction, LedgerError> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "INSERT INTO transactions
             (reference, user_id, wallet_id, kind, amount, fee, total_charged,
              status, payment_method, provider, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9, $10)
             RETURNING {}",
            TRANSACTION_COLUMNS
        ))
        .bind(&tx.reference)
        .bind(tx.user_id)
        .bind(wallet_id)
        .bind(tx.kind.as_str())
        .bind(tx.amount)
        .bind(tx.fee)
        .bind(tx.total_charged())
        .bind(tx.payment_method.as_str())
        .bind(&tx.provider)
        .bind(&tx.metadata)
        .fetch_one(executor)
        .await
        .map_err(|e| map_insert_error(e, &tx.reference))?;

        Ok(Transaction::try_from(row)?)
    }

    async fn lock_wallet(
        executor: &mut sqlx::PgConnection,
        user_id: Uuid,
    ) -> Result<Wallet, LedgerError> {
        sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {} FROM wallets WHERE user_id = $1 FOR UPDATE",
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or(LedgerError::WalletNotFound(user_id))
    }
}

#[async_trait]
impl LedgerStore for TransactionRepository {
    async fn create_wallet(&self, user_id: Uuid, currency: &str) -> Result<Wallet, LedgerError> {
        let inserted = sqlx::query_as::<_, Wallet>(&format!(
            "INSERT INTO wallets (user_id, currency) VALUES ($1, $2)
             ON CONFLICT (user_id) DO NOTHING
             RETURNING {}",
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .bind(currency)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match inserted {
            Some(wallet) => Ok(wallet),
            None => self
                .find_wallet(user_id)
                .await?
                .ok_or(LedgerError::WalletNotFound(user_id)),
        }
    }

    async fn find_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, DatabaseError> {
        sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {} FROM wallets WHERE user_id = $1",
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn credit(&self, user_id: Uuid, amount: Decimal) -> Result<Wallet, LedgerError> {
        ensure_positive(amount)?;

        sqlx::query_as::<_, Wallet>(&format!(
            "UPDATE wallets
             SET balance = balance + $2, last_transaction_at = NOW()
             WHERE user_id = $1
             RETURNING {}",
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or(LedgerError::WalletNotFound(user_id))
    }

    async fn debit(&self, user_id: Uuid, amount: Decimal) -> Result<Wallet, LedgerError> {
        ensure_positive(amount)?;

        // The balance guard makes the check and the write one statement.
        let updated = sqlx::query_as::<_, Wallet>(&format!(
            "UPDATE wallets
             SET balance = balance - $2, last_transaction_at = NOW()
             WHERE user_id = $1 AND balance >= $2
             RETURNING {}",
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match updated {
            Some(wallet) => Ok(wallet),
            None => match self.find_wallet(user_id).await? {
                Some(wallet) => Err(LedgerError::InsufficientBalance {
                    available: wallet.balance,
                    required: amount,
                }),
                None => Err(LedgerError::WalletNotFound(user_id)),
            },
        }
    }

    async fn open_debit(&self, new_tx: NewTransaction) -> Result<(Transaction, Wallet), LedgerError> {
        let total = new_tx.total_charged();
        ensure_positive(total)?;

        let mut db_tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let wallet = Self::lock_wallet(&mut *db_tx, new_tx.user_id).await?;
        if wallet.balance < total {
            db_tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Err(LedgerError::InsufficientBalance {
                available: wallet.balance,
                required: total,
            });
        }

        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            "UPDATE wallets
             SET balance = balance - $2, last_transaction_at = NOW()
             WHERE id = $1
             RETURNING {}",
            WALLET_COLUMNS
        ))
        .bind(wallet.id)
        .bind(total)
        .fetch_one(&mut *db_tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let transaction = Self::insert_pending(&mut *db_tx, &new_tx, wallet.id).await?;

        db_tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok((transaction, wallet))
    }

    async fn insert_transaction(&self, new_tx: NewTransaction) -> Result<Transaction, LedgerError> {
        ensure_positive(new_tx.amount)?;

        let wallet = self
            .find_wallet(new_tx.user_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(new_tx.user_id))?;

        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from_sqlx)?;
        Self::insert_pending(&mut *conn, &new_tx, wallet.id).await
    }

    async fn find_transaction(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, DatabaseError> {
        sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE reference = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(Transaction::try_from)
        .transpose()
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE user_id = $1
             ORDER BY created_at DESC LIMIT $2",
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .into_iter()
        .map(Transaction::try_from)
        .collect()
    }

    async fn find_stale_pending(
        &self,
        kinds: &[TransactionKind],
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let kinds: Vec<String> = kinds.iter().map(|k| k.as_str().to_string()).collect();

        sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions
             WHERE status = 'pending' AND kind = ANY($1) AND created_at < $2
             ORDER BY created_at ASC LIMIT $3",
            TRANSACTION_COLUMNS
        ))
        .bind(&kinds)
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .into_iter()
        .map(Transaction::try_from)
        .collect()
    }

    async fn settle(
        &self,
        reference: &str,
        settlement: Settlement,
    ) -> Result<SettleOutcome, LedgerError> {
        if let WalletEffect::Credit(amount) = settlement.effect {
            ensure_positive(amount)?;
        }

        let mut db_tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let current = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE reference = $1 FOR UPDATE",
            TRANSACTION_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(Transaction::try_from)
        .transpose()?
        .ok_or_else(|| LedgerError::TransactionNotFound(reference.to_string()))?;

        if current.status.is_terminal() {
            db_tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(SettleOutcome::AlreadyTerminal(current));
        }

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "UPDATE transactions
             SET status = $2,
                 external_reference = COALESCE($3, external_reference),
                 failure_reason = COALESCE($4, failure_reason),
                 metadata = metadata || COALESCE($5, '{{}}'::jsonb),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            TRANSACTION_COLUMNS
        ))
        .bind(current.id)
        .bind(settlement.status.as_str())
        .bind(&settlement.external_reference)
        .bind(&settlement.failure_reason)
        .bind(&settlement.metadata)
        .fetch_one(&mut *db_tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        let transaction = Transaction::try_from(row)?;

        let wallet_sql = match settlement.effect {
            WalletEffect::Credit(_) => format!(
                "UPDATE wallets
                 SET balance = balance + $2, last_transaction_at = NOW()
                 WHERE id = $1
                 RETURNING {}",
                WALLET_COLUMNS
            ),
            WalletEffect::None => format!("SELECT {} FROM wallets WHERE id = $1", WALLET_COLUMNS),
        };
        let mut query = sqlx::query_as::<Postgres, Wallet>(&wallet_sql).bind(current.wallet_id);
        if let WalletEffect::Credit(amount) = settlement.effect {
            query = query.bind(amount);
        }
        let wallet = query
            .fetch_one(&mut *db_tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        db_tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(SettleOutcome::Applied {
            transaction,
            wallet,
        })
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        crate::database::health_check(&self.pool).await
    }
}
