use crate::database::error::DatabaseError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A dedicated bank account that funds one user's wallet on transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct VirtualAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Gateway that issued the account (`monnify`, `payrant`, `vtstack`).
    pub provider: String,
    pub account_number: String,
    pub account_name: String,
    pub bank_name: String,
    /// Reference we gave the gateway when reserving it.
    pub reference: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVirtualAccount {
    pub user_id: Uuid,
    pub provider: String,
    pub account_number: String,
    pub account_name: String,
    pub bank_name: String,
    pub reference: String,
}

impl NewVirtualAccount {
    pub fn into_account(self) -> VirtualAccount {
        VirtualAccount {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            provider: self.provider,
            account_number: self.account_number,
            account_name: self.account_name,
            bank_name: self.bank_name,
            reference: self.reference,
            status: "active".to_string(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait VirtualAccountStore: Send + Sync {
    /// Fails with a unique violation when the user already has an account with
    /// this provider, or the account number is taken.
    async fn insert(&self, account: NewVirtualAccount) -> Result<VirtualAccount, DatabaseError>;

    async fn find_for_user(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> Result<Option<VirtualAccount>, DatabaseError>;

    async fn find_by_account_number(
        &self,
        account_number: &str,
    ) -> Result<Option<VirtualAccount>, DatabaseError>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<VirtualAccount>, DatabaseError>;
}

const COLUMNS: &str =
    "id, user_id, provider, account_number, account_name, bank_name, reference, status, created_at";

pub struct VirtualAccountRepository {
    pool: PgPool,
}

impl VirtualAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VirtualAccountStore for VirtualAccountRepository {
    async fn insert(&self, account: NewVirtualAccount) -> Result<VirtualAccount, DatabaseError> {
        sqlx::query_as::<_, VirtualAccount>(&format!(
            "INSERT INTO virtual_accounts
             (user_id, provider, account_number, account_name, bank_name, reference)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            COLUMNS
        ))
        .bind(account.user_id)
        .bind(&account.provider)
        .bind(&account.account_number)
        .bind(&account.account_name)
        .bind(&account.bank_name)
        .bind(&account.reference)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_for_user(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> Result<Option<VirtualAccount>, DatabaseError> {
        sqlx::query_as::<_, VirtualAccount>(&format!(
            "SELECT {} FROM virtual_accounts WHERE user_id = $1 AND provider = $2",
            COLUMNS
        ))
        .bind(user_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_account_number(
        &self,
        account_number: &str,
    ) -> Result<Option<VirtualAccount>, DatabaseError> {
        sqlx::query_as::<_, VirtualAccount>(&format!(
            "SELECT {} FROM virtual_accounts WHERE account_number = $1",
            COLUMNS
        ))
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<VirtualAccount>, DatabaseError> {
        sqlx::query_as::<_, VirtualAccount>(&format!(
            "SELECT {} FROM virtual_accounts WHERE user_id = $1 ORDER BY created_at",
            COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
