pub mod airtime_to_cash_repository;
pub mod error;
pub mod ledger_store;
pub mod memory;
pub mod provider_config_repository;
pub mod transaction;
pub mod transaction_repository;
pub mod virtual_account_repository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error as log_error, info, warn};

use self::airtime_to_cash_repository::{AirtimeToCashRepository, AirtimeToCashStore};
use self::error::DatabaseError;
use self::provider_config_repository::{ProviderConfigRepository, ProviderConfigStore};
use self::transaction_repository::TransactionRepository;
use self::virtual_account_repository::{VirtualAccountRepository, VirtualAccountStore};
use crate::config::DatabaseConfig;

pub use ledger_store::{LedgerError, LedgerStore};
pub use memory::MemoryStore;
pub use transaction::{
    NewTransaction, PaymentMethod, SettleOutcome, Settlement, Transaction, TransactionKind,
    TransactionStatus, Wallet, WalletEffect,
};

/// Every store the services need, backed by one storage engine.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn LedgerStore>,
    pub providers: Arc<dyn ProviderConfigStore>,
    pub accounts: Arc<dyn VirtualAccountStore>,
    pub conversions: Arc<dyn AirtimeToCashStore>,
    /// `postgres` or `memory`, reported by the health check.
    pub engine: &'static str,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            ledger: Arc::new(TransactionRepository::new(pool.clone())),
            providers: Arc::new(ProviderConfigRepository::new(pool.clone())),
            accounts: Arc::new(VirtualAccountRepository::new(pool.clone())),
            conversions: Arc::new(AirtimeToCashRepository::new(pool)),
            engine: "postgres",
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            ledger: store.clone(),
            providers: store.clone(),
            accounts: store.clone(),
            conversions: store,
            engine: "memory",
        }
    }
}

/// Database pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 5,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// Initialize the database connection pool
pub async fn init_pool(
    database_url: &str,
    config: Option<PoolConfig>,
) -> Result<PgPool, DatabaseError> {
    let config = config.unwrap_or_default();

    info!(
        "Initializing database pool: max_connections={}, min_connections={}, connection_timeout={:?}",
        config.max_connections, config.min_connections, config.connection_timeout
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connection_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect(database_url)
        .await
        .map_err(|e| {
            log_error!("Failed to initialize database pool: {}", e);
            DatabaseError::from_sqlx(e)
        })?;

    info!("Database pool initialized successfully");
    Ok(pool)
}

/// Initialize the database pool from application configuration
pub async fn init_pool_from_config(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    let pool_config = PoolConfig {
        max_connections: config.max_connections,
        min_connections: config.min_connections,
        connection_timeout: Duration::from_secs(config.connection_timeout),
        idle_timeout: Duration::from_secs(config.idle_timeout.unwrap_or(600)),
        max_lifetime: Duration::from_secs(1800),
    };

    init_pool(&config.url, Some(pool_config)).await
}

/// Apply the embedded migrations in `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        log_error!("Migration failed: {}", e);
        DatabaseError::unknown(e.to_string())
    })?;
    info!("Database migrations applied");
    Ok(())
}

/// Connection pool health check
pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!("Health check failed: {}", e);
        DatabaseError::from_sqlx(e)
    })?;

    Ok(())
}
