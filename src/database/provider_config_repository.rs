use crate::database::error::DatabaseError;
use crate::vtu::types::ServiceKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::warn;

/// Routing entry for one upstream VTU provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub code: String,
    pub name: String,
    /// Lower wins.
    pub priority: i32,
    pub active: bool,
    pub supported_services: Vec<ServiceKind>,
    #[serde(skip_serializing, default)]
    pub credentials: serde_json::Value,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ProviderConfig {
    pub fn supports(&self, service: ServiceKind) -> bool {
        self.supported_services.contains(&service)
    }
}

/// Partial update applied by the admin surface.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfigUpdate {
    pub active: Option<bool>,
    pub priority: Option<i32>,
}

/// Ascending priority, then name.
pub fn sort_for_routing(configs: &mut [ProviderConfig]) {
    configs.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
}

#[async_trait]
pub trait ProviderConfigStore: Send + Sync {
    /// Active providers supporting `service`, in routing order.
    async fn list_active_for(
        &self,
        service: ServiceKind,
    ) -> Result<Vec<ProviderConfig>, DatabaseError>;

    async fn list_all(&self) -> Result<Vec<ProviderConfig>, DatabaseError>;

    async fn find(&self, code: &str) -> Result<Option<ProviderConfig>, DatabaseError>;

    async fn upsert(&self, config: ProviderConfig) -> Result<ProviderConfig, DatabaseError>;

    /// `None` when no provider has this code.
    async fn update(
        &self,
        code: &str,
        update: ProviderConfigUpdate,
    ) -> Result<Option<ProviderConfig>, DatabaseError>;
}

#[derive(Debug, FromRow)]
struct ProviderConfigRow {
    code: String,
    name: String,
    priority: i32,
    active: bool,
    supported_services: Vec<String>,
    credentials: serde_json::Value,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<ProviderConfigRow> for ProviderConfig {
    fn from(row: ProviderConfigRow) -> Self {
        let supported_services = row
            .supported_services
            .iter()
            .filter_map(|s| match s.parse::<ServiceKind>() {
                Ok(service) => Some(service),
                Err(e) => {
                    warn!(provider = %row.code, error = %e, "Ignoring unknown service in provider config");
                    None
                }
            })
            .collect();

        ProviderConfig {
            code: row.code,
            name: row.name,
            priority: row.priority,
            active: row.active,
            supported_services,
            credentials: row.credentials,
            updated_at: row.updated_at,
        }
    }
}

const COLUMNS: &str = "code, name, priority, active, supported_services, credentials, updated_at";

/// Postgres-backed provider configuration.
pub struct ProviderConfigRepository {
    pool: PgPool,
}

impl ProviderConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderConfigStore for ProviderConfigRepository {
    async fn list_active_for(
        &self,
        service: ServiceKind,
    ) -> Result<Vec<ProviderConfig>, DatabaseError> {
        let rows = sqlx::query_as::<_, ProviderConfigRow>(&format!(
            "SELECT {} FROM vtu_providers
             WHERE active = true AND $1 = ANY(supported_services)
             ORDER BY priority ASC, name ASC",
            COLUMNS
        ))
        .bind(service.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(rows.into_iter().map(ProviderConfig::from).collect())
    }

    async fn list_all(&self) -> Result<Vec<ProviderConfig>, DatabaseError> {
        let rows = sqlx::query_as::<_, ProviderConfigRow>(&format!(
            "SELECT {} FROM vtu_providers ORDER BY priority ASC, name ASC",
            COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(rows.into_iter().map(ProviderConfig::from).collect())
    }

    async fn find(&self, code: &str) -> Result<Option<ProviderConfig>, DatabaseError> {
        let row = sqlx::query_as::<_, ProviderConfigRow>(&format!(
            "SELECT {} FROM vtu_providers WHERE code = $1",
            COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(ProviderConfig::from))
    }

    async fn upsert(&self, config: ProviderConfig) -> Result<ProviderConfig, DatabaseError> {
        let services: Vec<String> = config
            .supported_services
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let row = sqlx::query_as::<_, ProviderConfigRow>(&format!(
            "INSERT INTO vtu_providers (code, name, priority, active, supported_services, credentials)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (code)
             DO UPDATE SET name = $2, priority = $3, active = $4,
                           supported_services = $5, credentials = $6, updated_at = NOW()
             RETURNING {}",
            COLUMNS
        ))
        .bind(&config.code)
        .bind(&config.name)
        .bind(config.priority)
        .bind(config.active)
        .bind(&services)
        .bind(&config.credentials)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.into())
    }

    async fn update(
        &self,
        code: &str,
        update: ProviderConfigUpdate,
    ) -> Result<Option<ProviderConfig>, DatabaseError> {
        let row = sqlx::query_as::<_, ProviderConfigRow>(&format!(
            "UPDATE vtu_providers
             SET active = COALESCE($2, active),
                 priority = COALESCE($3, priority),
                 updated_at = NOW()
             WHERE code = $1
             RETURNING {}",
            COLUMNS
        ))
        .bind(code)
        .bind(update.active)
        .bind(update.priority)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(ProviderConfig::from))
    }
}
