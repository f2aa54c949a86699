//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::database::error::DatabaseError;
use crate::database::LedgerStore;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    ledger: Arc<dyn LedgerStore>,
    storage: &'static str,
    vtu_providers: Vec<&'static str>,
    gateways: Vec<String>,
}

impl HealthChecker {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        storage: &'static str,
        vtu_providers: Vec<&'static str>,
        gateways: Vec<String>,
    ) -> Self {
        Self {
            ledger,
            storage,
            vtu_providers,
            gateways,
        }
    }

    /// Storage must answer; missing providers or gateways only degrade.
    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();
        let mut storage_up = true;
        let mut degraded = false;

        match timeout(Duration::from_secs(5), check_storage_health(self.ledger.as_ref())).await {
            Ok(Ok(response_time)) => {
                health_status.checks.insert(
                    "storage".to_string(),
                    ComponentHealth {
                        details: Some(self.storage.to_string()),
                        ..ComponentHealth::up(Some(response_time))
                    },
                );
                info!("Storage health check: OK ({}ms)", response_time);
            }
            Ok(Err(e)) => {
                storage_up = false;
                health_status.checks.insert(
                    "storage".to_string(),
                    ComponentHealth::down(Some(e.to_string())),
                );
                error!("Storage health check failed: {}", e);
            }
            Err(_) => {
                storage_up = false;
                health_status.checks.insert(
                    "storage".to_string(),
                    ComponentHealth::down(Some("Timeout".to_string())),
                );
                error!("Storage health check timed out");
            }
        }

        let providers = if self.vtu_providers.is_empty() {
            degraded = true;
            warn!("No VTU provider clients registered");
            ComponentHealth::warning(None, Some("no providers registered".to_string()))
        } else {
            ComponentHealth {
                details: Some(self.vtu_providers.join(",")),
                ..ComponentHealth::up(None)
            }
        };
        health_status
            .checks
            .insert("vtu_providers".to_string(), providers);

        let gateways = if self.gateways.is_empty() {
            degraded = true;
            ComponentHealth::warning(None, Some("no payment gateways configured".to_string()))
        } else {
            ComponentHealth {
                details: Some(self.gateways.join(",")),
                ..ComponentHealth::up(None)
            }
        };
        health_status
            .checks
            .insert("payment_gateways".to_string(), gateways);

        health_status.status = match (storage_up, degraded) {
            (false, _) => HealthState::Unhealthy,
            (true, true) => HealthState::Degraded,
            (true, false) => HealthState::Healthy,
        };

        health_status
    }
}

pub async fn check_storage_health(ledger: &dyn LedgerStore) -> Result<u128, DatabaseError> {
    let start = Instant::now();
    ledger.ping().await?;
    Ok(start.elapsed().as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    #[tokio::test]
    async fn test_health_status_creation() {
        let health_status = HealthStatus::new();
        assert!(matches!(health_status.status, HealthState::Healthy));
        assert!(health_status.checks.is_empty());
        assert!(health_status.timestamp <= chrono::Utc::now());
    }

    #[test]
    fn test_component_health_states() {
        let up_health = ComponentHealth::up(Some(100));
        assert!(matches!(up_health.status, ComponentState::Up));
        assert_eq!(up_health.response_time_ms, Some(100));

        let down_health = ComponentHealth::down(Some("Test error".to_string()));
        assert!(matches!(down_health.status, ComponentState::Down));
        assert_eq!(down_health.details, Some("Test error".to_string()));
    }

    #[tokio::test]
    async fn storage_outage_is_unhealthy() {
        let store = Arc::new(MemoryStore::new());
        let checker = HealthChecker::new(store.clone(), "memory", vec!["vtpass"], vec![]);

        assert_eq!(checker.check_health().await.status, HealthState::Degraded);

        store.set_unavailable(true);
        let status = checker.check_health().await;
        assert_eq!(status.status, HealthState::Unhealthy);
        assert_eq!(status.checks["storage"].status, ComponentState::Down);
    }
}
