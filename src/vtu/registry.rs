use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::provider::VtuProvider;
use super::types::ServiceKind;
use crate::database::error::DatabaseError;
use crate::database::provider_config_repository::{ProviderConfig, ProviderConfigStore};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no provider available for {0}")]
    NoProviderAvailable(ServiceKind),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Maps stored provider configs onto the clients compiled into this binary.
///
/// Configs are read on every call; deactivating or re-prioritising a
/// provider takes effect on the next purchase.
pub struct ProviderRegistry {
    configs: Arc<dyn ProviderConfigStore>,
    clients: HashMap<&'static str, Arc<dyn VtuProvider>>,
    default_provider: Option<String>,
}

impl ProviderRegistry {
    pub fn new(configs: Arc<dyn ProviderConfigStore>) -> Self {
        Self {
            configs,
            clients: HashMap::new(),
            default_provider: None,
        }
    }

    pub fn with_default(mut self, code: impl Into<String>) -> Self {
        let code = code.into();
        self.default_provider = (!code.trim().is_empty()).then_some(code);
        self
    }

    pub fn register(&mut self, client: Arc<dyn VtuProvider>) {
        self.clients.insert(client.code(), client);
    }

    pub fn with_client(mut self, client: Arc<dyn VtuProvider>) -> Self {
        self.register(client);
        self
    }

    /// Registered client by code, regardless of its stored config. Used to
    /// re-query the provider that handled an earlier purchase.
    pub fn client(&self, code: &str) -> Option<Arc<dyn VtuProvider>> {
        self.clients.get(code).cloned()
    }

    pub fn registered_codes(&self) -> Vec<&'static str> {
        let mut codes: Vec<&'static str> = self.clients.keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    /// Active configs for `service` whose client is registered, in routing order.
    pub async fn candidates(&self, service: ServiceKind) -> Result<Vec<ProviderConfig>, RegistryError> {
        let configs = self.configs.list_active_for(service).await?;
        Ok(configs
            .into_iter()
            .filter(|config| {
                self.clients
                    .get(config.code.as_str())
                    .map(|client| client.supports(service))
                    .unwrap_or(false)
            })
            .collect())
    }

    pub async fn resolve(&self, service: ServiceKind) -> Result<Arc<dyn VtuProvider>, RegistryError> {
        if let Some(config) = self.candidates(service).await?.into_iter().next() {
            if let Some(client) = self.clients.get(config.code.as_str()) {
                debug!(service = %service, provider = %config.code, priority = config.priority, "resolved provider");
                return Ok(client.clone());
            }
        }

        if let Some(code) = self.default_provider.as_deref() {
            if let Some(client) = self.clients.get(code).filter(|c| c.supports(service)) {
                let explicitly_inactive = matches!(
                    self.configs.find(code).await?,
                    Some(ProviderConfig { active: false, .. })
                );
                if !explicitly_inactive {
                    warn!(service = %service, provider = code, "no active provider configured, using default");
                    return Ok(client.clone());
                }
            }
        }

        Err(RegistryError::NoProviderAvailable(service))
    }
}
