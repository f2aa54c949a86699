use crate::config::GatewayConfig;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::gateway::PaymentGateway;
use crate::payments::gateways::{
    MonnifyGateway, MonnifyGatewayConfig, PayrantGateway, PaystackConfig, PaystackGateway,
    VtstackGateway,
};
use crate::payments::types::GatewayId;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Configured payment gateways, keyed by id. Gateways without credentials
/// are simply absent, so their webhooks are rejected as unknown.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<GatewayId, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &GatewayConfig) -> PaymentResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut registry = Self::new();

        if let Some(paystack) =
            PaystackConfig::from_credentials(&config.paystack, config.timeout_secs, config.max_retries)
        {
            registry.register(Arc::new(PaystackGateway::new(paystack)?));
        }
        if let Some(monnify) =
            MonnifyGatewayConfig::from_config(&config.monnify, config.timeout_secs, config.max_retries)
        {
            registry.register(Arc::new(MonnifyGateway::new(monnify)?));
        }
        if let Some(payrant) =
            PayrantGateway::from_credentials(&config.payrant, timeout, config.max_retries)
        {
            registry.register(Arc::new(payrant?));
        }
        if let Some(vtstack) =
            VtstackGateway::from_credentials(&config.vtstack, timeout, config.max_retries)
        {
            registry.register(Arc::new(vtstack?));
        }

        info!(gateways = ?registry.list_available(), "payment gateways configured");
        Ok(registry)
    }

    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway.id(), gateway);
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.register(gateway);
        self
    }

    pub fn get(&self, id: GatewayId) -> PaymentResult<Arc<dyn PaymentGateway>> {
        self.gateways
            .get(&id)
            .cloned()
            .ok_or(PaymentError::ValidationError {
                message: format!("gateway {} is not configured", id),
                field: Some("gateway".to_string()),
            })
    }

    /// Look up a gateway by the path segment a webhook arrived on.
    pub fn get_by_name(&self, name: &str) -> PaymentResult<Arc<dyn PaymentGateway>> {
        self.get(GatewayId::from_str(name)?)
    }

    pub fn list_available(&self) -> Vec<GatewayId> {
        let mut ids: Vec<GatewayId> = self.gateways.keys().copied().collect();
        ids.sort_by_key(|id| id.as_str());
        ids
    }
}
