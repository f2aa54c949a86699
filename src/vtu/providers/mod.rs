pub mod smeplug;
pub mod topupmate;
pub mod vtpass;

pub use smeplug::SmeplugProvider;
pub use topupmate::TopupmateProvider;
pub use vtpass::VtpassProvider;

use std::sync::Arc;

use super::provider::VtuProvider;
use super::VtuError;
use crate::config::VtuConfig;

/// Clients for every provider with credentials configured.
pub fn clients_from_config(config: &VtuConfig) -> Result<Vec<Arc<dyn VtuProvider>>, VtuError> {
    let mut clients: Vec<Arc<dyn VtuProvider>> = Vec::new();

    if let (Some(api_key), Some(secret_key)) = (&config.vtpass.api_key, &config.vtpass.secret_key) {
        clients.push(Arc::new(VtpassProvider::new(
            api_key.clone(),
            secret_key.clone(),
            config.vtpass.base_url.clone(),
            config.request_timeout,
        )?));
    }
    if let Some(api_key) = &config.topupmate.api_key {
        clients.push(Arc::new(TopupmateProvider::new(
            api_key.clone(),
            config.topupmate.base_url.clone(),
            config.request_timeout,
        )?));
    }
    if let Some(api_key) = &config.smeplug.api_key {
        clients.push(Arc::new(SmeplugProvider::new(
            api_key.clone(),
            config.smeplug.base_url.clone(),
            config.request_timeout,
        )?));
    }

    Ok(clients)
}
