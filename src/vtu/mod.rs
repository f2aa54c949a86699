//! Upstream VTU providers: the client trait, the per-provider adapters, the
//! priority registry and the single place where provider replies are judged.

pub mod interpret;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod types;

pub use interpret::{interpret_reply, Verdict};
pub use provider::VtuProvider;
pub use registry::{ProviderRegistry, RegistryError};
pub use types::{Network, ProviderReply, ReplyStatus, ServiceKind, VtuRequest};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum VtuError {
    /// The request may have reached the provider; the outcome is unknown.
    #[error("provider {provider} timed out: {message}")]
    Timeout { provider: String, message: String },

    /// The request never left this process.
    #[error("could not connect to provider {provider}: {message}")]
    Connect { provider: String, message: String },

    #[error("transport error from provider {provider}: {message}")]
    Transport { provider: String, message: String },

    #[error("provider {provider} does not support {service}")]
    Unsupported { provider: String, service: ServiceKind },

    #[error("invalid request for provider {provider}: {message}")]
    InvalidRequest { provider: String, message: String },
}

impl VtuError {
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        let provider = provider.to_string();
        let message = err.to_string();
        if err.is_timeout() {
            VtuError::Timeout { provider, message }
        } else if err.is_connect() {
            VtuError::Connect { provider, message }
        } else {
            VtuError::Transport { provider, message }
        }
    }
}
