pub mod error;
pub mod gateway;
pub mod gateways;
pub mod registry;
pub mod token_cache;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use gateway::PaymentGateway;
pub use registry::GatewayRegistry;
pub use types::{GatewayId, WebhookEvent, WebhookOutcome};
