pub mod monnify;
pub mod payrant;
pub mod paystack;
pub mod vtstack;

pub use monnify::{MonnifyGateway, MonnifyGatewayConfig};
pub use payrant::PayrantGateway;
pub use paystack::{PaystackConfig, PaystackGateway};
pub use vtstack::VtstackGateway;
