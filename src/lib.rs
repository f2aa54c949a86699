//! VTU reseller platform core: wallet ledger, provider routing, purchase
//! flow and payment-gateway webhook reconciliation.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
pub mod vtu;
pub mod workers;
