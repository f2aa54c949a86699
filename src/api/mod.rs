//! HTTP surface. Handlers stay thin: extract, call a service, shape the reply.

pub mod admin;
pub mod funding;
pub mod purchases;
pub mod wallet;
pub mod webhooks;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, patch, post, put},
    Json, Router,
};
use std::sync::Arc;
use tracing::error;

use crate::config::ServiceFees;
use crate::database::provider_config_repository::ProviderConfigStore;
use crate::database::Stores;
use crate::error::AppError;
use crate::health::{HealthChecker, HealthState, HealthStatus};
use crate::middleware::auth::admin_auth_middleware;
use crate::middleware::error::get_request_id_from_headers;
use crate::payments::GatewayRegistry;
use crate::services::{
    AirtimeToCashService, FundingService, PurchaseService, VirtualAccountService, WalletLedger,
    WebhookReconciler,
};
use crate::vtu::ProviderRegistry;

#[derive(Clone)]
pub struct AppState {
    pub ledger: WalletLedger,
    pub purchases: Arc<PurchaseService>,
    pub reconciler: Arc<WebhookReconciler>,
    pub funding: Arc<FundingService>,
    pub virtual_accounts: Arc<VirtualAccountService>,
    pub airtime_to_cash: Arc<AirtimeToCashService>,
    pub providers: Arc<dyn ProviderConfigStore>,
    pub health_checker: HealthChecker,
    /// Bearer token for `/admin`; `None` locks the admin routes.
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(
        stores: Stores,
        registry: ProviderRegistry,
        gateways: GatewayRegistry,
        fees: ServiceFees,
        callback_url: Option<String>,
        admin_token: Option<String>,
    ) -> Self {
        let registry = Arc::new(registry);
        let gateway_names = gateways
            .list_available()
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        let health_checker = HealthChecker::new(
            stores.ledger.clone(),
            stores.engine,
            registry.registered_codes(),
            gateway_names,
        );

        Self {
            ledger: WalletLedger::new(stores.ledger.clone()),
            purchases: Arc::new(PurchaseService::new(
                stores.ledger.clone(),
                registry,
                fees,
            )),
            reconciler: Arc::new(WebhookReconciler::new(
                gateways.clone(),
                stores.ledger.clone(),
                stores.accounts.clone(),
            )),
            funding: Arc::new(FundingService::new(
                stores.ledger.clone(),
                gateways.clone(),
                callback_url,
            )),
            virtual_accounts: Arc::new(VirtualAccountService::new(
                gateways,
                stores.accounts.clone(),
                stores.ledger.clone(),
            )),
            airtime_to_cash: Arc::new(AirtimeToCashService::new(
                stores.ledger.clone(),
                stores.conversions.clone(),
            )),
            providers: stores.providers,
            health_checker,
            admin_token: admin_token.filter(|t| !t.trim().is_empty()),
        }
    }
}

/// Every route, without the tracing and request-id layers added in `main`.
pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/admin/providers", get(admin::list_providers))
        .route("/admin/providers/{code}", patch(admin::update_provider))
        .route(
            "/admin/airtime-to-cash/settings",
            put(admin::configure_airtime_to_cash),
        )
        .route(
            "/admin/airtime-to-cash/{id}/approve",
            post(admin::approve_airtime_to_cash),
        )
        .route(
            "/admin/airtime-to-cash/{id}/reject",
            post(admin::reject_airtime_to_cash),
        )
        .route(
            "/admin/transactions/{reference}/refund",
            post(admin::refund_transaction),
        )
        .route(
            "/admin/transactions/{reference}/requery",
            post(admin::requery_transaction),
        )
        .route_layer(from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/webhooks/{gateway}", post(webhooks::handle_webhook))
        .route(
            "/api/wallet",
            get(wallet::get_wallet).post(wallet::open_wallet),
        )
        .route("/api/wallet/transactions", get(wallet::list_transactions))
        .route("/api/wallet/fund", post(funding::initialize_funding))
        .route(
            "/api/wallet/virtual-accounts",
            get(funding::list_virtual_accounts).post(funding::provision_virtual_account),
        )
        .route("/api/purchases", post(purchases::create_purchase))
        .route("/api/purchases/{reference}", get(purchases::get_purchase))
        .route("/api/airtime-to-cash", post(purchases::submit_airtime_to_cash))
        .merge(admin)
        .with_state(state)
}

/// Attach the caller's request id so the error body echoes it.
pub(crate) fn with_request_id(err: impl Into<AppError>, headers: &HeaderMap) -> AppError {
    let err = err.into();
    match get_request_id_from_headers(headers) {
        Some(id) => err.with_request_id(id),
        None => err,
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status: HealthStatus = state.health_checker.check_health().await;
    if status.status == HealthState::Unhealthy {
        error!("Health check failed - service unhealthy");
        (StatusCode::SERVICE_UNAVAILABLE, Json(status))
    } else {
        (StatusCode::OK, Json(status))
    }
}

async fn liveness() -> &'static str {
    "OK"
}
