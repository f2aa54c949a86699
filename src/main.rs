use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use vtu_platform::api::{self, AppState};
use vtu_platform::config::AppConfig;
use vtu_platform::database::{init_pool_from_config, run_migrations, MemoryStore, Stores};
use vtu_platform::logging::init_tracing;
use vtu_platform::middleware::logging::{request_logging_middleware, UuidRequestId};
use vtu_platform::payments::GatewayRegistry;
use vtu_platform::vtu::providers::clients_from_config;
use vtu_platform::vtu::ProviderRegistry;
use vtu_platform::workers::{PendingReconcilerConfig, PendingReconcilerWorker};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "Starting VTU platform service"
    );

    let stores = match &config.database {
        Some(database) => {
            info!("Initializing database connection pool...");
            let pool = init_pool_from_config(database).await.map_err(|e| {
                error!("Failed to initialize database pool: {}", e);
                e
            })?;
            if database.run_migrations {
                run_migrations(&pool).await?;
            }
            info!(
                max_connections = pool.options().get_max_connections(),
                "Database connection pool initialized"
            );
            Stores::postgres(pool)
        }
        None => {
            warn!(
                skip_externals = config.skip_externals,
                "No database configured, using in-memory stores; data is lost on restart"
            );
            Stores::memory(Arc::new(MemoryStore::new()))
        }
    };

    let mut registry = ProviderRegistry::new(stores.providers.clone())
        .with_default(config.vtu.default_provider.clone());
    let gateways = if config.skip_externals {
        info!("Skipping VTU providers and payment gateways (SKIP_EXTERNALS=true)");
        GatewayRegistry::new()
    } else {
        for client in clients_from_config(&config.vtu)? {
            info!(provider = client.code(), "VTU provider client registered");
            registry.register(client);
        }
        GatewayRegistry::from_config(&config.gateways)?
    };

    let state = AppState::new(
        stores.clone(),
        registry,
        gateways,
        config.vtu.fees.clone(),
        config.gateways.callback_url.clone(),
        config.admin.api_token.clone(),
    );
    if state.admin_token.is_none() {
        warn!("ADMIN_API_TOKEN not set, admin routes will refuse every request");
    }

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let mut reconciler_handle = None;
    if config.workers.pending_reconciler_enabled {
        let worker = PendingReconcilerWorker::new(
            stores.ledger.clone(),
            state.purchases.clone(),
            PendingReconcilerConfig::from(&config.workers),
        );
        reconciler_handle = Some(tokio::spawn(worker.run(worker_shutdown_rx)));
    } else {
        info!("Pending reconciler worker disabled (PENDING_RECONCILER_ENABLED=false)");
    }

    let app = api::router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(TraceLayer::new_for_http())
            .layer(axum::middleware::from_fn(request_logging_middleware))
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;
    info!(address = %addr, "Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if let Some(handle) = reconciler_handle {
        if let Err(e) = tokio::time::timeout(Duration::from_secs(5), handle).await {
            error!(error = %e, "Timed out waiting for pending reconciler shutdown");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
