//! enrol API server.
//!
//! Serves bulk CSV onboarding and token provisioning over HTTP.

mod config;
mod logging;
mod middleware;

use std::net::SocketAddr;
use std::sync::Arc;

use config::{Config, NotifierKind, StoreBackend};
use enrol_api_import::{
    provisioning_router, IngestPipeline, LogNotifier, NotificationDispatcher, Notifier,
    ProvisioningState, TokenLifecycleManager, WebhookNotifier,
};
use enrol_db::{
    Directory, MemoryDirectory, MemoryTokenStore, PgDirectory, PgTokenStore, TokenStore,
};
use tokio::signal;
use tracing::info;

/// Headroom over the upload cap for multipart framing.
const BODY_LIMIT_HEADROOM_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host,
        port = config.port,
        "Starting enrol API"
    );

    let (directory, tokens) = match open_stores(&config.store).await {
        Ok(stores) => stores,
        Err(e) => {
            tracing::error!("Failed to open stores: {e}");
            std::process::exit(1);
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.notifier {
        NotifierKind::Log => {
            tracing::warn!("Using log notifier; tokens are not delivered to users");
            Arc::new(LogNotifier)
        }
        NotifierKind::Webhook { url } => {
            match WebhookNotifier::new(url.clone(), config.notifier_timeout) {
                Ok(n) => {
                    info!(url = %url, "Using webhook notifier");
                    Arc::new(n)
                }
                Err(e) => {
                    tracing::error!("Failed to create webhook notifier: {e}");
                    std::process::exit(1);
                }
            }
        }
    };

    let dispatcher = NotificationDispatcher::new(
        notifier,
        config.notifier_timeout,
        config.frontend_base_url.clone(),
    );
    let lifecycle = Arc::new(TokenLifecycleManager::new(
        directory.clone(),
        tokens,
        dispatcher,
        config.tokens,
        config.password_policy.clone(),
    ));
    let pipeline = Arc::new(IngestPipeline::new(
        directory,
        lifecycle.clone(),
        config.import.clone(),
    ));

    let app = provisioning_router(ProvisioningState::new(pipeline, lifecycle))
        .layer(axum::middleware::from_fn(
            middleware::request_log_middleware,
        ))
        .layer(tower_http::limit::RequestBodyLimitLayer::new(
            config.import.max_file_bytes + BODY_LIMIT_HEADROOM_BYTES,
        ));

    let addr: SocketAddr = match config.bind_addr().parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("Invalid bind address '{}': {e}", config.bind_addr());
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to address {addr}: {e}");
            std::process::exit(1);
        }
    };

    info!(%addr, "Server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

async fn open_stores(
    backend: &StoreBackend,
) -> Result<(Arc<dyn Directory>, Arc<dyn TokenStore>), enrol_db::StoreError> {
    match backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory stores; all data is lost on restart");
            let directory: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
            let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
            Ok((directory, tokens))
        }
        StoreBackend::Postgres {
            database_url,
            max_connections,
        } => {
            let pool = enrol_db::connect(database_url, *max_connections).await?;
            enrol_db::run_migrations(&pool).await?;
            info!(max_connections, "Connected to PostgreSQL, migrations applied");
            let directory: Arc<dyn Directory> = Arc::new(PgDirectory::new(pool.clone()));
            let tokens: Arc<dyn TokenStore> = Arc::new(PgTokenStore::new(pool));
            Ok((directory, tokens))
        }
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
