//! remitd - remittance backend server.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use remitd::api::ChainClients;
use remitd::config::DatabaseBackend;
use remitd::database::{migrations, Database, Stores};
use remitd::{build_router, AppState, Config};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("remitd=info,tower_http=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting remitd...");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Configuration loaded (backend: {:?}, network: {:?})", config.database_backend, config.network);

    let (stores, database) = match config.database_backend {
        DatabaseBackend::Mongodb => {
            let uri = config
                .mongodb_uri
                .as_deref()
                .context("MONGODB_URI must be set when DATABASE_BACKEND is mongodb")?;
            info!("Connecting to MongoDB...");
            let db = Database::connect(uri, &config.mongodb_database).await?;
            let version = migrations::run(&db).await.context("Schema migration failed")?;
            info!("Database connected, schema version {}", version);
            (Stores::mongo(&db), Some(db))
        }
        DatabaseBackend::Memory => {
            warn!("Using the in-memory store; data is lost on restart");
            (Stores::memory(), None)
        }
    };

    let chain = ChainClients::from_config(&config).context("Failed to build chain clients")?;
    info!(
        "Gateway mode: {}, explorer: {}, RPC: {}",
        chain.gateway.mode(),
        config.explorer_url(),
        config.rpc_url.as_deref().unwrap_or("not configured")
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let kyc_watch_interval = config.kyc_watch_interval;
    let state = AppState::new(config, stores, chain);

    match state.poller.resume_pending().await {
        Ok(n) => info!("Status poller ready ({} transaction(s) resumed)", n),
        Err(e) => warn!("Could not resume pending transactions: {}", e),
    }
    let watcher = state.watcher.clone().spawn(kyc_watch_interval);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    watcher.abort();
    if let Some(db) = database {
        db.shutdown().await;
    }
    info!("remitd stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
