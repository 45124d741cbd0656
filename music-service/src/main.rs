use music_service::config::MusicConfig;
use music_service::hub::{HubPool, HubTransport, wire::WireTransport};
use music_service::services::{MongoDb, build_provider, init_metrics};
use music_service::startup::Application;
use music_service::workers::Indexer;
use service_core::observability::init_tracing;
use std::sync::Arc;
use tokio::signal;

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize metrics recorder (must be before any metrics are recorded)
    init_metrics();

    // Initialize tracing
    let otlp_endpoint =
        std::env::var("OTLP_ENDPOINT").unwrap_or_else(|_| "http://tempo:4317".to_string());
    init_tracing("music-service", "info", &otlp_endpoint);

    let config = MusicConfig::load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    // Connect to database
    let db = MongoDb::connect(&config.mongodb.uri, &config.mongodb.database)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            std::io::Error::other(format!("Database connection error: {}", e))
        })?;

    db.initialize_indexes().await.map_err(|e| {
        tracing::error!("Failed to initialize database indexes: {}", e);
        std::io::Error::other(format!("Database initialization error: {}", e))
    })?;

    // One transport per hub identity: the mandatory primary first, then
    // the configured secondaries
    let mut transports: Vec<Arc<dyn HubTransport>> = vec![Arc::new(WireTransport::new(
        "primary",
        config.hub.token.clone(),
        config.hub.endpoints.clone(),
        config.hub.default_dc,
    ))];
    for (index, token) in config.hub.worker_tokens.iter().enumerate() {
        transports.push(Arc::new(WireTransport::new(
            format!("worker-{}", index + 1),
            token.clone(),
            config.hub.endpoints.clone(),
            config.hub.default_dc,
        )));
    }

    let pool = Arc::new(HubPool::start(transports).await.map_err(|e| {
        tracing::error!("Failed to start hub worker pool: {}", e);
        std::io::Error::other(format!("Hub startup error: {}", e))
    })?);

    // Ingestion: the primary identity's update feed drives the indexer
    let catalog = build_provider(&config.metadata, reqwest::Client::new()).map_err(|e| {
        tracing::error!("Failed to build catalog provider: {}", e);
        std::io::Error::other(format!("Catalog provider error: {}", e))
    })?;
    let primary = pool.primary().expect("pool always has a primary").clone();
    let indexer = Indexer::new(
        db.clone(),
        catalog,
        primary.transport().clone(),
        config.hub.music_channels.clone(),
        config.indexer.rate_limit_per_sec,
    );
    let indexer_shutdown = indexer.shutdown_token();
    let indexer_handle = indexer.spawn();

    let app = Application::build(config, db, pool.clone())
        .await
        .map_err(|e| {
            tracing::error!("Failed to build application: {}", e);
            std::io::Error::other(format!("Application error: {}", e))
        })?;

    tokio::select! {
        result = app.run_until_stopped() => {
            if let Err(e) = result {
                tracing::error!("Server exited with error: {}", e);
            }
        }
        _ = shutdown_signal() => {}
    }

    tracing::info!("Stopping services...");
    indexer_shutdown.cancel();
    let _ = indexer_handle.await;
    pool.shutdown().await;

    Ok(())
}
