use crate::config::MusicConfig;
use crate::handlers;
use crate::hub::HubPool;
use crate::services::MongoDb;
use axum::{
    Router,
    routing::{any, get, post},
};
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, security_headers_middleware};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: MusicConfig,
    pub db: MongoDb,
    pub pool: Arc<HubPool>,
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
    state: AppState,
}

impl Application {
    pub async fn build(
        config: MusicConfig,
        db: MongoDb,
        pool: Arc<HubPool>,
    ) -> Result<Self, AppError> {
        let state = AppState {
            config: config.clone(),
            db,
            pool,
        };

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/health/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics_endpoint))
            .route("/songs", get(handlers::get_songs))
            .route("/songs/:id", get(handlers::get_song))
            .route("/stream/:file_unique_id", get(handlers::stream_song))
            .route("/albums", get(handlers::get_albums))
            .route("/albums/:id", get(handlers::get_album))
            .route("/artists", get(handlers::get_artists))
            .route("/artists/:id", get(handlers::get_artist))
            .route("/search", get(handlers::search_everything))
            .route("/register", post(handlers::register))
            .route("/login", post(handlers::login))
            .route("/logout", post(handlers::logout))
            .route("/me", get(handlers::get_me))
            .route("/webdav", any(handlers::webdav_handler))
            .route("/webdav/*path", any(handlers::webdav_handler))
            .layer(axum::middleware::from_fn(metrics_middleware))
            .layer(axum::middleware::from_fn(security_headers_middleware))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, app);

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
            state,
        })
    }

    pub fn db(&self) -> &MongoDb {
        &self.state.db
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
