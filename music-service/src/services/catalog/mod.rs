//! Catalog metadata providers: given a title/performer pair off an audio
//! message, look up the real track, artist, and album records.

mod apple;
mod spotify;

pub use apple::AppleMusic;
pub use spotify::Spotify;

use crate::config::MetadataConfig;
use crate::models::{Album, Artist, Track};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("provider token unavailable: {0}")]
    TokenUnavailable(String),

    #[error("no catalog match: {0}")]
    NotFound(String),

    #[error("unexpected provider payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl CatalogError {
    /// Worth another try later? Token scrapes and HTTP transport hiccups
    /// are; a definitive miss is not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CatalogError::TokenUnavailable(_) | CatalogError::Http(_)
        )
    }
}

#[async_trait]
pub trait CatalogProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Best match for a (title, performer) pair.
    async fn search(&self, title: &str, artist: &str) -> Result<Track, CatalogError>;

    /// Artist record by provider id; `name` is the fallback display name.
    async fn get_artist(&self, artist_id: &str, name: &str) -> Result<Artist, CatalogError>;

    async fn get_album(&self, album_id: &str) -> Result<Album, CatalogError>;
}

pub fn build_provider(
    config: &MetadataConfig,
    http: reqwest::Client,
) -> Result<Arc<dyn CatalogProvider>, AppError> {
    match config.provider.as_str() {
        "apple-music" => Ok(Arc::new(AppleMusic::new(http, config.storefronts.clone()))),
        "spotify" => {
            let client_id = config.spotify_client.clone().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("SPOTIFY_CLIENT is required for spotify"))
            })?;
            let secret = config.spotify_secret.clone().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("SPOTIFY_SECRET is required for spotify"))
            })?;
            Ok(Arc::new(Spotify::new(
                http,
                client_id,
                secret.expose_secret().clone(),
            )))
        }
        other => Err(AppError::ConfigError(anyhow::anyhow!(
            "unknown metadata provider: {other}"
        ))),
    }
}
