//! Spotify catalog lookups via the client-credentials flow.

use super::{CatalogError, CatalogProvider};
use crate::models::{Album, Artist, Track};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const PROVIDER: &str = "spotify";

struct AccessToken {
    bearer: String,
    expires_at: Instant,
}

pub struct Spotify {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

impl Spotify {
    pub fn new(http: reqwest::Client, client_id: String, client_secret: String) -> Spotify {
        Spotify {
            http,
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    async fn ensure_token(&self) -> Result<String, CatalogError> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.bearer.clone());
            }
        }

        let response: Value = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| CatalogError::TokenUnavailable(e.to_string()))?
            .json()
            .await?;

        let bearer = response
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| CatalogError::TokenUnavailable("no access_token in reply".into()))?
            .to_string();
        let expires_in = response
            .get("expires_in")
            .and_then(Value::as_u64)
            .unwrap_or(3600);

        *slot = Some(AccessToken {
            bearer: bearer.clone(),
            expires_at: Instant::now() + Duration::from_secs(expires_in.saturating_sub(60)),
        });
        Ok(bearer)
    }

    async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, CatalogError> {
        let bearer = self.ensure_token().await?;
        let response = self
            .http
            .get(format!("{API_BASE}/{}", endpoint.trim_start_matches('/')))
            .bearer_auth(&bearer)
            .query(params)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    fn cover_url(images: Option<&Value>) -> Option<String> {
        images?
            .as_array()?
            .first()?
            .get("url")?
            .as_str()
            .map(str::to_string)
    }
}

#[async_trait]
impl CatalogProvider for Spotify {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn search(&self, title: &str, artist: &str) -> Result<Track, CatalogError> {
        let query = format!("track:{title} artist:{artist}");
        let response = self
            .get("search", &[("q", query.as_str()), ("type", "track"), ("limit", "1")])
            .await?;

        let item = response
            .pointer("/tracks/items/0")
            .ok_or_else(|| CatalogError::NotFound(format!("track not found: {query}")))?;

        let now = Utc::now();
        Ok(Track {
            id: None,
            chat_id: None,
            msg_id: None,
            file_unique_id: None,
            file_size: None,
            file_name: None,
            title: item
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| CatalogError::Payload("missing track name".into()))?
                .to_string(),
            track_id: item.get("id").and_then(Value::as_str).map(str::to_string),
            artist: item
                .pointer("/artists/0/name")
                .and_then(Value::as_str)
                .unwrap_or(artist)
                .to_string(),
            artist_id: item
                .pointer("/artists/0/id")
                .and_then(Value::as_str)
                .map(str::to_string),
            album: item
                .pointer("/album/name")
                .and_then(Value::as_str)
                .map(str::to_string),
            album_id: item
                .pointer("/album/id")
                .and_then(Value::as_str)
                .map(str::to_string),
            isrc: item
                .pointer("/external_ids/isrc")
                .and_then(Value::as_str)
                .map(str::to_string),
            track_no: item
                .get("track_number")
                .and_then(Value::as_u64)
                .map(|n| n as u32),
            provider: PROVIDER.to_string(),
            duration: item.get("duration_ms").and_then(Value::as_u64),
            tags: None,
            mime_type: None,
            cover_url: Self::cover_url(item.pointer("/album/images")),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_artist(&self, artist_id: &str, name: &str) -> Result<Artist, CatalogError> {
        let response = self.get(&format!("artists/{artist_id}"), &[]).await?;

        let now = Utc::now();
        Ok(Artist {
            id: None,
            name: response
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(name)
                .to_string(),
            artist_id: Some(artist_id.to_string()),
            provider: PROVIDER.to_string(),
            tags: response.get("genres").and_then(Value::as_array).map(|g| {
                g.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            }),
            bio: None,
            cover_url: Self::cover_url(response.get("images")),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_album(&self, album_id: &str) -> Result<Album, CatalogError> {
        let response = self.get(&format!("albums/{album_id}"), &[]).await?;

        let now = Utc::now();
        Ok(Album {
            id: None,
            title: response
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| CatalogError::Payload("missing album name".into()))?
                .to_string(),
            album_id: album_id.to_string(),
            artist: response
                .pointer("/artists/0/name")
                .and_then(Value::as_str)
                .unwrap_or("Various Artists")
                .to_string(),
            artist_id: response
                .pointer("/artists/0/id")
                .and_then(Value::as_str)
                .unwrap_or("0")
                .to_string(),
            provider: PROVIDER.to_string(),
            track_count: response
                .get("total_tracks")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            upc: response
                .pointer("/external_ids/upc")
                .and_then(Value::as_str)
                .map(str::to_string),
            tags: response.get("genres").and_then(Value::as_array).map(|g| {
                g.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            }),
            cover_url: Self::cover_url(response.get("images")),
            created_at: now,
            updated_at: now,
        })
    }
}
