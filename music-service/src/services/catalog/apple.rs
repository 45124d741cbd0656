//! Apple Music catalog lookups using the public web player's anonymous
//! developer token.

use super::{CatalogError, CatalogProvider};
use crate::models::{Album, Artist, Track};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const WEB_PLAYER_URL: &str = "https://beta.music.apple.com";
const API_BASE: &str = "https://amp-api.music.apple.com/v1/catalog";
const PROVIDER: &str = "apple-music";

struct DevToken {
    bearer: String,
    expires_at: Instant,
}

pub struct AppleMusic {
    http: reqwest::Client,
    storefronts: Vec<String>,
    token: Mutex<Option<DevToken>>,
}

impl AppleMusic {
    pub fn new(http: reqwest::Client, storefronts: Vec<String>) -> AppleMusic {
        AppleMusic {
            http,
            storefronts,
            token: Mutex::new(None),
        }
    }

    /// The web player embeds a bearer token in its index bundle; scrape it
    /// and refresh a minute before the usual one-hour expiry.
    async fn ensure_token(&self) -> Result<String, CatalogError> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.bearer.clone());
            }
        }

        let main_page = self
            .http
            .get(WEB_PLAYER_URL)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| CatalogError::TokenUnavailable(format!("main page: {e}")))?
            .text()
            .await?;

        let js_path = Regex::new(r"/assets/index[^\s\x22']*\.js")
            .expect("static regex")
            .find(&main_page)
            .ok_or_else(|| CatalogError::TokenUnavailable("index bundle not found".into()))?;

        let bundle = self
            .http
            .get(format!("{WEB_PLAYER_URL}{}", js_path.as_str()))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| CatalogError::TokenUnavailable(format!("index bundle: {e}")))?
            .text()
            .await?;

        let bearer = Regex::new(r"eyJ[a-zA-Z0-9\-_\.]+")
            .expect("static regex")
            .find(&bundle)
            .ok_or_else(|| CatalogError::TokenUnavailable("token not found in bundle".into()))?
            .as_str()
            .to_string();

        *slot = Some(DevToken {
            bearer: bearer.clone(),
            expires_at: Instant::now() + Duration::from_secs(3600 - 60),
        });
        tracing::debug!("refreshed apple music developer token");
        Ok(bearer)
    }

    /// Try up to 3 storefronts; 404 falls through to the next one, 429
    /// honors Retry-After.
    async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, CatalogError> {
        let bearer = self.ensure_token().await?;
        let mut last_error = None;

        for storefront in self.storefronts.iter().take(3) {
            let url = format!("{API_BASE}/{storefront}/{}", endpoint.trim_start_matches('/'));
            let response = self
                .http
                .get(&url)
                .bearer_auth(&bearer)
                .header("Origin", "https://music.apple.com")
                .header("User-Agent", "Mozilla/5.0")
                .query(params)
                .send()
                .await?;

            match response.status().as_u16() {
                404 => continue,
                429 => {
                    let retry_after = response
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(30);
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                    continue;
                }
                _ => match response.error_for_status() {
                    Ok(ok) => return Ok(ok.json().await?),
                    Err(err) => {
                        last_error = Some(err);
                        continue;
                    }
                },
            }
        }

        Err(match last_error {
            Some(err) => CatalogError::Http(err),
            None => CatalogError::NotFound(endpoint.to_string()),
        })
    }

    fn artwork_url(artwork: Option<&Value>, size: u32) -> Option<String> {
        let url = artwork?.get("url")?.as_str()?;
        Some(
            url.replace("{w}", &size.to_string())
                .replace("{h}", &size.to_string()),
        )
    }

    fn genre_tags(attributes: &Value) -> Option<Vec<String>> {
        let names = attributes.get("genreNames")?.as_array()?;
        Some(
            names
                .iter()
                .filter_map(|g| g.as_str().map(str::to_string))
                .collect(),
        )
    }
}

fn str_field<'a>(value: &'a Value, pointer: &str) -> Result<&'a str, CatalogError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| CatalogError::Payload(format!("missing {pointer}")))
}

#[async_trait]
impl CatalogProvider for AppleMusic {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn search(&self, title: &str, artist: &str) -> Result<Track, CatalogError> {
        let term = format!("{title} {artist}");
        let response = self
            .get("search", &[("term", &term), ("types", "songs"), ("limit", "1")])
            .await?;

        let track_id = response
            .pointer("/results/songs/data/0/id")
            .and_then(Value::as_str)
            .ok_or_else(|| CatalogError::NotFound(format!("track not found: {term}")))?
            .to_string();

        let song = self.get(&format!("songs/{track_id}"), &[]).await?;
        let data = song
            .pointer("/data/0")
            .ok_or_else(|| CatalogError::Payload("missing song data".into()))?;
        let attributes = &data["attributes"];

        let now = Utc::now();
        Ok(Track {
            id: None,
            chat_id: None,
            msg_id: None,
            file_unique_id: None,
            file_size: None,
            file_name: None,
            title: str_field(data, "/attributes/name")?.to_string(),
            track_id: Some(track_id),
            artist: str_field(data, "/attributes/artistName")?.to_string(),
            // first relationship entry is taken as the main artist
            artist_id: data
                .pointer("/relationships/artists/data/0/id")
                .and_then(Value::as_str)
                .map(str::to_string),
            album: attributes
                .get("albumName")
                .and_then(Value::as_str)
                .map(str::to_string),
            album_id: data
                .pointer("/relationships/albums/data/0/id")
                .and_then(Value::as_str)
                .map(str::to_string),
            isrc: attributes
                .get("isrc")
                .and_then(Value::as_str)
                .map(str::to_string),
            track_no: attributes
                .get("trackNumber")
                .and_then(Value::as_u64)
                .map(|n| n as u32),
            provider: PROVIDER.to_string(),
            duration: attributes.get("durationInMillis").and_then(Value::as_u64),
            tags: Self::genre_tags(attributes),
            mime_type: None,
            cover_url: Self::artwork_url(attributes.get("artwork"), 1200),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_artist(&self, artist_id: &str, _name: &str) -> Result<Artist, CatalogError> {
        let response = self.get(&format!("artists/{artist_id}"), &[]).await?;
        let data = response
            .pointer("/data/0")
            .ok_or_else(|| CatalogError::Payload("missing artist data".into()))?;
        let attributes = &data["attributes"];

        let now = Utc::now();
        Ok(Artist {
            id: None,
            name: str_field(data, "/attributes/name")?.to_string(),
            artist_id: Some(artist_id.to_string()),
            provider: PROVIDER.to_string(),
            tags: Self::genre_tags(attributes),
            bio: None,
            cover_url: Self::artwork_url(attributes.get("artwork"), 1200),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_album(&self, album_id: &str) -> Result<Album, CatalogError> {
        let response = self.get(&format!("albums/{album_id}"), &[]).await?;
        let data = response
            .pointer("/data/0")
            .ok_or_else(|| CatalogError::Payload("missing album data".into()))?;
        let attributes = &data["attributes"];

        let now = Utc::now();
        Ok(Album {
            id: None,
            title: str_field(data, "/attributes/name")?.to_string(),
            album_id: album_id.to_string(),
            artist: str_field(data, "/attributes/artistName")?.to_string(),
            // compilations have no single main artist; "0" marks various
            artist_id: data
                .pointer("/relationships/artists/data/0/id")
                .and_then(Value::as_str)
                .unwrap_or("0")
                .to_string(),
            provider: PROVIDER.to_string(),
            track_count: attributes
                .get("trackCount")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            upc: attributes
                .get("upc")
                .and_then(Value::as_str)
                .map(str::to_string),
            tags: Self::genre_tags(attributes),
            cover_url: Self::artwork_url(attributes.get("artwork"), 1200),
            created_at: now,
            updated_at: now,
        })
    }
}
