use crate::hub::DcId;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use std::env;

#[derive(Debug, Clone)]
pub struct MusicConfig {
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub hub: HubConfig,
    pub metadata: MetadataConfig,
    pub auth: AuthConfig,
    pub webdav: WebdavConfig,
    pub indexer: IndexerConfig,
}

#[derive(Debug, Clone, Default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Primary identity credential. Mandatory.
    pub token: Secret<String>,
    /// Optional secondary identities, in configured order.
    pub worker_tokens: Vec<Secret<String>>,
    /// Datacenter id -> host:port.
    pub endpoints: HashMap<DcId, String>,
    pub default_dc: DcId,
    /// Channels whose audio posts get indexed.
    pub music_channels: HashSet<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct MetadataConfig {
    pub provider: String,
    pub storefronts: Vec<String>,
    pub spotify_client: Option<String>,
    pub spotify_secret: Option<Secret<String>>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub secret_key: Secret<String>,
    pub access_token_expire_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct WebdavConfig {
    pub enabled: bool,
    pub username: String,
    pub password: Secret<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IndexerConfig {
    pub rate_limit_per_sec: u32,
}

impl MusicConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common = core_config::Config::load()?;

        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(MusicConfig {
            common,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("music_db"), is_prod)?,
            },
            hub: HubConfig {
                token: Secret::new(get_env("HUB_BOT_TOKEN", None, is_prod)?),
                worker_tokens: env::var("HUB_WORKER_TOKENS")
                    .ok()
                    .map(|raw| {
                        raw.split(',')
                            .map(str::trim)
                            .filter(|t| !t.is_empty())
                            .map(|t| Secret::new(t.to_string()))
                            .collect()
                    })
                    .unwrap_or_default(),
                endpoints: parse_endpoints(&get_env("HUB_ENDPOINTS", None, is_prod)?)?,
                default_dc: get_env("HUB_DEFAULT_DC", Some("1"), is_prod)?
                    .parse()
                    .map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!("HUB_DEFAULT_DC: {e}"))
                    })?,
                music_channels: parse_channels(&get_env("MUSIC_CHANNELS", None, is_prod)?)?,
            },
            metadata: MetadataConfig {
                provider: get_env("METADATA_PROVIDER", Some("apple-music"), is_prod)?,
                storefronts: get_env("METADATA_STOREFRONTS", Some("us,in,jp"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                spotify_client: env::var("SPOTIFY_CLIENT").ok(),
                spotify_secret: env::var("SPOTIFY_SECRET").ok().map(Secret::new),
            },
            auth: AuthConfig {
                secret_key: Secret::new(get_env("SECRET_KEY", None, is_prod)?),
                access_token_expire_minutes: get_env("ACCESS_TOKEN_EXPIRE", Some("60"), is_prod)?
                    .parse()
                    .map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!("ACCESS_TOKEN_EXPIRE: {e}"))
                    })?,
            },
            webdav: WebdavConfig {
                enabled: get_env("ENABLE_WEBDAV", Some("false"), is_prod)?
                    .to_lowercase()
                    == "true",
                username: get_env("WEBDAV_USERNAME", Some("admin"), is_prod)?,
                password: Secret::new(get_env("WEBDAV_PASSWORD", Some("admin"), is_prod)?),
            },
            indexer: IndexerConfig {
                rate_limit_per_sec: get_env("INDEXER_RATE_LIMIT", Some("10"), is_prod)?
                    .parse()
                    .map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!("INDEXER_RATE_LIMIT: {e}"))
                    })?,
            },
        })
    }
}

/// "1=dc1.hub.example:4430,2=dc2.hub.example:4430"
fn parse_endpoints(raw: &str) -> Result<HashMap<DcId, String>, AppError> {
    let mut endpoints = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (dc, addr) = entry.split_once('=').ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!("HUB_ENDPOINTS entry without '=': {entry}"))
        })?;
        let dc: DcId = dc.trim().parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("HUB_ENDPOINTS datacenter id: {e}"))
        })?;
        endpoints.insert(dc, addr.trim().to_string());
    }
    if endpoints.is_empty() {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "HUB_ENDPOINTS is empty"
        )));
    }
    Ok(endpoints)
}

/// Whitespace-separated chat ids.
fn parse_channels(raw: &str) -> Result<HashSet<i64>, AppError> {
    raw.split_whitespace()
        .map(|id| {
            id.parse::<i64>().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("MUSIC_CHANNELS entry {id}: {e}"))
            })
        })
        .collect()
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_parse_in_any_order() {
        let endpoints = parse_endpoints("2=dc2.hub:4430, 1=dc1.hub:4430").unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[&1], "dc1.hub:4430");
        assert_eq!(endpoints[&2], "dc2.hub:4430");
    }

    #[test]
    fn malformed_endpoints_are_rejected() {
        assert!(parse_endpoints("dc1.hub:4430").is_err());
        assert!(parse_endpoints("").is_err());
    }

    #[test]
    fn channels_are_whitespace_separated() {
        let channels = parse_channels("-1001 -1002").unwrap();
        assert!(channels.contains(&-1001));
        assert!(channels.contains(&-1002));
    }
}
