use crate::models::{Album, Artist, Track};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    /// "all" | "track" | "album" | "artist"
    #[serde(default = "default_kind", rename = "type")]
    pub kind: String,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

fn default_kind() -> String {
    "all".to_string()
}

#[derive(Debug, Default, Serialize)]
pub struct SearchResponse {
    pub tracks: Vec<Track>,
    pub albums: Vec<Album>,
    pub artists: Vec<Artist>,
}
