use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Only ever built from real provider metadata, never guessed from tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub title: String,
    pub album_id: String,
    pub artist: String,
    pub artist_id: String,
    pub provider: String,
    pub track_count: u32,
    pub upc: Option<String>,
    pub tags: Option<Vec<String>>,
    pub cover_url: Option<String>,

    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}
