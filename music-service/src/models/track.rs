use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// One indexed song: the catalog metadata plus the (chat, message)
/// reference the streaming core needs to reach the bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub chat_id: Option<i64>,
    pub msg_id: Option<i64>,
    /// Public handle used in HTTP routes and WebDAV file names.
    pub file_unique_id: Option<String>,
    pub file_size: Option<u64>,
    pub file_name: Option<String>,

    pub title: String,
    pub track_id: Option<String>,

    pub artist: String,
    pub artist_id: Option<String>,

    pub album: Option<String>,
    pub album_id: Option<String>,

    pub isrc: Option<String>,
    pub track_no: Option<u32>,
    pub provider: String,
    pub duration: Option<u64>,
    pub tags: Option<Vec<String>>,
    pub mime_type: Option<String>,
    pub cover_url: Option<String>,

    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}
