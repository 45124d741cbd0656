use crate::dtos::ListParams;
use crate::hub::{CHUNK_SIZE, ChunkPlan};
use crate::models::Track;
use crate::startup::AppState;
use crate::utils::parse_range_header;
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use futures::TryStreamExt;
use mongodb::{bson::doc, options::FindOptions};
use service_core::error::AppError;

/// Fallback when neither the hub nor the catalog knows the size.
const DEFAULT_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub async fn get_songs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Track>>, AppError> {
    let paging = params.paging();
    let options = FindOptions::builder()
        .skip(paging.skip)
        .limit(paging.limit)
        .build();
    let tracks: Vec<Track> = state.db.songs().find(None, options).await?.try_collect().await?;
    Ok(Json(tracks))
}

pub async fn get_song(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Track>, AppError> {
    let track = state
        .db
        .songs()
        .find_one(doc! { "track_id": &id }, None)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Song not found")))?;
    Ok(Json(track))
}

pub async fn stream_song(
    State(state): State<AppState>,
    Path(file_unique_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    stream_response(&state, &file_unique_id, range_header.as_deref(), false).await
}

/// Range-capable streaming response for one track, shared by the `/stream`
/// route and the WebDAV GET/HEAD path.
pub(crate) async fn stream_response(
    state: &AppState,
    file_unique_id: &str,
    range_header: Option<&str>,
    head_only: bool,
) -> Result<Response, AppError> {
    let track = state
        .db
        .songs()
        .find_one(doc! { "file_unique_id": file_unique_id }, None)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Track not found")))?;

    let (chat_id, msg_id) = match (track.chat_id, track.msg_id) {
        (Some(chat_id), Some(msg_id)) => (chat_id, msg_id),
        _ => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Track is missing its message reference"
            )));
        }
    };

    let worker = state
        .pool
        .get_available_worker()
        .ok_or(AppError::ServiceUnavailable)?;
    let descriptor = worker.get_file_properties(chat_id, msg_id).await?;

    let file_size = if descriptor.file_size > 0 {
        descriptor.file_size
    } else {
        track.file_size.unwrap_or(DEFAULT_FILE_SIZE)
    };

    let (start, end) = parse_range_header(range_header, file_size)?;
    let plan = ChunkPlan::for_window(start, end, file_size, CHUNK_SIZE)?;

    let mime_type = track
        .mime_type
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "audio/mpeg".to_string());
    let status = if range_header.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, end - start + 1)
        .header(header::CONTENT_TYPE, mime_type);
    if range_header.is_some() {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {start}-{end}/{file_size}"),
        );
    }

    let body = if head_only {
        Body::empty()
    } else {
        Body::from_stream(worker.stream(descriptor, plan))
    };
    builder
        .body(body)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))
}
