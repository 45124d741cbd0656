use crate::dtos::ListParams;
use crate::models::Artist;
use crate::startup::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use futures::TryStreamExt;
use mongodb::{bson::doc, options::FindOptions};
use service_core::error::AppError;

pub async fn get_artists(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Artist>>, AppError> {
    let paging = params.paging();
    let options = FindOptions::builder()
        .skip(paging.skip)
        .limit(paging.limit)
        .build();
    let artists: Vec<Artist> = state.db.artists().find(None, options).await?.try_collect().await?;
    Ok(Json(artists))
}

pub async fn get_artist(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Artist>, AppError> {
    let artist = state
        .db
        .artists()
        .find_one(doc! { "artist_id": &id }, None)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Artist not found")))?;
    Ok(Json(artist))
}
