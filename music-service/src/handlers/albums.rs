use crate::dtos::ListParams;
use crate::models::Album;
use crate::startup::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use futures::TryStreamExt;
use mongodb::{bson::doc, options::FindOptions};
use service_core::error::AppError;

pub async fn get_albums(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Album>>, AppError> {
    let paging = params.paging();
    let options = FindOptions::builder()
        .skip(paging.skip)
        .limit(paging.limit)
        .build();
    let albums: Vec<Album> = state.db.albums().find(None, options).await?.try_collect().await?;
    Ok(Json(albums))
}

pub async fn get_album(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Album>, AppError> {
    let album = state
        .db
        .albums()
        .find_one(doc! { "album_id": &id }, None)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Album not found")))?;
    Ok(Json(album))
}
