use crate::dtos::{ListParams, SearchParams, SearchResponse};
use crate::startup::AppState;
use axum::{
    Json,
    extract::{Query, State},
};
use futures::TryStreamExt;
use mongodb::bson::{Document, doc};
use mongodb::options::FindOptions;
use service_core::error::AppError;

/// Build a pattern matching every term of the query in any order, via one
/// lookahead per term. The pattern runs inside MongoDB's PCRE engine, so
/// lookaheads are fine; terms are escaped before they go in.
fn fuzzy_pattern(query: &str) -> Option<String> {
    let cleaned: String = query
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let terms: Vec<&str> = cleaned.split_whitespace().collect();
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|term| format!("(?=.*{})", regex::escape(term)))
            .collect(),
    )
}

fn regex_match(field: &str, pattern: &str) -> Document {
    doc! { field: { "$regex": pattern, "$options": "i" } }
}

pub async fn search_everything(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    if !matches!(params.kind.as_str(), "all" | "track" | "album" | "artist") {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "type must be one of all|track|album|artist"
        )));
    }

    let mut response = SearchResponse::default();
    let Some(pattern) = fuzzy_pattern(&params.q) else {
        return Ok(Json(response));
    };

    let paging = ListParams {
        limit: params.limit,
        page: params.page,
    }
    .paging();
    let options = || {
        FindOptions::builder()
            .skip(paging.skip)
            .limit(paging.limit)
            .build()
    };

    if matches!(params.kind.as_str(), "all" | "track") {
        let filter = doc! { "$or": [
            regex_match("title", &pattern),
            regex_match("album", &pattern),
            regex_match("artist", &pattern),
        ]};
        response.tracks = state
            .db
            .songs()
            .find(filter, options())
            .await?
            .try_collect()
            .await?;
    }

    if matches!(params.kind.as_str(), "all" | "album") {
        let filter = doc! { "$or": [
            regex_match("title", &pattern),
            regex_match("artist", &pattern),
        ]};
        response.albums = state
            .db
            .albums()
            .find(filter, options())
            .await?
            .try_collect()
            .await?;
    }

    if matches!(params.kind.as_str(), "all" | "artist") {
        response.artists = state
            .db
            .artists()
            .find(regex_match("name", &pattern), options())
            .await?
            .try_collect()
            .await?;
    }

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_lookahead_per_term() {
        assert_eq!(
            fuzzy_pattern("dark side").unwrap(),
            "(?=.*dark)(?=.*side)"
        );
    }

    #[test]
    fn punctuation_is_stripped_before_escaping() {
        assert_eq!(fuzzy_pattern("a.c/d.c").unwrap(), "(?=.*acdc)");
    }

    #[test]
    fn empty_queries_produce_no_pattern() {
        assert!(fuzzy_pattern("").is_none());
        assert!(fuzzy_pattern("!!!").is_none());
    }
}
