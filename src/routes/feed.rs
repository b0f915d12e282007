use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::{AutocompleteSuggestion, Wish};
use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FeedQuery {
    pub search: Option<String>,
}

#[derive(Deserialize)]
pub struct AutocompleteQuery {
    #[serde(default)]
    pub search: String,
    pub limit: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/feed", get(public_feed))
        .route("/feed/autocomplete", get(autocomplete))
}

async fn public_feed(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<Vec<Wish>>> {
    let wishes = state
        .feed
        .public_feed(viewer.id(), query.search.as_deref())
        .await?;
    Ok(Json(wishes))
}

async fn autocomplete(
    State(state): State<AppState>,
    Query(query): Query<AutocompleteQuery>,
) -> AppResult<Json<Vec<AutocompleteSuggestion>>> {
    Ok(Json(
        state.feed.autocomplete(&query.search, query.limit).await?,
    ))
}
