use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::db::models::Category;
use crate::error::AppResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/categories", get(list_categories))
}

async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(state.categories.list().await?))
}
