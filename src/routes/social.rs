use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FollowRequest {
    pub user_id: String,
}

#[derive(Serialize)]
pub struct FollowingResponse {
    pub following: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/follow", post(follow).delete(unfollow))
        .route("/users/{id}/following", get(is_following))
}

async fn follow(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<FollowRequest>,
) -> AppResult<StatusCode> {
    state.provenance.follow(&user.id, &request.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unfollow(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<FollowRequest>,
) -> AppResult<StatusCode> {
    state.provenance.unfollow(&user.id, &request.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Whether the caller follows user `{id}`.
async fn is_following(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<FollowingResponse>> {
    let following = state.provenance.is_following(&user.id, &id).await?;
    Ok(Json(FollowingResponse { following }))
}
