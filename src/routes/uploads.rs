use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::storage::BlobError;

pub fn router() -> Router<AppState> {
    Router::new().route("/uploads/{*key}", get(serve))
}

/// Serve a stored photo back from the local blob store.
async fn serve(State(state): State<AppState>, Path(key): Path<String>) -> AppResult<Response> {
    match state.blobs.fetch(&key).await {
        Ok(Some(data)) => {
            let mime = mime_guess::from_path(&key).first_or_octet_stream();
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
                ],
                data,
            )
                .into_response())
        }
        Ok(None) | Err(BlobError::InvalidKey(_)) => Err(AppError::NotFound(key)),
        Err(e) => Err(AppError::Internal(e.to_string())),
    }
}
