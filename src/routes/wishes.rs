use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::db::models::{SaversPage, Wish, WishImage};
use crate::enrichment::EnrichmentJob;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::state::AppState;
use crate::storage::{photo_key, BlobError};
use crate::wishes::WishFields;

const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_SAVERS_LIMIT: i64 = 20;
const MAX_SAVERS_LIMIT: i64 = 100;

// --- Requests ---

#[derive(Deserialize)]
pub struct WishRequest {
    #[serde(flatten)]
    pub fields: WishFields,
    /// Move the wish into the feed as part of this request.
    #[serde(default)]
    pub publish: bool,
}

#[derive(Deserialize)]
pub struct SaversQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl SaversQuery {
    fn limit_offset(&self) -> AppResult<(i64, i64)> {
        let limit = self
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_SAVERS_LIMIT)
            .min(MAX_SAVERS_LIMIT);
        let page = self.page.filter(|p| *p > 0).unwrap_or(1);
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| AppError::BadRequest(format!("page {} is out of range", page)))?;
        Ok((limit, offset))
    }
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/wishes", get(list_wishes).post(create_wish))
        .route(
            "/wishes/{id}",
            get(get_wish).put(update_wish).delete(delete_wish),
        )
        .route("/wishes/{id}/copy", post(copy_wish))
        .route(
            "/wishes/{id}/photos",
            post(upload_photo).layer(DefaultBodyLimit::max(MAX_PHOTO_BYTES)),
        )
        .route("/wishes/{id}/photos/{photo_id}", delete(delete_photo))
        .route("/wishes/{id}/savers", get(list_savers))
        .route(
            "/wishes/{id}/bookmark",
            post(bookmark_wish).delete(unbookmark_wish),
        )
        .route("/bookmarks", get(list_bookmarks))
}

// --- Handlers ---

async fn list_wishes(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Wish>>> {
    Ok(Json(state.wishes.list_by_user(&user.id).await?))
}

async fn create_wish(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<WishRequest>,
) -> AppResult<Response> {
    let fields = request.fields.validate(false)?;

    let mut wish = Wish::new(uuid::Uuid::now_v7().to_string(), user.id.clone());
    fields.apply_to(&mut wish);
    if request.publish {
        wish.published_at = Some(wish.created_at);
    }

    state.wishes.create(&wish, &fields.category_ids).await?;
    enqueue_enrichment(&state, &wish.id, wish.url.as_deref());

    let created = state.wishes.get_by_id(Some(&user.id), &wish.id).await?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

async fn get_wish(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<Wish>> {
    let wish = state.wishes.get_by_id(viewer.id(), &id).await?;

    // Drafts are private to their owner
    if !wish.is_published() && viewer.id() != Some(wish.user_id.as_str()) {
        return Err(AppError::NotFound(format!("wish {}", id)));
    }

    Ok(Json(wish))
}

async fn update_wish(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<WishRequest>,
) -> AppResult<Json<Wish>> {
    let fields = request.fields.validate(true)?;
    let mut wish = owned_wish(&state, &user, &id).await?;
    let previous_url = wish.url.clone();

    fields.apply_to(&mut wish);
    wish.updated_at = Utc::now();
    state
        .wishes
        .update(&wish, &fields.category_ids, request.publish)
        .await?;

    if wish.url != previous_url {
        enqueue_enrichment(&state, &id, wish.url.as_deref());
    }

    Ok(Json(state.wishes.get_by_id(Some(&user.id), &id).await?))
}

async fn delete_wish(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let images = state
        .wishes
        .get_by_id(Some(&user.id), &id)
        .await
        .map(|wish| wish.images)
        .unwrap_or_default();

    state.wishes.delete(&user.id, &id).await?;

    for image in images {
        remove_blob(&state, &image.url).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn copy_wish(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let copy = state.provenance.copy(&id, &user.id).await?;
    Ok((StatusCode::CREATED, Json(copy)).into_response())
}

async fn upload_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let wish = owned_wish(&state, &user, &id).await?;

    let mut photo = None;
    let mut width = 0i64;
    let mut height = 0i64;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("photo") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                photo = Some((file_name, data));
            }
            Some("width") => width = dimension(field.text().await, "width")?,
            Some("height") => height = dimension(field.text().await, "height")?,
            _ => {}
        }
    }

    let (file_name, data) =
        photo.ok_or_else(|| AppError::BadRequest("photo field is required".into()))?;
    if data.is_empty() {
        return Err(AppError::BadRequest("photo is empty".into()));
    }

    let key = photo_key(&wish.id, &file_name).map_err(blob_error)?;
    let url = state.blobs.upload(data, &key).await.map_err(blob_error)?;

    let image = state
        .wishes
        .add_image(&WishImage {
            id: uuid::Uuid::now_v7().to_string(),
            wish_id: wish.id.clone(),
            url,
            width,
            height,
            position: wish.images.len() as i64,
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!(wish_id = %wish.id, key = %key, "Photo uploaded");
    Ok((StatusCode::CREATED, Json(image)).into_response())
}

async fn delete_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, photo_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let wish = owned_wish(&state, &user, &id).await?;

    let removed = state
        .wishes
        .remove_images(&wish.id, std::slice::from_ref(&photo_id))
        .await?;
    if removed == 0 {
        return Err(AppError::NotFound(format!("photo {}", photo_id)));
    }

    if let Some(image) = wish.images.iter().find(|i| i.id == photo_id) {
        remove_blob(&state, &image.url).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn list_savers(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SaversQuery>,
) -> AppResult<Json<SaversPage>> {
    let (limit, offset) = query.limit_offset()?;
    Ok(Json(state.provenance.list_savers(&id, limit, offset).await?))
}

async fn bookmark_wish(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.provenance.bookmark(&user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unbookmark_wish(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.provenance.unbookmark(&user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_bookmarks(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Wish>>> {
    Ok(Json(state.provenance.list_bookmarked(&user.id).await?))
}

// --- Helpers ---

/// Load a wish the caller must own.
async fn owned_wish(state: &AppState, user: &CurrentUser, id: &str) -> AppResult<Wish> {
    let wish = state.wishes.get_by_id(Some(&user.id), id).await?;
    if wish.user_id != user.id {
        return Err(AppError::Forbidden("not your wish".into()));
    }
    Ok(wish)
}

fn enqueue_enrichment(state: &AppState, wish_id: &str, url: Option<&str>) {
    if let (Some(queue), Some(url)) = (&state.enrichment, url) {
        queue.enqueue(EnrichmentJob {
            wish_id: wish_id.to_string(),
            url: url.to_string(),
        });
    }
}

// Blob cleanup never fails the request; orphans are only logged.
async fn remove_blob(state: &AppState, url: &str) {
    let Some(key) = state.blobs.key_for(url) else {
        return;
    };
    if let Err(e) = state.blobs.delete(&key).await {
        tracing::warn!(key = %key, "Failed to delete blob: {}", e);
    }
}

fn dimension(
    text: Result<String, axum::extract::multipart::MultipartError>,
    name: &str,
) -> AppResult<i64> {
    let text = text.map_err(|e| AppError::BadRequest(e.body_text()))?;
    match text.trim().parse::<i64>() {
        Ok(value) if value >= 0 => Ok(value),
        _ => Err(AppError::BadRequest(format!(
            "{} must be a non-negative integer",
            name
        ))),
    }
}

fn blob_error(err: BlobError) -> AppError {
    match err {
        BlobError::UnsupportedType(_) => AppError::BadRequest(format!(
            "{}; allowed: {}",
            err,
            crate::storage::ALLOWED_EXTENSIONS.join(" ")
        )),
        BlobError::InvalidKey(_) => AppError::BadRequest(err.to_string()),
        BlobError::Io(e) => AppError::Internal(format!("blob storage: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn savers_paging_defaults_and_caps() {
        let query = SaversQuery {
            page: None,
            limit: None,
        };
        assert_eq!(query.limit_offset().unwrap(), (20, 0));

        let query = SaversQuery {
            page: Some(3),
            limit: Some(500),
        };
        assert_eq!(query.limit_offset().unwrap(), (100, 200));

        let query = SaversQuery {
            page: Some(0),
            limit: Some(-5),
        };
        assert_eq!(query.limit_offset().unwrap(), (20, 0));
    }

    #[test]
    fn savers_paging_rejects_huge_page() {
        let query = SaversQuery {
            page: Some(i64::MAX),
            limit: Some(100),
        };
        assert!(matches!(query.limit_offset(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn dimension_parses_non_negative_integers() {
        assert_eq!(dimension(Ok(" 640 ".into()), "width").unwrap(), 640);
        assert!(dimension(Ok("-1".into()), "width").is_err());
        assert!(dimension(Ok("wide".into()), "width").is_err());
    }

    #[test]
    fn unsupported_type_is_bad_request() {
        let err = blob_error(BlobError::UnsupportedType("x.svg".into()));
        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains(".webp")));
    }
}
