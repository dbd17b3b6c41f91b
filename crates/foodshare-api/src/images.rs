use axum::{
    Extension, Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use axum_extra::TypedHeader;
use axum_extra::headers::ContentType;
use bytes::Bytes;
use tracing::error;
use uuid::Uuid;

use foodshare_core::MarketError;
use foodshare_types::models::FoodPostImage;

use crate::error::{ApiError, ApiResult};
use crate::extract::Path;
use crate::middleware::Session;
use crate::state::{AppState, blocking};

/// 5 MiB per image.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Transport limit for the upload route. Kept above [`MAX_IMAGE_BYTES`] so
/// slightly oversized images reach the handler and get a JSON 413.
pub const UPLOAD_BODY_LIMIT: usize = MAX_IMAGE_BYTES + 64 * 1024;

/// `image/png; charset=..` -> `image/png`
fn essence(content_type: &ContentType) -> String {
    let full = content_type.to_string();
    full.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

/// POST /posts/{id}/images: raw image bytes; the content type header names
/// the format.
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(post_id): Path<Uuid>,
    content_type: Option<TypedHeader<ContentType>>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let Some(TypedHeader(content_type)) = content_type else {
        return Err(ApiError::BadRequest("missing content-type".into()));
    };
    if body.is_empty() {
        return Err(ApiError::BadRequest("empty image".into()));
    }
    if body.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::PayloadTooLarge);
    }

    let mime = essence(&content_type);
    let size = body.len() as u64;
    let image = blocking(&state, move |m| m.add_image(post_id, session.user_id, &mime, size)).await?;

    if let Err(e) = state.images.write(image.id, &body).await {
        error!("Failed to write image {}: {}", image.id, e);
        let image_id = image.id;
        blocking(&state, move |m| m.remove_image(post_id, image_id, session.user_id)).await?;
        return Err(ApiError::Internal(e));
    }

    Ok((StatusCode::CREATED, Json(image)))
}

pub async fn list_images(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<Vec<FoodPostImage>>> {
    let images = blocking(&state, move |m| m.list_images(post_id)).await?;
    Ok(Json(images))
}

/// GET /images/{image_id}: the stored bytes with their content type.
pub async fn get_image(
    State(state): State<AppState>,
    Path(image_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let image = blocking(&state, move |m| m.get_image(image_id)).await?;
    let bytes = state
        .images
        .read(image.id)
        .await?
        .ok_or(MarketError::NotFound("image"))?;
    Ok(([(header::CONTENT_TYPE, image.content_type)], bytes))
}

pub async fn delete_image(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path((post_id, image_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |m| m.remove_image(post_id, image_id, session.user_id)).await?;
    if let Err(e) = state.images.delete(image_id).await {
        error!("Failed to delete file for image {}: {}", image_id, e);
    }
    Ok(StatusCode::NO_CONTENT)
}
