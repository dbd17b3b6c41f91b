use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use foodshare_types::api::{CreatePostRequest, PostQuery, PostResponse, UpdatePostRequest};

use crate::error::ApiResult;
use crate::extract::{Path, ValidJson, ValidQuery};
use crate::middleware::Session;
use crate::state::{AppState, blocking};

pub async fn create_post(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    ValidJson(req): ValidJson<CreatePostRequest>,
) -> ApiResult<impl IntoResponse> {
    let post = blocking(&state, move |m| m.create_post(session.user_id, req)).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn list_posts(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<PostQuery>,
) -> ApiResult<Json<Vec<PostResponse>>> {
    let posts = blocking(&state, move |m| m.list_posts(query)).await?;
    Ok(Json(posts))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<PostResponse>> {
    let post = blocking(&state, move |m| m.get_post(post_id)).await?;
    Ok(Json(post))
}

pub async fn update_post(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(post_id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdatePostRequest>,
) -> ApiResult<Json<PostResponse>> {
    let post = blocking(&state, move |m| m.update_post(post_id, session.user_id, req)).await?;
    Ok(Json(post))
}

/// Removes the post, then its image files.
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let image_ids = blocking(&state, move |m| m.delete_post(post_id, session.user_id)).await?;
    state.images.delete_all(&image_ids).await;
    Ok(StatusCode::NO_CONTENT)
}
