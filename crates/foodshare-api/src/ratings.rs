use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use foodshare_types::api::RateRequest;
use foodshare_types::models::Rating;

use crate::error::ApiResult;
use crate::extract::{Path, ValidJson};
use crate::middleware::Session;
use crate::state::{AppState, blocking};

/// POST /claims/{id}/rate: 201 for a new rating, 200 when it replaces the
/// caller's earlier one.
pub async fn rate(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(claim_id): Path<Uuid>,
    ValidJson(req): ValidJson<RateRequest>,
) -> ApiResult<impl IntoResponse> {
    let (rating, created) = blocking(&state, move |m| m.rate(claim_id, session.user_id, req)).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(rating)))
}

pub async fn list_ratings(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(claim_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Rating>>> {
    let ratings = blocking(&state, move |m| m.claim_ratings(claim_id, session.user_id)).await?;
    Ok(Json(ratings))
}
