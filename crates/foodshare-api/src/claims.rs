use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use foodshare_types::api::{
    ClaimQuery, ClaimResponse, CreateClaimRequest, UpdateClaimRequest, VerifyHandoverRequest,
};

use crate::error::ApiResult;
use crate::extract::{Path, ValidJson, ValidQuery};
use crate::middleware::Session;
use crate::state::{AppState, blocking};

pub async fn create_claim(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    ValidJson(req): ValidJson<CreateClaimRequest>,
) -> ApiResult<impl IntoResponse> {
    let claim = blocking(&state, move |m| m.create_claim(session.user_id, req)).await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

/// GET /claims: claims the caller made, or with `role=owner` claims on the
/// caller's posts.
pub async fn list_claims(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    ValidQuery(query): ValidQuery<ClaimQuery>,
) -> ApiResult<Json<Vec<ClaimResponse>>> {
    let claims = blocking(&state, move |m| m.list_claims(session.user_id, query)).await?;
    Ok(Json(claims))
}

pub async fn get_claim(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(claim_id): Path<Uuid>,
) -> ApiResult<Json<ClaimResponse>> {
    let claim = blocking(&state, move |m| m.get_claim(claim_id, session.user_id)).await?;
    Ok(Json(claim))
}

pub async fn update_claim(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(claim_id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateClaimRequest>,
) -> ApiResult<Json<ClaimResponse>> {
    let claim = blocking(&state, move |m| {
        m.update_claim(claim_id, session.user_id, req.status)
    })
    .await?;
    Ok(Json(claim))
}

pub async fn delete_claim(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(claim_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |m| m.delete_claim(claim_id, session.user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn issue_handover_code(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(claim_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let code = blocking(&state, move |m| m.issue_handover_code(claim_id, session.user_id)).await?;
    Ok((StatusCode::CREATED, Json(code)))
}

pub async fn verify_handover(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(claim_id): Path<Uuid>,
    ValidJson(req): ValidJson<VerifyHandoverRequest>,
) -> ApiResult<Json<ClaimResponse>> {
    let claim = blocking(&state, move |m| {
        m.verify_handover(claim_id, session.user_id, &req.code)
    })
    .await?;
    Ok(Json(claim))
}
