use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use foodshare_types::api::{MessageQuery, SendMessageRequest};
use foodshare_types::models::Message;

use crate::error::ApiResult;
use crate::extract::{Path, ValidJson, ValidQuery};
use crate::middleware::Session;
use crate::state::{AppState, blocking};

/// GET /claims/{id}/messages: oldest first. Reading marks the caller's
/// incoming messages as read.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(claim_id): Path<Uuid>,
    ValidQuery(query): ValidQuery<MessageQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = blocking(&state, move |m| {
        m.messages(claim_id, session.user_id, query.after, query.limit)
    })
    .await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(claim_id): Path<Uuid>,
    ValidJson(req): ValidJson<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = blocking(&state, move |m| {
        m.send_message(claim_id, session.user_id, &req.content)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
