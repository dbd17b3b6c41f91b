use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use uuid::Uuid;

use foodshare_types::api::{
    MarkNotificationsRequest, MarkedResponse, NotificationQuery, UnreadCountResponse,
};
use foodshare_types::models::Notification;

use crate::error::ApiResult;
use crate::extract::{Path, ValidJson, ValidQuery};
use crate::middleware::Session;
use crate::state::{AppState, blocking};

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    ValidQuery(query): ValidQuery<NotificationQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let list = blocking(&state, move |m| m.notifications(session.user_id, query)).await?;
    Ok(Json(list))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<UnreadCountResponse>> {
    let unread = blocking(&state, move |m| m.unread_count(session.user_id)).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

/// PATCH /notifications: marks `ids` read, or everything when `ids` is absent.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    ValidJson(req): ValidJson<MarkNotificationsRequest>,
) -> ApiResult<Json<MarkedResponse>> {
    let updated = blocking(&state, move |m| m.mark_notifications(session.user_id, req.ids)).await?;
    Ok(Json(MarkedResponse { updated }))
}

pub async fn mark_one_read(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |m| m.mark_notification_read(session.user_id, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |m| m.delete_notification(session.user_id, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
