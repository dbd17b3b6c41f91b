use axum::{Json, extract::State};
use uuid::Uuid;

use foodshare_types::api::UserProfile;

use crate::error::ApiResult;
use crate::extract::Path;
use crate::state::{AppState, blocking};

/// Public profile with the user's rating summary.
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<UserProfile>> {
    let profile = blocking(&state, move |m| m.profile(user_id)).await?;
    Ok(Json(profile))
}
