use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{get, patch, post},
};
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, claims, images, messages, notifications, posts, ratings, users};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/users/{id}", get(users::get_user))
        // Posts
        .route("/posts", post(posts::create_post).get(posts::list_posts))
        .route(
            "/posts/{id}",
            get(posts::get_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        .route(
            "/posts/{id}/images",
            post(images::upload_image)
                .get(images::list_images)
                .layer(DefaultBodyLimit::max(images::UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/posts/{id}/images/{image_id}",
            axum::routing::delete(images::delete_image),
        )
        .route("/images/{image_id}", get(images::get_image))
        // Claims
        .route("/claims", post(claims::create_claim).get(claims::list_claims))
        .route(
            "/claims/{id}",
            get(claims::get_claim)
                .patch(claims::update_claim)
                .delete(claims::delete_claim),
        )
        .route("/claims/{id}/handover-code", post(claims::issue_handover_code))
        .route("/claims/{id}/verify-handover", post(claims::verify_handover))
        .route("/claims/{id}/rate", post(ratings::rate))
        .route("/claims/{id}/ratings", get(ratings::list_ratings))
        .route(
            "/claims/{id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        // Notifications
        .route(
            "/notifications",
            get(notifications::list_notifications).patch(notifications::mark_read),
        )
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route(
            "/notifications/{id}",
            patch(notifications::mark_one_read).delete(notifications::delete_notification),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Browsers send the session cookie, so origins are mirrored rather than `*`.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
