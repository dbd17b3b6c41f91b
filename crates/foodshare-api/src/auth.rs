use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};
use uuid::Uuid;

use foodshare_types::api::{LoginRequest, RegisterRequest, SessionResponse, UserProfile};

use crate::error::{ApiError, ApiResult};
use crate::extract::ValidJson;
use crate::middleware::{SESSION_COOKIE, Session, SessionClaims};
use crate::state::{AppState, blocking};

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| anyhow::anyhow!("stored hash unreadable: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str, days: i64) -> anyhow::Result<String> {
    let claims = SessionClaims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.cookie_secure)
        .build()
}

fn start_session(state: &AppState, jar: CookieJar, user_id: Uuid, username: &str) -> ApiResult<(CookieJar, String)> {
    let token = create_token(&state.jwt_secret, user_id, username, state.session_days)?;
    let jar = jar.add(session_cookie(state, token.clone()));
    Ok((jar, token))
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e)))??;

    let username = req.username.clone();
    let display_name = req.display_name;
    let user = blocking(&state, move |m| {
        m.register(&username, display_name.as_deref(), &password_hash)
    })
    .await?;

    let (jar, token) = start_session(&state, jar, user.id, &user.username)?;
    Ok((StatusCode::CREATED, jar, Json(SessionResponse { user, token })))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidJson(req): ValidJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let username = req.username.clone();
    let row = blocking(&state, move |m| m.credentials(&username))
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    let password = req.password;
    let stored = row.password.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e)))??;
    if !valid {
        warn!("Failed login for {}", req.username);
        return Err(ApiError::Unauthenticated);
    }

    let user: foodshare_types::models::User = row.into();
    let (jar, token) = start_session(&state, jar, user.id, &user.username)?;
    info!("User {} logged in", user.id);
    Ok((jar, Json(SessionResponse { user, token })))
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
    )
}

pub async fn me(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<UserProfile>> {
    let profile = blocking(&state, move |m| m.profile(session.user_id)).await?;
    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::decode_session;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn tokens_are_bound_to_the_secret() {
        let id = Uuid::new_v4();
        let token = create_token("s3cret", id, "alice", 1).unwrap();
        let session = decode_session("s3cret", &token).unwrap();
        assert_eq!(session.user_id, id);
        assert_eq!(session.username, "alice");
        assert!(decode_session("other", &token).is_none());

        let expired = create_token("s3cret", id, "alice", -1).unwrap();
        assert!(decode_session("s3cret", &expired).is_none());
    }
}
