use std::sync::Arc;

use foodshare_core::{MarketResult, Marketplace};

use crate::error::{ApiError, ApiResult};
use crate::storage::ImageStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub market: Marketplace,
    pub jwt_secret: String,
    pub session_days: i64,
    /// Sets the `Secure` attribute on the session cookie.
    pub cookie_secure: bool,
    pub images: ImageStore,
}

/// Runs a marketplace call on the blocking pool. SQLite work never runs on
/// the async workers.
pub async fn blocking<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Marketplace) -> MarketResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.market))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e)))?
        .map_err(ApiError::from)
}
