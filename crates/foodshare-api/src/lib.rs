//! HTTP surface of the marketplace: axum handlers, session middleware and
//! the mapping from domain errors to responses.

pub mod auth;
pub mod claims;
pub mod error;
pub mod extract;
pub mod images;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod ratings;
pub mod router;
pub mod state;
pub mod storage;
pub mod users;

pub use error::{ApiError, ApiResult};
pub use router::build_router;
pub use state::{AppState, AppStateInner};
