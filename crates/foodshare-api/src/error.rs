use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use foodshare_core::MarketError;
use foodshare_types::api::ErrorBody;
use foodshare_types::validate::FieldError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("{0}")]
    BadRequest(String),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error(transparent)]
    Market(#[from] MarketError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn into_parts(self) -> (StatusCode, ErrorBody) {
        let body = |error: &str, message: String, details: Vec<FieldError>| ErrorBody {
            error: error.to_string(),
            message,
            details,
        };
        match self {
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                body("unauthenticated", "authentication required".into(), vec![]),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, body("bad_request", msg, vec![])),
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                body("payload_too_large", "request body too large".into(), vec![]),
            ),
            ApiError::Market(err) => match err {
                MarketError::Forbidden(msg) => (StatusCode::FORBIDDEN, body("forbidden", msg, vec![])),
                MarketError::NotFound(what) => (
                    StatusCode::NOT_FOUND,
                    body("not_found", format!("{} not found", what), vec![]),
                ),
                MarketError::InvalidState(msg) => {
                    (StatusCode::BAD_REQUEST, body("invalid_state", msg, vec![]))
                }
                MarketError::InvalidInput(msg) => {
                    (StatusCode::BAD_REQUEST, body("invalid_input", msg, vec![]))
                }
                MarketError::Validation(details) => (
                    StatusCode::BAD_REQUEST,
                    body("validation", "request failed validation".into(), details),
                ),
                MarketError::Conflict(msg) => (StatusCode::CONFLICT, body("conflict", msg, vec![])),
                MarketError::InvalidCode(msg) => (
                    StatusCode::BAD_REQUEST,
                    body("invalid_code", msg.to_string(), vec![]),
                ),
                MarketError::Storage(err) => internal(err),
            },
            ApiError::Internal(err) => internal(err),
        }
    }
}

fn internal(err: anyhow::Error) -> (StatusCode, ErrorBody) {
    tracing::error!(error = ?err, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorBody {
            error: "internal".into(),
            message: "internal server error".into(),
            details: vec![],
        },
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.into_parts();
        (status, Json(body)).into_response()
    }
}
