use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use foodshare_core::MarketError;
use foodshare_types::validate::{FieldError, Validate};

use crate::error::ApiError;

/// A serde rejection reported as a single-entry field error list, so
/// malformed input answers with the same shape as a failed `Validate`.
fn rejected(field: &str, body_text: String) -> ApiError {
    MarketError::Validation(vec![FieldError::new(field, body_text)]).into()
}

/// JSON body that has been deserialized (unknown fields rejected) and
/// passed its `Validate` rules.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| rejected("body", rejection.body_text()))?;
        value.validate().map_err(MarketError::Validation)?;
        Ok(ValidJson(value))
    }
}

/// Query string counterpart of [`ValidJson`].
pub struct ValidQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| rejected("query", rejection.body_text()))?;
        value.validate().map_err(MarketError::Validation)?;
        Ok(ValidQuery(value))
    }
}

/// `axum::extract::Path` with a JSON error body, e.g. for ids that are not
/// UUIDs.
pub struct Path<T>(pub T);

impl<S, T> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Path(value) = axum::extract::Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| rejected("path", rejection.body_text()))?;
        Ok(Path(value))
    }
}
