use foodshare_types::validate::FieldError;
use thiserror::Error;

/// Failure of a marketplace operation. No variant leaves partial writes
/// behind: the surrounding transaction is rolled back.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid handover code: {0}")]
    InvalidCode(&'static str),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type MarketResult<T> = Result<T, MarketError>;

impl MarketError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        MarketError::Forbidden(reason.into())
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        MarketError::InvalidState(reason.into())
    }
}
