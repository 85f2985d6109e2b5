//! Error types for the checkout runtime.
//!
//! Step methods return these values; the driver loop alone decides whether
//! an error is retried, reported, or ends the session.

use dropcart::DropcartError;

/// Errors from a single storefront operation.
#[derive(thiserror::Error, Debug)]
pub enum StepError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{operation} failed ({status})")]
    Status { operation: &'static str, status: u16 },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected response: {0}")]
    Unexpected(String),

    #[error("no shipping rate available yet")]
    NoShippingRate,

    #[error("no checkout queue token cookie found")]
    MissingQueueToken,

    #[error("no redirect location in response")]
    MissingLocation,

    #[error("no checkout session")]
    NoCheckout,

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors from product resolution.
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("product not found")]
    NotFound,

    #[error("no variant found")]
    NoVariant,

    #[error("invalid variant identifier: {0}")]
    InvalidIdentifier(String),

    #[error("product request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("product request failed ({0})")]
    Status(u16),

    #[error("invalid product response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<DropcartError> for ResolveError {
    fn from(e: DropcartError) -> Self {
        match e {
            DropcartError::NoVariant => ResolveError::NoVariant,
            DropcartError::Json(e) => ResolveError::Decode(e),
            other => ResolveError::InvalidIdentifier(other.to_string()),
        }
    }
}

/// Convenience result type for step operations.
pub type StepResult<T> = Result<T, StepError>;
