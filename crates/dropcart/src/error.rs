//! Error types for the core library.

/// Errors that can occur in the dropcart core library.
#[derive(thiserror::Error, Debug)]
pub enum DropcartError {
    #[error("Invalid proxy entry: {0}")]
    InvalidProxy(String),

    #[error("No variant found")]
    NoVariant,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type DropcartResult<T> = Result<T, DropcartError>;

/// A value the page interpreter looked for but could not find.
///
/// Extractors never panic on odd markup; callers decide whether a missing
/// field is fatal, retryable, or tolerated.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{field} is malformed: {value}")]
    Malformed { field: &'static str, value: String },
}
