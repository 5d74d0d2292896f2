use thiserror::Error;

/// Errors surfaced by the catalog services.
///
/// External failures never reach this type; they are absorbed where they happen
/// (fallback or skip).
#[derive(Debug, Error)]
pub enum NewsError {
    /// A category, article or other referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness constraint rejected a write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed caller input.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl NewsError {
    pub fn not_found(what: impl Into<String>) -> Self {
        NewsError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        NewsError::Validation(msg.into())
    }
}

pub type NewsResult<T> = std::result::Result<T, NewsError>;
