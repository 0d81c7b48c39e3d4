use thiserror::Error;

/// Failures surfaced by the forum core. Everything except `Internal` is an
/// expected outcome the caller can act on.
#[derive(Debug, Error)]
pub enum ForumError {
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("{0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type ForumResult<T> = Result<T, ForumError>;

impl ForumError {
    /// Message safe to hand back to a client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}
