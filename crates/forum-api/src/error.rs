use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use forum_types::error::ForumError;

/// HTTP face of `ForumError`: a status code and `{"error": "..."}`.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub ForumError);

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(ForumError::Internal(e))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ForumError::Conflict(_) => StatusCode::CONFLICT,
            ForumError::NotFound(_) => StatusCode::NOT_FOUND,
            ForumError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ForumError::Forbidden(_) => StatusCode::FORBIDDEN,
            ForumError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            ForumError::Validation(_) => StatusCode::BAD_REQUEST,
            ForumError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ForumError::Internal(inner) = &self.0 {
            error!("Request failed: {:#}", inner);
        }
        let body = Json(json!({ "error": self.0.public_message() }));
        (self.status(), body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases = [
            (ForumError::Conflict("x".into()), StatusCode::CONFLICT),
            (ForumError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ForumError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ForumError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (ForumError::PreconditionFailed("x".into()), StatusCode::PRECONDITION_FAILED),
            (ForumError::Validation("x".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ApiError::from(anyhow::anyhow!("disk I/O error at /var/lib/forum.db"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.0.public_message(), "internal server error");
    }
}
