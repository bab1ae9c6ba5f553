//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

/// Error returned by every handler.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Internal(livlib_core::Error),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    /// Upstream provider or search backend down; the caller may retry.
    #[error("{0}")]
    Unavailable(String),
}

impl From<livlib_core::Error> for ApiError {
    fn from(err: livlib_core::Error) -> Self {
        use livlib_core::Error as E;
        match &err {
            E::NotFound(_) | E::FragmentNotFound(_) => ApiError::NotFound(err.to_string()),
            E::Forbidden(_) => ApiError::Forbidden(err.to_string()),
            E::NotReady(_) | E::Conflict(_) => ApiError::Conflict(err.to_string()),
            E::ProviderUnavailable(_) | E::SearchUnavailable(_) => {
                ApiError::Unavailable(err.to_string())
            }
            E::InvalidInput(_) => ApiError::BadRequest(err.to_string()),
            // vectors of different lengths mean a misconfigured provider
            E::DimensionMismatch { .. } => ApiError::Internal(err),
            _ => ApiError::Internal(err),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Internal(err) = &self {
            error!(error = %err, "Request failed with internal error");
        }

        let body = match &self {
            ApiError::Unavailable(msg) => serde_json::json!({
                "error": msg,
                "retryable": true,
            }),
            other => serde_json::json!({
                "error": other.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}
