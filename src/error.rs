use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::io::ErrorBody;

/// Result type alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors surfaced by the model and the request handlers.
///
/// The message is returned verbatim in the `error` field of the response body.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Malformed, absent or mis-shaped request input.
    #[error("{0}")]
    Validation(String),

    /// The accelerator runtime the variant needs is missing or unusable.
    #[error("{0}")]
    DependencyUnavailable(String),

    /// Anything else raised while serving a request.
    #[error("{0}")]
    Unexpected(String),
}

impl HarnessError {
    pub fn status(&self) -> StatusCode {
        match self {
            HarnessError::Validation(_) => StatusCode::BAD_REQUEST,
            HarnessError::DependencyUnavailable(_) | HarnessError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<candle_core::Error> for HarnessError {
    fn from(e: candle_core::Error) -> Self {
        HarnessError::Unexpected(e.to_string())
    }
}

impl From<tokio::task::JoinError> for HarnessError {
    fn from(e: tokio::task::JoinError) -> Self {
        HarnessError::Unexpected(e.to_string())
    }
}

impl IntoResponse for HarnessError {
    fn into_response(self) -> Response {
        match &self {
            HarnessError::Validation(msg) => tracing::warn!(error = %msg, "request rejected"),
            HarnessError::DependencyUnavailable(msg) => {
                tracing::error!(error = %msg, "accelerator unavailable")
            }
            HarnessError::Unexpected(msg) => tracing::error!(error = %msg, "request failed"),
        }
        let status = self.status();
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            HarnessError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HarnessError::DependencyUnavailable("no gpu".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            HarnessError::Unexpected("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn candle_errors_are_unexpected() {
        let err: HarnessError = candle_core::Error::Msg("shape mismatch".into()).into();
        assert!(matches!(err, HarnessError::Unexpected(ref m) if m.contains("shape mismatch")));
    }
}
