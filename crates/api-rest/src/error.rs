//! API error type and its JSON mapping.
//!
//! Every failure, including a request body that is not valid JSON, is returned as
//! `{"kind": ..., "message": ...}` where `kind` is the core error classification
//! (`validation`, `persistence`, `crypto`, ...).

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use triage_core::{ErrorKind, TriageError};

use crate::dto::ErrorRes;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] TriageError),
    #[error("invalid request body: {0}")]
    Body(#[from] JsonRejection),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    /// A blocking task that panicked or was cancelled maps to `persistence`.
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(err) => err.kind(),
            Self::Body(_) => ErrorKind::Validation,
            Self::Join(_) => ErrorKind::Persistence,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Body(rejection) => rejection.status(),
            Self::Core(err) if err.kind() == ErrorKind::Validation => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = %self.kind(), error = %self, "request failed");
        }

        let body = ErrorRes {
            kind: self.kind().as_str().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_bad_requests() {
        let err = ApiError::from(TriageError::InvalidInput("nope".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn persistence_errors_are_server_errors() {
        let err = ApiError::from(TriageError::FileWrite(std::io::Error::other("disk full")));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }
}
