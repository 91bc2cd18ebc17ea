use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use parley_resolver::{ErrorKind, ResolveError};
use parley_types::api::ErrorResponse;

/// Handler error: a status plus the `{ error, kind, retryable }` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &str, error: impl Into<String>, retryable: bool) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                kind: kind.to_string(),
                retryable,
            },
        }
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Unknown.as_str(), error, false)
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        let retryable = err.retryable();
        let message = err.to_string();

        let Some(kind) = err.kind() else {
            return Self::new(StatusCode::BAD_REQUEST, "invalid", message, false);
        };

        let status = match kind {
            ErrorKind::Auth => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match kind {
            ErrorKind::Unknown => error!("Direct conversation resolution failed: {}", message),
            ErrorKind::Transient => warn!("Direct conversation resolution unavailable: {}", message),
            _ => {}
        }

        Self::new(status, kind.as_str(), message, retryable)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
