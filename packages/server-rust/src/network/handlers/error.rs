//! Error responses of the HTTP boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use supplychain_core::ClassifiedError;

/// Errors surfaced to HTTP callers as `{"error": ..., "kind": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A dispatch failure, already classified.
    #[error(transparent)]
    Dispatch(#[from] ClassifiedError),

    /// Request rejected before dispatch.
    #[error("{0}")]
    BadRequest(String),

    /// The server is draining and takes no new work.
    #[error("server is shutting down")]
    Unavailable,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    kind: &'a str,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Dispatch(e) => {
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Dispatch(e) => e.kind().as_str(),
            Self::BadRequest(_) => "bad_request",
            Self::Unavailable => "unavailable",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let body = ErrorBody {
            error: &message,
            kind: self.kind(),
        };
        (self.status(), Json(body)).into_response()
    }
}
