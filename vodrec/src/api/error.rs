//! API error handling.
//!
//! Every failure leaves the API as a JSON `{ code, message }` body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use twitch_vod::ResolveError;

use crate::error::Error;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    /// Create a 502 Bad Gateway error.
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "BAD_GATEWAY", message)
    }

    /// A failed resolution: always a 500, with a code naming the failure kind.
    pub fn resolution(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }
}

fn resolve_error_code(err: &ResolveError) -> &'static str {
    match err {
        ResolveError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
        ResolveError::NotFound(_) => "NOT_FOUND",
        ResolveError::ParseError(_) => "PARSE_ERROR",
        ResolveError::MatchNotFound => "MATCH_NOT_FOUND",
        ResolveError::RecoveryTimeout(_) => "RECOVERY_TIMEOUT",
        ResolveError::Container(_) => "CONTAINER_ERROR",
        ResolveError::Http(_) => "UPSTREAM_ERROR",
        ResolveError::Json(_) => "PARSE_ERROR",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidVideoId(id) => Self::new(
                StatusCode::BAD_REQUEST,
                "INVALID_VIDEO_ID",
                format!("Invalid video id: {id:?}"),
            ),
            Error::Resolve(e) => Self::resolution(resolve_error_code(&e), e.to_string()),
            Error::SharedResolution { message, .. } => {
                Self::resolution("RESOLUTION_FAILED", message)
            }
            Error::ApiError(msg) => Self::bad_request(msg),
            other => {
                tracing::error!("Unexpected error: {}", other);
                Self::internal(other.to_string())
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
