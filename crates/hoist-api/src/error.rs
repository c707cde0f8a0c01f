//! API error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    NotImplemented(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::NotImplemented(msg) => (StatusCode::NOT_IMPLEMENTED, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<hoist_core::Error> for ApiError {
    fn from(err: hoist_core::Error) -> Self {
        match err {
            hoist_core::Error::Validation(msg) => ApiError::BadRequest(msg),
            hoist_core::Error::Conflict(msg) => ApiError::Conflict(msg),
            hoist_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            hoist_core::Error::Unimplemented(msg) => ApiError::NotImplemented(msg),
            hoist_core::Error::Engine(msg) => ApiError::Unavailable(msg),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_core::Error;

    #[test]
    fn test_status_codes() {
        let cases = [
            (Error::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (Error::Conflict("dup".into()), StatusCode::CONFLICT),
            (Error::Unimplemented("find".into()), StatusCode::NOT_IMPLEMENTED),
            (Error::Engine("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::Build("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
