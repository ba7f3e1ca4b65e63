//! API error handling for consistent JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::BridgeError;

/// API error type that converts to JSON responses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": true,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        let status = match &err {
            BridgeError::InvalidConfiguration(_) | BridgeError::NoAudioChannel => {
                StatusCode::BAD_REQUEST
            }
            BridgeError::ResourceUnavailable(_) => StatusCode::BAD_GATEWAY,
            BridgeError::SessionUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            BridgeError::AttachRejected(_) => StatusCode::CONFLICT,
            BridgeError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_status_codes() {
        let cases = [
            (BridgeError::invalid("x"), StatusCode::BAD_REQUEST),
            (BridgeError::NoAudioChannel, StatusCode::BAD_REQUEST),
            (BridgeError::unavailable("x"), StatusCode::BAD_GATEWAY),
            (BridgeError::SessionUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (BridgeError::rejected("x"), StatusCode::CONFLICT),
            (BridgeError::Cancelled, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }
}
