//! Shared API types
//!
//! Errors for failures outside a printer's lifecycle. Anything a printer
//! can report goes through the printer instead.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Standard API error response
#[derive(Debug)]
pub enum ApiError {
    Internal { message: String },
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code, message) = match self {
            Self::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "INTERNAL",
                message,
            ),
        };
        (
            status,
            Json(serde_json::json!({
                "error": error_type,
                "code": code,
                "message": message
            })),
        )
            .into_response()
    }
}
