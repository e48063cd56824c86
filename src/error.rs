//! # Error Handling
//!
//! Errors returned from HTTP handlers and how they become responses.
//!
//! Transcriber rejections are not errors at this level: they are answered with
//! `200 OK` and an `error` field (see `handlers::transcribe`). Everything that
//! reaches [`AppError`] is either the client's fault (4xx) or ours (5xx).
//!
//! ## JSON Response Format:
//! ```json
//! {
//!   "error": {
//!     "type": "bad_request",
//!     "message": "wrong file type: .txt",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    /// Server-side failure. The message must be generic; details go to the log.
    Internal(String),

    /// Malformed request (not multipart, missing file, ...)
    BadRequest(String),

    /// Request was well-formed but its content is not acceptable
    ValidationError(String),

    /// No free transcription slot within the wait timeout
    Busy(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Busy(msg) => write!(f, "Busy: {}", msg),
        }
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            AppError::Busy(msg) => (StatusCode::FORBIDDEN, "service_busy", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.parts().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = self.parts();

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

pub type AppResult<T> = Result<T, AppError>;
