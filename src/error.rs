//! # Error Handling
//!
//! This module defines the two error families the relay deals with:
//!
//! ## AppError — HTTP-facing errors
//! Errors returned from plain HTTP handlers (health, metrics). These implement
//! actix's `ResponseError` trait so they convert automatically into JSON error
//! responses with a consistent structure.
//!
//! ## RelayError — session-facing errors
//! Errors that occur inside an active relay session. These never become HTTP
//! responses; they drive the session state machine instead:
//! - **UpstreamUnavailable**: the transcription service could not be reached
//!   (connection refused, TLS failure, auth rejection, handshake timeout) or
//!   dropped while the session was active. Fatal to the session, never retried:
//!   audio already lost cannot be recovered by reconnecting.
//! - **MalformedUpstreamMessage**: one upstream payload failed to parse.
//!   Logged and dropped; a single bad message must not terminate the session.
//! - **ClientTransport**: the client socket errored. Fatal; the upstream
//!   connection is closed as part of teardown.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the HTTP surface of the application.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500 errors)
/// - **BadRequest**: Client sent invalid data (400 errors)
/// - **NotFound**: Requested resource doesn't exist (404 errors)
/// - **ConfigError**: Configuration problems (500 errors)
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// Configuration file or environment variable problems
    ConfigError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

/// Converts AppError values into HTTP responses that clients can understand.
///
/// ## JSON Response Format:
/// All errors return JSON with a consistent structure:
/// ```json
/// {
///   "error": {
///     "type": "bad_request",
///     "message": "...",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Errors that occur inside a relay session.
///
/// These drive the session state machine rather than an HTTP response.
/// Only the connection-level variants are fatal to a session; the
/// payload-level variant is recovered locally.
#[derive(Debug)]
pub enum RelayError {
    /// The upstream transcription connection could not be established or
    /// dropped unexpectedly while the session was active
    UpstreamUnavailable(String),

    /// A single upstream payload failed to parse; the session continues
    MalformedUpstreamMessage(String),

    /// The client connection errored (e.g., abrupt disconnect)
    ClientTransport(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::UpstreamUnavailable(msg) => {
                write!(f, "Upstream transcription service unavailable: {}", msg)
            }
            RelayError::MalformedUpstreamMessage(msg) => {
                write!(f, "Malformed upstream message: {}", msg)
            }
            RelayError::ClientTransport(msg) => {
                write!(f, "Client transport error: {}", msg)
            }
        }
    }
}

impl std::error::Error for RelayError {}

/// Parse failures on upstream payloads are always the recoverable variant.
impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::MalformedUpstreamMessage(err.to_string())
    }
}

/// Type alias for Results that use the HTTP-facing error type.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn test_app_error_status_codes() {
        let cases = [
            (AppError::Internal("boom".to_string()), 500),
            (AppError::BadRequest("nope".to_string()), 400),
            (AppError::NotFound("gone".to_string()), 404),
            (AppError::ConfigError("bad toml".to_string()), 500),
        ];
        for (err, expected) in cases {
            assert_eq!(err.error_response().status().as_u16(), expected);
        }
    }

    #[actix_web::test]
    async fn test_app_error_response_shape() {
        let response = AppError::BadRequest("invalid payload".to_string()).error_response();
        let body = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["type"], "bad_request");
        assert_eq!(value["error"]["message"], "invalid payload");
        assert!(value["error"]["timestamp"].is_string());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: AppError = config::ConfigError::Message("missing field".to_string()).into();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn test_relay_error_display() {
        let err = RelayError::UpstreamUnavailable("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));

        let err = RelayError::MalformedUpstreamMessage("expected value".to_string());
        assert!(err.to_string().contains("Malformed"));
    }

    #[test]
    fn test_json_error_becomes_malformed_message() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: RelayError = parse_err.into();
        assert!(matches!(err, RelayError::MalformedUpstreamMessage(_)));
    }
}
