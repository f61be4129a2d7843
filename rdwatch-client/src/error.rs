//! Error types for the request layer.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Errors returned by one-shot API calls.
///
/// Unlike the push streams, request failures are propagated to the caller.
/// `Display` yields the server-provided message verbatim for API errors so
/// it can be shown to the user as-is.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The server answered with a non-2xx status.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The endpoint URL cannot carry an API path.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl RequestError {
    /// Build an API error from a non-success response body.
    ///
    /// The server reports failures as `{"error": "..."}`; anything else falls
    /// back to the raw body, then to the status reason.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => parsed.error,
            Err(_) if !body.trim().is_empty() => body.trim().to_string(),
            Err(_) => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };
        RequestError::Api {
            status: status.as_u16(),
            message,
        }
    }

    /// HTTP status for API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RequestError::Timeout
        } else if err.is_connect() {
            RequestError::Connection(err.to_string())
        } else if err.is_decode() {
            RequestError::Parse(err.to_string())
        } else {
            RequestError::Http(err.to_string())
        }
    }
}
