//! Error types for billing-dispatch
//!
//! This module provides error handling for the library, including:
//! - The crate-wide [`Error`] type and its [`Result`] alias
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for billing-dispatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for billing-dispatch
///
/// Errors that can be retried by an execution unit are classified by
/// [`crate::retry::IsRetryable`]; everything else is either a caller error
/// rejected at submission time or an internal fault.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "dispatch.max_concurrent")
        key: Option<String>,
    },

    /// A submitted batch was empty or contained malformed drafts
    #[error("invalid batch: {message}")]
    InvalidBatch {
        /// Summary of why the batch was rejected
        message: String,
        /// One entry per offending draft, e.g. `residents[2].monto: must be greater than 0`
        details: Vec<String>,
    },

    /// The invoicing collaborator did not answer within the request timeout
    #[error("invoicing request timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// The timeout that elapsed
        timeout: Duration,
    },

    /// The invoicing collaborator answered with something other than 201 Created
    #[error("invoicing service returned unexpected status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code returned
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new batches
    #[error("shutdown in progress: not accepting new batches")]
    ShuttingDown,

    /// The dispatcher task is no longer running
    #[error("dispatcher is not running")]
    DispatcherUnavailable,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Generic error for cases not covered by specific variants
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// API error response format
///
/// This is the JSON structure returned by the API for all errors.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "invalid_batch",
///     "message": "invalid batch: 1 of 2 drafts are malformed",
///     "details": {
///       "problems": ["residents[1].monto: must be greater than 0"]
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "invalid_batch", "unauthorized")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::InvalidBatch { .. } => 400,

            // 500 Internal Server Error - Server-side issues
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - Invoicing collaborator errors
            Error::UnexpectedStatus { .. } => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
            Error::DispatcherUnavailable => 503,

            // 504 Gateway Timeout
            Error::Timeout { .. } => 504,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidBatch { .. } => "invalid_batch",
            Error::Timeout { .. } => "timeout",
            Error::UnexpectedStatus { .. } => "unexpected_status",
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ShuttingDown => "shutting_down",
            Error::DispatcherUnavailable => "dispatcher_unavailable",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            Error::InvalidBatch { details, .. } if !details.is_empty() => {
                Some(serde_json::json!({
                    "problems": details,
                }))
            }
            Error::UnexpectedStatus { status, .. } => Some(serde_json::json!({
                "status": status,
            })),
            Error::Timeout { timeout } => Some(serde_json::json!({
                "timeout_ms": timeout.as_millis() as u64,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
