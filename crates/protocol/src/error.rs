//! Error types for the protocol crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol error type covering parsing and (de)serialization failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Failed to serialize data.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize data.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// An identifier could not be parsed.
    #[error("invalid {kind} id: {value:?}")]
    InvalidId {
        /// What kind of identifier was expected.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// Unknown library type name.
    #[error("invalid library type: {0:?} (expected generic, books, movies, shows or music)")]
    InvalidLibraryType(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

/// Machine-readable error category carried in error response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request was malformed or asked for a disallowed operation.
    BadRequest,
    /// No authenticated user was attached to the request.
    Unauthorized,
    /// The target does not exist or the caller may not know that it exists.
    NotFound,
    /// The route exists but not for this method.
    MethodNotAllowed,
    /// Something failed on the server side.
    InternalError,
}

/// JSON body returned alongside every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error category.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
}

impl ErrorMessage {
    /// Create a new error body.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
