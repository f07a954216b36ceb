//! Error types for the leaderboard service

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the leaderboard service
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Request Errors
    // =========================================================================
    /// Request payload or parameter failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Student identifier does not match the `R` + 10 digit format
    #[error("Invalid student id: {0}")]
    InvalidStudentId(String),

    /// Subject is not part of the tracked set
    #[error("Unknown subject: {0}")]
    UnknownSubject(String),

    /// Student is absent from the durable store
    #[error("Student not found: {0}")]
    NotFound(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Durable store or cache store failed
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A bounded store call or lock wait elapsed
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Record already exists under this identifier
    #[error("Student already exists: {0}")]
    AlreadyExists(String),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used to map errors onto response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unavailable,
    Internal,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::InvalidStudentId(_) | Error::UnknownSubject(_) => {
                ErrorKind::Validation
            }
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::StoreUnavailable(_) | Error::Timeout { .. } | Error::Io(_) => {
                ErrorKind::Unavailable
            }
            Error::AlreadyExists(_) | Error::Config(_) | Error::Json(_) | Error::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// True for the distinguished not-found variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub(crate) fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            after,
        }
    }
}
