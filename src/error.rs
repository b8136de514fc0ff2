//! Error types for the worksync library
//!
//! This module defines all error types that can occur during worksync
//! operations. The taxonomy mirrors the operational seams of the engine:
//! configuration problems, missing sources, archive corruption, remote API
//! failures, declined confirmations, and partial failures where the remote
//! record changed but the local mirror could not be brought in line.

use thiserror::Error;

/// Type alias for Results in the worksync library
pub type Result<T> = std::result::Result<T, WorksyncError>;

/// Main error type for all worksync operations
#[derive(Debug, Error)]
pub enum WorksyncError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error")]
    WalkDir(#[from] walkdir::Error),

    /// A required path setting (workspace or remote root) is not configured
    #[error("Configuration error: {0}")]
    Config(String),

    /// A source path or snapshot does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// An archive entry would escape the destination directory
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    /// The archive stream is malformed and cannot be read
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    /// Non-success response or transport failure talking to the remote API.
    /// Status 0 means the request never produced an HTTP response.
    #[error("Remote error (status {status}): {body}")]
    Remote {
        /// HTTP status code, or 0 for connection-level failures
        status: u16,
        /// Raw response body (or transport error text)
        body: String,
    },

    /// The user declined a confirmation prompt; a normal negative outcome,
    /// not a true error
    #[error("Operation cancelled by user")]
    Cancelled,

    /// The remote mutation succeeded but local materialization failed
    #[error("Partial failure: {0}")]
    Partial(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<zip::result::ZipError> for WorksyncError {
    fn from(err: zip::result::ZipError) -> Self {
        WorksyncError::CorruptArchive(err.to_string())
    }
}

impl WorksyncError {
    /// Create a configuration error with a custom message
    pub fn config(msg: impl Into<String>) -> Self {
        WorksyncError::Config(msg.into())
    }

    /// Create a not-found error with a custom message
    pub fn not_found(msg: impl Into<String>) -> Self {
        WorksyncError::NotFound(msg.into())
    }

    /// Create a remote error from an HTTP status and raw body
    pub fn remote(status: u16, body: impl Into<String>) -> Self {
        WorksyncError::Remote {
            status,
            body: body.into(),
        }
    }

    /// Create a partial-failure error with a custom message
    pub fn partial(msg: impl Into<String>) -> Self {
        WorksyncError::Partial(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        WorksyncError::Internal(msg.into())
    }

    /// Check if this error is a declined confirmation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorksyncError::Cancelled)
    }

    /// Check if this error is a partial failure (remote changed, local stale)
    pub fn is_partial(&self) -> bool {
        matches!(self, WorksyncError::Partial(_))
    }

    /// Check if this error came from the remote API
    pub fn is_remote(&self) -> bool {
        matches!(self, WorksyncError::Remote { .. })
    }

    /// HTTP status of a remote error, if this is one
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            WorksyncError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}
