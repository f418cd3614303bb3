//! Error types for the treeprint library
//!
//! Most failures during a walk never surface here: a node that cannot be read
//! is recorded in the [`Forbidden`](crate::types::Forbidden) map and the walk
//! carries on. The errors in this module are the ones a caller has to handle,
//! such as an invalid walk root or a snapshot that cannot be decoded.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the treeprint library
pub type Result<T> = std::result::Result<T, TreeprintError>;

/// Main error type for all treeprint operations
#[derive(Debug, Error)]
pub enum TreeprintError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The walk root does not exist or is neither a file nor a directory
    #[error("Invalid walk root: {0:?}")]
    InvalidRoot(PathBuf),

    /// Snapshot store errors
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Thread pool error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rayon::ThreadPoolBuildError> for TreeprintError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        TreeprintError::ThreadPool(err.to_string())
    }
}

impl TreeprintError {
    /// Create a snapshot error with a custom message
    pub fn snapshot(msg: impl Into<String>) -> Self {
        TreeprintError::Snapshot(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        TreeprintError::Internal(msg.into())
    }

    /// Check if this error is recoverable
    ///
    /// Snapshot and I/O failures may succeed on retry or with a different
    /// destination; an invalid root never will.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TreeprintError::Io(_) | TreeprintError::Snapshot(_))
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            TreeprintError::InvalidRoot(path) => {
                format!(
                    "Cannot index {:?}: the path does not exist or is not a regular file or directory.",
                    path
                )
            }
            TreeprintError::ThreadPool(msg) => {
                format!("Could not start worker threads ({}). Try fewer parallel workers.", msg)
            }
            _ => self.to_string(),
        }
    }
}
