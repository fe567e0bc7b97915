//! Error types for upc-process
//!
//! Engine-level failures. Which of these end an item, and which only skip one
//! keyword, is decided by the caller (see `services::persistence`).

use crate::label::LabelError;
use thiserror::Error;

/// Engine error type
#[derive(Debug, Error)]
pub enum ProcessError {
    /// upc-common error (database, I/O, configuration)
    #[error(transparent)]
    Common(#[from] upc_common::Error),

    /// Label could not be read or lacks a required key
    #[error(transparent)]
    Label(#[from] LabelError),

    /// Malformed JSON document or queue payload
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Target or instrument reference row could not be resolved
    #[error("Reference data missing: {0}")]
    ReferenceMissing(String),

    /// Keyword value could not be coerced to its declared type
    #[error("Cannot coerce {keyword} to {kind}: {reason}")]
    Coercion {
        keyword: String,
        kind: String,
        reason: String,
    },
}

impl From<sqlx::Error> for ProcessError {
    fn from(err: sqlx::Error) -> Self {
        ProcessError::Common(upc_common::Error::Database(err))
    }
}

impl From<std::io::Error> for ProcessError {
    fn from(err: std::io::Error) -> Self {
        ProcessError::Common(upc_common::Error::Io(err))
    }
}

/// Result type for engine operations
pub type ProcessResult<T> = Result<T, ProcessError>;
