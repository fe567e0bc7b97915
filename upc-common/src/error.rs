//! Errors shared by the UPC crates
//!
//! Database, filesystem and configuration failures. Item-level outcomes
//! (failed steps, unresolved references) live in the worker's own error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// SQLite failure, including lock contention after retries ran out
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bootstrap file or a document it names could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A configuration document parsed as JSON but has the wrong shape
    #[error("Malformed document: {0}")]
    Document(String),

    /// A blocking worker task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}
