//! Error types for the uptrack state store.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    /// Another handle (usually another process) holds the database lock.
    #[error("database {} is locked by another process", .0.display())]
    Locked(PathBuf),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("corrupt document under {key}: {reason}")]
    Deserialize { key: String, reason: String },
}
