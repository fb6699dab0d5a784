//! Error types for hubstore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using HubError
pub type Result<T> = std::result::Result<T, HubError>;

/// Unified error type for hubstore operations
#[derive(Debug, Error)]
pub enum HubError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Argument and Position Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Index {index} out of range for {size} records")]
    OutOfRange { index: i64, size: usize },

    #[error("Invalid index {index} for table with {size} rows")]
    InvalidIndex { index: usize, size: usize },

    #[error("Key not found")]
    KeyNotFound,

    #[error("Key already exists")]
    AlreadyExists,

    #[error("Wrong key type for this container")]
    WrongKeyType,

    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),

    // -------------------------------------------------------------------------
    // Log Database Errors
    // -------------------------------------------------------------------------
    #[error("Log database corruption detected: {0}")]
    Corrupt(String),

    // -------------------------------------------------------------------------
    // Value Encoding Errors
    // -------------------------------------------------------------------------
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Invalid value data: {0}")]
    InvalidData(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Container Manager Errors
    // -------------------------------------------------------------------------
    #[error("Unknown container type: {0}")]
    UnknownType(String),

    #[error("Container '{name}' already exists with type '{existing}', requested '{requested}'")]
    AlreadyExistsWithDifferentType {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<bincode::Error> for HubError {
    fn from(err: bincode::Error) -> Self {
        HubError::Serialization(err.to_string())
    }
}
