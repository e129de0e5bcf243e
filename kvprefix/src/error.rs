//! Error types for KVPrefix operations.

use common::StorageError;

/// Error type for KVPrefix operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Errors reported by the backing key-value store, passed through unmodified.
    Storage(String),

    /// Record values that cannot be serialized or stored metadata that cannot
    /// be decoded back into the record type.
    Encoding(String),

    /// Invalid input or parameter errors, raised before any store call.
    InvalidInput(String),

    /// Internal errors indicating bugs or invariant violations.
    Internal(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Encoding(msg) => write!(f, "Encoding error: {}", msg),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Storage(msg) => Error::Storage(msg),
            StorageError::InvalidInput(msg) => Error::InvalidInput(msg),
            StorageError::Internal(msg) => Error::Internal(msg),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}

/// Result type alias for KVPrefix operations.
pub type Result<T> = std::result::Result<T, Error>;
