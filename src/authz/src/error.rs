//! Error types for the permission engine

use thiserror::Error;

/// Permission engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Malformed or missing configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A type was asked for a capability it never declared
    #[error("Missing capability: {0}")]
    MissingCapability(String),

    /// Bitmask value is not a non-negative decimal integer
    #[error("Invalid bitmask value: {0:?}")]
    InvalidBitmask(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource dependency declarations form a cycle
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    /// Storage backend error
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AuthzError {
    fn from(err: anyhow::Error) -> Self {
        AuthzError::Internal(err.to_string())
    }
}

/// Result type for permission engine operations
pub type Result<T> = std::result::Result<T, AuthzError>;
