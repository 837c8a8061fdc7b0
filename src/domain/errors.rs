//! Domain error types
//!
//! This module defines the error hierarchy for QQQ. All errors are domain-specific
//! and don't expose third-party types.

use thiserror::Error;

/// Main QQQ error type
///
/// This is the primary error type used throughout the crate. Per-record business
/// errors are not represented here; they are attached to the record itself
/// (see [`crate::domain::record::Record::add_error`]).
#[derive(Debug, Error)]
pub enum QqqError {
    /// Configuration-related errors (fatal, raised before any I/O)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Errors raised by a backend module
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Query construction or evaluation errors
    #[error("Query error: {0}")]
    Query(String),

    /// Process orchestration errors
    #[error("Process error: {0}")]
    Process(String),

    /// The record pipe was terminated while a producer was still adding records
    #[error("Record pipe terminated")]
    PipeTerminated,

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Backend-specific errors
///
/// Errors that occur inside a backend module while serving an action.
#[derive(Debug, Error)]
pub enum BackendError {
    /// No backend registered under the requested name
    #[error("Backend not found: {0}")]
    BackendNotFound(String),

    /// No table registered under the requested name
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// The backend does not support the requested operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Transaction lifecycle failure
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Failed to read or write a stored record
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl QqqError {
    /// Whether this error is the cooperative-cancellation signal of a record pipe
    pub fn is_pipe_terminated(&self) -> bool {
        matches!(self, QqqError::PipeTerminated)
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for QqqError {
    fn from(err: std::io::Error) -> Self {
        QqqError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for QqqError {
    fn from(err: serde_json::Error) -> Self {
        QqqError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for QqqError {
    fn from(err: toml::de::Error) -> Self {
        QqqError::Configuration(format!("TOML parse error: {err}"))
    }
}
