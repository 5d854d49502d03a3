//! Error types for Backchat
//!
//! This module defines the error taxonomy used throughout the persistence
//! core. Conditional-write conflicts and not-found conditions are ordinary
//! outcomes during races and are swallowed by the stores wherever the
//! operation has a well-defined fallback; everything classified as `Table`
//! propagates unchanged to the protocol layer, which owns retry policy and
//! user-facing messaging.

use thiserror::Error;

/// Backchat error types
#[derive(Debug, Error)]
pub enum Error {
    /// Conditional check failed on a write (expected during races)
    #[error("Conditional check failed: {0}")]
    Conflict(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Validation error (e.g. malformed update against a vanished item)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Table service error (transient/unknown, propagates unchanged)
    #[error("Table service error: {0}")]
    Table(String),
}

impl Error {
    /// Whether this error means the targeted item (or its parent room) is
    /// already gone. Counter updates against a vanished room fold these into
    /// a zero-effect success because the room's own expiry already achieved
    /// the caller's intent.
    pub fn is_gone(&self) -> bool {
        matches!(
            self,
            Error::Conflict(_) | Error::NotFound(_) | Error::Validation(_)
        )
    }
}

/// Result type for Backchat operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
