//! Error types for StudyCards.
//!
//! Library crates use [`StudyCardsError`] via `thiserror`.
//! The server maps it onto HTTP responses; the CLI wraps it with `color-eyre`.

use std::path::PathBuf;

/// Top-level error type for all StudyCards operations.
#[derive(Debug, thiserror::Error)]
pub enum StudyCardsError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to the completion API.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed payload or reply.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Assistant error (completion API failure or empty reply).
    #[error("assistant error: {0}")]
    Assistant(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (empty fields, bad email, weak password).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A record with the given id does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Bad credentials or an unknown session user.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, StudyCardsError>;

impl StudyCardsError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error for the given entity kind.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the requested record is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
