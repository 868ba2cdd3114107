//! Error handling for the identity provider core.
//!
//! Error messages are informative for operators but never carry key
//! material or user data.

use thiserror::Error;

/// Result type alias using the core error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Resource not found.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Storage collaborator failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal error.
    #[error("internal error")]
    Internal,
}

impl Error {
    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Storage(_) | Self::Internal)
    }
}
