//! Error types for srcsync core.
//!
//! Failures here are input or filesystem problems detected before any
//! network traffic happens. Transport failures live in `srcsync-git`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the core domain types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The repository URL could not be parsed as a transport endpoint.
    #[error("invalid repository url '{url}': {reason}")]
    InvalidEndpoint {
        /// The URL as provided
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// The endpoint uses a scheme the engine cannot talk to.
    #[error("unsupported protocol '{0}'")]
    UnsupportedProtocol(String),

    /// Refused to remove the filesystem root.
    #[error("refusing to remove directory '{}'", .0.display())]
    RefuseRemoveRoot(PathBuf),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates an InvalidEndpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
