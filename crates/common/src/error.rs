//! Error types for netforge

use thiserror::Error;

/// Result type alias using the netforge Error
pub type Result<T> = std::result::Result<T, Error>;

/// netforge error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Switch lock on {device} held by {owner}")]
    LockBusy { device: String, owner: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Apply stopped after {applied} writes at {table}|{key}: {reason}")]
    Partial {
        applied: usize,
        table: String,
        key: String,
        reason: String,
    },

    #[error("Operation timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] with the given kind and name.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Shorthand for a [`Error::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Shorthand for a [`Error::Conflict`].
    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    /// Process exit code for the CLI surface.
    ///
    /// 0 success, 1 operation error, 2 permission denied, 3 validation
    /// error, 4 connection failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::PermissionDenied(_) => 2,
            Error::Validation(_) | Error::NotFound { .. } => 3,
            Error::Transport(_) | Error::Timeout { .. } => 4,
            _ => 1,
        }
    }
}
