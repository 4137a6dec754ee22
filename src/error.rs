//! Centralized error types for mail2fax.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mail2fax library.
#[derive(Error, Debug)]
pub enum RelayError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No phone number resolved for the selected profile.
    /// Checked before any scratch state is created.
    #[error("No phone number specified")]
    NoPhoneNumber,

    /// The raw input could not be parsed as a mail message.
    #[error("Failed to parse mail message")]
    UnparsableMessage,

    /// A transfer-encoded payload could not be decoded.
    #[error("Transfer decoding error: {0}")]
    DecodeError(String),

    /// Persisting an artifact to the scratch area failed.
    #[error("Failed to persist artifact {seq}: {reason}")]
    PersistError { seq: u64, reason: String },

    /// A renderer collaborator failed for one artifact.
    #[error("Rendering '{path}' failed: {reason}")]
    RenderError { path: PathBuf, reason: String },

    /// Inspecting or splitting a multi-frame container failed.
    #[error("Frame handling for '{path}' failed: {reason}")]
    FrameError { path: PathBuf, reason: String },

    /// The delivery collaborator reported a failure.
    #[error("Dispatch failed: {0}")]
    DispatchError(String),

    /// Appending to the compressed message archive failed.
    /// Never escalated past a warning by callers.
    #[error("Message archive error: {0}")]
    ArchiveError(String),
}

/// Convenience alias for `Result<T, RelayError>`.
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `RelayError`
/// when no path context is available (rare — prefer `RelayError::io`).
impl From<std::io::Error> for RelayError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
