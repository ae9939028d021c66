//! Error types for lyra-ap
//!
//! Fatal conditions for a track end up as `PlayerState::Error(message)` in the
//! published state; the `Error` values here are what the control context
//! returns to callers of the engine handle.

use lyra_common::TrackIdentity;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the audio player
#[derive(Error, Debug)]
pub enum Error {
    /// Requested track cannot be opened
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Corrupt or unsupported stream
    #[error("Decode error in {identity}: {message}")]
    Decode {
        identity: TrackIdentity,
        message: String,
    },

    /// Audio output stopped and could not be restarted
    #[error("Audio engine not running: {0}")]
    EngineNotRunning(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from shared components (stores, queue, config resolution)
    #[error(transparent)]
    Common(#[from] lyra_common::Error),

    /// The engine task has shut down
    #[error("Engine channel closed")]
    ChannelClosed,

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn decode(identity: &TrackIdentity, message: impl Into<String>) -> Self {
        Error::Decode {
            identity: identity.clone(),
            message: message.into(),
        }
    }
}

/// Convenience Result type using lyra-ap Error
pub type Result<T> = std::result::Result<T, Error>;
