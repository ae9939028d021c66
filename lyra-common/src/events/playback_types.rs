//! Playback-related type definitions
//!
//! Supporting types for the published player state.

use serde::{Deserialize, Serialize};

/// Transport state of the player
///
/// `Error` carries the message surfaced to the UI layer; the engine keeps
/// running and accepts a new `load`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum PlayerState {
    #[default]
    Stopped,
    Playing,
    Paused,
    Buffering,
    Error(String),
}

impl PlayerState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlayerState::Playing)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PlayerState::Error(_))
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Stopped => write!(f, "stopped"),
            PlayerState::Playing => write!(f, "playing"),
            PlayerState::Paused => write!(f, "paused"),
            PlayerState::Buffering => write!(f, "buffering"),
            PlayerState::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Why a track stopped being the current track
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackEndReason {
    /// Played to the end
    Completed,
    /// Replaced by a crossfade into the next track
    CrossfadedOut,
    /// User skipped, stopped or unloaded
    Skipped,
}
