//! # Lyra Common Library
//!
//! Shared code for the Lyra player crates:
//! - Media descriptors and stable track identity
//! - Player events, published player state and the EventBus
//! - Playback position records and the position store boundary
//! - Playback queue boundary and a list-backed queue
//! - Configuration file resolution
//! - Fade curve definitions and calculations

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod fade_curves;
pub mod media;
pub mod persistence;
pub mod queue;
pub mod time;

pub use error::{Error, Result};
pub use fade_curves::FadeCurve;
pub use media::{MediaFile, TrackIdentity};
pub use persistence::{MemoryPositionStore, PlaybackPositionRecord, PositionStore};
pub use queue::{ListQueue, PlaybackMode, PlaybackQueue};
