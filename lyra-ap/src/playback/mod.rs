//! Playback control
//!
//! The pieces the engine task composes:
//!
//! - `session`: per-track clock and transport state
//! - `scheduler`: generation-tagged chunk streaming into a graph voice
//! - `tracker`: display-tick position, progress throttling, end detection
//! - `seek`: the seek state machine
//! - `crossfade`: shadow-voice preparation and the fade itself
//! - `persistence`: resume-point policy over the external position store
//! - `engine`: the actor that owns all of the above, and its handle

pub mod crossfade;
pub mod engine;
pub mod persistence;
pub mod scheduler;
pub mod seek;
pub mod session;
pub mod tracker;

pub use engine::PlaybackEngine;
pub use persistence::{should_persist, PositionPersistence};
pub use session::PlaybackSession;
