//! # Lyra Audio Player Library (lyra-ap)
//!
//! Real-time playback engine for local audio files.
//!
//! **Architecture:** symphonia decode → fixed DSP graph (source → pitch →
//! rate → mixer) on a render thread → ringbuf → cpal (or null) output.
//! A single tokio task owns all playback state and is driven through the
//! `PlaybackEngine` handle.
//!
//! Playback speed and pitch are independent: the pitch node shifts pitch
//! without changing duration, the rate node changes tempo without changing
//! pitch.

pub mod audio;
pub mod config;
pub mod error;
pub mod graph;
pub mod playback;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use playback::PlaybackEngine;
pub use state::{PlayerSnapshot, SharedState};
