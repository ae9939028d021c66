//! Test helper modules for lyra-ap integration tests
//!
//! - `audio_generator`: deterministic WAV fixtures
//! - `test_player`: engine on the null output with an in-memory store and
//!   a queue that counts how often the engine consults it

#![allow(dead_code)]

pub mod audio_generator;
pub mod test_player;

pub use audio_generator::{generate_sine_wav, write_garbage_file};
pub use test_player::{drain_events, CountingQueue, TestPlayer};
