//! Audio I/O: decoding, output devices and the ring buffer between them

pub mod decoder;
pub mod output;
pub mod ring_buffer;
pub mod types;

pub use decoder::{probe, TrackReader};
pub use output::{start_output, OutputHandle};
pub use ring_buffer::{audio_ring_buffer, AudioConsumer, AudioProducer};
pub use types::{AudioFrame, PcmChunk, TrackInfo, CHANNELS};
