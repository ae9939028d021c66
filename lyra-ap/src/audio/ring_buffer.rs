//! Lock-free ring buffer between the render pump and the output device
//!
//! Single producer (render thread), single consumer (device callback or the
//! null output's drain thread). Neither side ever blocks.

use crate::audio::types::AudioFrame;
use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Default capacity in frames (~93ms @ 44.1kHz)
pub const DEFAULT_RING_CAPACITY: usize = 4096;

/// Ring buffer statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingBufferStats {
    pub underruns: u64,
    pub frames_consumed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    underruns: AtomicU64,
    frames_consumed: AtomicU64,
}

/// Create a ring buffer of `capacity` frames and split it
pub fn audio_ring_buffer(capacity: usize) -> (AudioProducer, AudioConsumer) {
    let capacity = capacity.max(64);
    debug!("Creating audio ring buffer with capacity: {} frames", capacity);

    let (producer, consumer) = HeapRb::<AudioFrame>::new(capacity).split();
    let counters = Arc::new(Counters::default());
    (
        AudioProducer { producer },
        AudioConsumer {
            consumer,
            counters,
        },
    )
}

/// Producer half (render thread)
pub struct AudioProducer {
    producer: ringbuf::HeapProd<AudioFrame>,
}

impl AudioProducer {
    /// Push as many frames as fit, returning how many were taken
    pub fn push_slice(&mut self, frames: &[AudioFrame]) -> usize {
        self.producer.push_slice(frames)
    }

    /// Free space in frames
    pub fn vacant_len(&self) -> usize {
        self.producer.vacant_len()
    }

    pub fn occupied_len(&self) -> usize {
        self.producer.occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity().into()
    }
}

/// Consumer half (output side)
pub struct AudioConsumer {
    consumer: ringbuf::HeapCons<AudioFrame>,
    counters: Arc<Counters>,
}

impl AudioConsumer {
    /// Pop one frame, or silence on underrun
    pub fn pop_or_silence(&mut self) -> AudioFrame {
        match self.consumer.try_pop() {
            Some(frame) => {
                self.counters.frames_consumed.fetch_add(1, Ordering::Relaxed);
                frame
            }
            None => {
                let count = self.counters.underruns.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 44_100 == 0 {
                    trace!("Audio ring buffer underruns: {}", count);
                }
                AudioFrame::zero()
            }
        }
    }

    /// Drop up to `max` frames without playing them
    pub fn discard(&mut self, max: usize) -> usize {
        let dropped = self.consumer.skip(max);
        self.counters
            .frames_consumed
            .fetch_add(dropped as u64, Ordering::Relaxed);
        dropped
    }

    pub fn occupied_len(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Handle for reading statistics from another thread
    pub fn stats_handle(&self) -> RingStatsHandle {
        RingStatsHandle(Arc::clone(&self.counters))
    }
}

/// Cloneable view on consumer-side statistics
#[derive(Debug, Clone)]
pub struct RingStatsHandle(Arc<Counters>);

impl RingStatsHandle {
    pub fn stats(&self) -> RingBufferStats {
        RingBufferStats {
            underruns: self.0.underruns.load(Ordering::Relaxed),
            frames_consumed: self.0.frames_consumed.load(Ordering::Relaxed),
        }
    }
}
