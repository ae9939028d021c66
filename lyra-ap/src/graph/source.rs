//! Source node: plays scheduled PCM chunks in order
//!
//! Every chunk carries the generation it was scheduled under. `cancel`
//! raises the generation and drops whatever is queued, so a chunk that
//! arrives late from a superseded schedule is discarded on arrival.

use crate::audio::CHANNELS;
use std::collections::VecDeque;
use tracing::trace;

/// A chunk handed to the render context
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledBuffer {
    pub generation: u64,
    /// Position of this chunk within its schedule
    pub chunk_index: u64,
    /// Interleaved stereo samples
    pub samples: Vec<f32>,
    /// No chunk follows this one
    pub is_last: bool,
}

/// A chunk finished playing in the render context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCompletion {
    pub generation: u64,
    pub chunk_index: u64,
    pub is_last: bool,
}

#[derive(Debug, Default)]
pub struct SourceNode {
    queue: VecDeque<ScheduledBuffer>,
    /// Sample offset into the front buffer
    cursor: usize,
    generation: u64,
    /// The last chunk of the current schedule has played out
    ended: bool,
}

impl SourceNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a chunk; chunks from another generation are dropped
    pub fn schedule(&mut self, buffer: ScheduledBuffer) {
        if buffer.generation != self.generation {
            trace!(
                "Dropping chunk {} of generation {} (current {})",
                buffer.chunk_index,
                buffer.generation,
                self.generation
            );
            return;
        }
        self.ended = false;
        self.queue.push_back(buffer);
    }

    /// Drop everything queued and move to `generation`
    pub fn cancel(&mut self, generation: u64) {
        self.queue.clear();
        self.cursor = 0;
        self.generation = generation;
        self.ended = false;
    }

    /// Append up to `frames` frames to `out`, recording finished chunks
    ///
    /// Returns the number of frames written.
    pub fn pull(
        &mut self,
        out: &mut Vec<f32>,
        frames: usize,
        completions: &mut Vec<BufferCompletion>,
    ) -> usize {
        let mut remaining = frames * CHANNELS;
        let mut written = 0;

        while remaining > 0 {
            let Some(front) = self.queue.front() else {
                break;
            };
            let available = front.samples.len() - self.cursor;
            let take = available.min(remaining);
            out.extend_from_slice(&front.samples[self.cursor..self.cursor + take]);
            self.cursor += take;
            remaining -= take;
            written += take;

            if self.cursor >= front.samples.len() {
                let completion = BufferCompletion {
                    generation: front.generation,
                    chunk_index: front.chunk_index,
                    is_last: front.is_last,
                };
                self.ended = front.is_last;
                self.queue.pop_front();
                self.cursor = 0;
                completions.push(completion);
            }
        }

        written / CHANNELS
    }

    /// Frames queued and not yet pulled
    pub fn queued_frames(&self) -> usize {
        let queued: usize = self.queue.iter().map(|b| b.samples.len()).sum();
        (queued - self.cursor) / CHANNELS
    }

    /// Some chunk, possibly empty, is waiting to be pulled
    pub fn has_queued(&self) -> bool {
        !self.queue.is_empty()
    }

    /// The last chunk has been played and nothing new is queued
    pub fn is_ended(&self) -> bool {
        self.ended && self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(generation: u64, chunk_index: u64, frames: usize, is_last: bool) -> ScheduledBuffer {
        ScheduledBuffer {
            generation,
            chunk_index,
            samples: vec![chunk_index as f32; frames * CHANNELS],
            is_last,
        }
    }

    #[test]
    fn test_pull_crosses_chunks_and_reports_completions() {
        let mut source = SourceNode::new();
        source.schedule(buffer(0, 0, 3, false));
        source.schedule(buffer(0, 1, 3, true));
        assert_eq!(source.queued_frames(), 6);

        let mut out = Vec::new();
        let mut completions = Vec::new();
        assert_eq!(source.pull(&mut out, 4, &mut completions), 4);
        assert_eq!(out, vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].chunk_index, 0);
        assert!(!source.is_ended());

        assert_eq!(source.pull(&mut out, 10, &mut completions), 2);
        assert_eq!(completions[1].chunk_index, 1);
        assert!(completions[1].is_last);
        assert!(source.is_ended());
    }

    #[test]
    fn test_cancel_drops_queued_and_stale_chunks() {
        let mut source = SourceNode::new();
        source.schedule(buffer(0, 0, 8, false));
        source.cancel(1);
        assert_eq!(source.queued_frames(), 0);

        // Late arrival from the cancelled schedule
        source.schedule(buffer(0, 1, 8, false));
        assert_eq!(source.queued_frames(), 0);

        source.schedule(buffer(1, 0, 8, false));
        assert_eq!(source.queued_frames(), 8);
        assert_eq!(source.generation(), 1);
    }
}
