//! Buffer scheduler
//!
//! Streams one track through a graph voice in bounded chunks. Reads run on
//! the blocking pool and come back to the control context as `ChunkRead`
//! messages; completions come back from the render thread. Both carry the
//! generation they were issued under, and anything from an older generation
//! is dropped, so a cancelled schedule can never feed the wrong track.
//!
//! Up to two chunks sit in the graph at once: the one playing and the one
//! after it. Each chunk is scheduled as soon as its read lands, so the
//! source moves from one to the next without a gap. The graph plays its
//! queue in order, which keeps completions in chunk order. The next read
//! starts once a slot frees up.

use crate::audio::{PcmChunk, TrackInfo, TrackReader};
use crate::error::{Error, Result};
use crate::graph::{GraphCommand, GraphHandle, ScheduledBuffer, VoiceId};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace, warn};

/// Chunks queued in the graph and not yet completed
const MAX_QUEUED: usize = 2;

/// Where scheduler commands go
pub trait GraphSink {
    fn send(&self, command: GraphCommand) -> Result<()>;
}

impl GraphSink for GraphHandle {
    fn send(&self, command: GraphCommand) -> Result<()> {
        GraphHandle::send(self, command)
    }
}

/// A background read finished
pub struct ChunkRead {
    pub voice: VoiceId,
    pub generation: u64,
    pub reader: Box<TrackReader>,
    pub result: Result<PcmChunk>,
}

/// Outcome of starting a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleStart {
    /// The first chunk is queued in the graph
    Started,
    /// Nothing left to play from the requested frame
    AtEnd,
}

/// What the control context should do after a scheduler message
#[derive(Debug)]
pub enum SchedulerSignal {
    Continue,
    /// The final chunk has finished rendering
    Drained,
    /// Reading failed; the track cannot continue
    Failed(Error),
}

pub struct BufferScheduler {
    voice: VoiceId,
    chunk_frames: usize,
    generation: u64,
    next_chunk_index: u64,
    /// Chunk indices queued in the graph, oldest first
    queued: VecDeque<u64>,
    /// Reader waiting for a free slot
    parked: Option<Box<TrackReader>>,
    reading: bool,
    /// The last chunk has been read
    exhausted: bool,
    drained: bool,
    fail_next_read: bool,
}

impl BufferScheduler {
    pub fn new(voice: VoiceId, chunk_frames: usize) -> Self {
        Self {
            voice,
            chunk_frames: chunk_frames.max(1),
            generation: 0,
            next_chunk_index: 0,
            queued: VecDeque::new(),
            parked: None,
            reading: false,
            exhausted: false,
            drained: true,
            fail_next_read: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A schedule is running and has not drained
    pub fn is_active(&self) -> bool {
        !self.drained
    }

    /// Make the next background read report a decode error instead of reading
    ///
    /// **Test helper only**
    #[doc(hidden)]
    pub fn test_fail_next_read(&mut self) {
        self.fail_next_read = true;
    }

    /// Drop everything scheduled or being read and start a new generation
    pub fn cancel(&mut self, graph: &impl GraphSink) -> Result<()> {
        self.generation += 1;
        self.next_chunk_index = 0;
        self.queued.clear();
        self.parked = None;
        self.reading = false;
        self.exhausted = false;
        self.drained = true;
        graph.send(GraphCommand::Cancel {
            voice: self.voice,
            generation: self.generation,
        })
    }

    /// Cancel the current schedule and stream `track` from `start_frame`
    ///
    /// Opens a fresh reader; the previous one, and any read still running
    /// on it, is abandoned. The first chunk is read before returning and is
    /// at most `first_chunk_frames` long so playback starts quickly.
    pub async fn start(
        &mut self,
        graph: &impl GraphSink,
        reads: &UnboundedSender<ChunkRead>,
        track: Arc<TrackInfo>,
        start_frame: u64,
        first_chunk_frames: usize,
    ) -> Result<ScheduleStart> {
        self.cancel(graph)?;

        let start_frame = start_frame.min(track.total_frames);
        if start_frame >= track.total_frames {
            debug!("Schedule for {} starts at the end", track.identity);
            return Ok(ScheduleStart::AtEnd);
        }

        let first = first_chunk_frames.clamp(1, self.chunk_frames);
        let (reader, chunk) = tokio::task::spawn_blocking(move || {
            let mut reader = TrackReader::open(track, start_frame)?;
            let chunk = reader.read_chunk(first)?;
            Ok::<_, Error>((reader, chunk))
        })
        .await
        .map_err(|e| Error::Internal(format!("Reader task failed: {}", e)))??;

        if chunk.is_empty() {
            debug!("No audio after frame {} in {}", start_frame, reader.info().identity);
            return Ok(ScheduleStart::AtEnd);
        }

        trace!(
            "Voice {:?} generation {} starts at frame {}",
            self.voice,
            self.generation,
            start_frame
        );
        self.drained = false;
        let last = chunk.end_of_track;
        let buffer = self.make_buffer(chunk);
        self.schedule(graph, buffer)?;

        if last {
            self.exhausted = true;
        } else {
            self.request_read(reads, Box::new(reader));
        }
        Ok(ScheduleStart::Started)
    }

    /// Handle a finished background read
    pub fn on_chunk_read(
        &mut self,
        graph: &impl GraphSink,
        reads: &UnboundedSender<ChunkRead>,
        read: ChunkRead,
    ) -> SchedulerSignal {
        if read.generation != self.generation {
            trace!(
                "Discarding read for voice {:?} generation {} (current {})",
                self.voice,
                read.generation,
                self.generation
            );
            return SchedulerSignal::Continue;
        }
        self.reading = false;

        let chunk = match read.result {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Read failed on voice {:?}: {}", self.voice, e);
                self.exhausted = true;
                return SchedulerSignal::Failed(e);
            }
        };

        // An empty chunk still goes out so the end is reported by the graph
        let last = chunk.end_of_track || chunk.is_empty();
        let buffer = self.make_buffer(chunk);
        if last {
            self.exhausted = true;
        } else {
            self.parked = Some(read.reader);
        }

        if let Err(e) = self.schedule(graph, buffer) {
            return SchedulerSignal::Failed(e);
        }
        self.read_ahead(reads);
        SchedulerSignal::Continue
    }

    /// Handle a completion reported by the render thread
    pub fn on_buffer_completed(
        &mut self,
        reads: &UnboundedSender<ChunkRead>,
        generation: u64,
        chunk_index: u64,
        is_last: bool,
    ) -> SchedulerSignal {
        if generation != self.generation {
            trace!(
                "Ignoring stale completion of chunk {} on voice {:?} (generation {}, current {})",
                chunk_index,
                self.voice,
                generation,
                self.generation
            );
            return SchedulerSignal::Continue;
        }
        match self.queued.iter().position(|&index| index == chunk_index) {
            Some(0) => {
                self.queued.pop_front();
            }
            Some(at) => {
                warn!(
                    "Voice {:?} completed chunk {} ahead of chunk {:?}",
                    self.voice,
                    chunk_index,
                    self.queued.front()
                );
                self.queued.drain(..=at);
            }
            None => warn!(
                "Voice {:?} completed chunk {} which was not queued",
                self.voice, chunk_index
            ),
        }

        if is_last {
            debug!("Voice {:?} generation {} drained", self.voice, generation);
            self.drained = true;
            return SchedulerSignal::Drained;
        }

        if self.queued.is_empty() && !self.exhausted {
            trace!("Voice {:?} waiting on chunk {}", self.voice, self.next_chunk_index);
        }
        self.read_ahead(reads);
        SchedulerSignal::Continue
    }

    fn make_buffer(&mut self, chunk: PcmChunk) -> ScheduledBuffer {
        let buffer = ScheduledBuffer {
            generation: self.generation,
            chunk_index: self.next_chunk_index,
            is_last: chunk.end_of_track || chunk.is_empty(),
            samples: chunk.samples,
        };
        self.next_chunk_index += 1;
        buffer
    }

    fn schedule(&mut self, graph: &impl GraphSink, buffer: ScheduledBuffer) -> Result<()> {
        self.queued.push_back(buffer.chunk_index);
        graph.send(GraphCommand::Schedule {
            voice: self.voice,
            buffer,
        })
    }

    fn read_ahead(&mut self, reads: &UnboundedSender<ChunkRead>) {
        if self.exhausted || self.reading || self.queued.len() >= MAX_QUEUED {
            return;
        }
        if let Some(reader) = self.parked.take() {
            self.request_read(reads, reader);
        }
    }

    fn request_read(&mut self, reads: &UnboundedSender<ChunkRead>, mut reader: Box<TrackReader>) {
        self.reading = true;
        let voice = self.voice;
        let generation = self.generation;
        let frames = self.chunk_frames;
        let fail = std::mem::take(&mut self.fail_next_read);
        let reads = reads.clone();

        tokio::task::spawn_blocking(move || {
            let result = if fail {
                Err(Error::decode(&reader.info().identity, "Read failure requested by test"))
            } else {
                reader.read_chunk(frames)
            };
            let _ = reads.send(ChunkRead {
                voice,
                generation,
                reader,
                result,
            });
        });
    }
}
