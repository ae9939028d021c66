//! Engine harness for integration tests

use super::audio_generator::generate_sine_wav;
use lyra_ap::config::OutputBackend;
use lyra_ap::{Config, PlaybackEngine};
use lyra_common::events::PlayerEvent;
use lyra_common::{ListQueue, MediaFile, MemoryPositionStore, PlaybackMode, PlaybackQueue};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// List queue that records every call the engine makes
pub struct CountingQueue {
    inner: ListQueue,
    advances: AtomicUsize,
    previous_calls: AtomicUsize,
}

impl CountingQueue {
    pub fn new(files: Vec<MediaFile>) -> Self {
        Self {
            inner: ListQueue::new(files, PlaybackMode::Normal),
            advances: AtomicUsize::new(0),
            previous_calls: AtomicUsize::new(0),
        }
    }

    pub fn advances(&self) -> usize {
        self.advances.load(Ordering::SeqCst)
    }

    pub fn previous_calls(&self) -> usize {
        self.previous_calls.load(Ordering::SeqCst)
    }
}

impl PlaybackQueue for CountingQueue {
    fn advance_to_next(&self) -> Option<MediaFile> {
        self.advances.fetch_add(1, Ordering::SeqCst);
        self.inner.advance_to_next()
    }

    fn go_to_previous(&self) -> Option<MediaFile> {
        self.previous_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.go_to_previous()
    }

    fn peek_next(&self) -> Option<MediaFile> {
        self.inner.peek_next()
    }
}

/// Engine on the null output with small chunks
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.output.backend = OutputBackend::Null;
    config.output.sample_rate = 8000;
    config.output.ring_capacity = 1024;
    config.engine.chunk_frames = 8000;
    config.engine.start_chunk_secs = 0.5;
    config
}

pub struct TestPlayer {
    pub engine: PlaybackEngine,
    pub store: Arc<MemoryPositionStore>,
    pub queue: Arc<CountingQueue>,
    pub events: broadcast::Receiver<PlayerEvent>,
    pub dir: TempDir,
}

impl TestPlayer {
    /// Engine whose queue holds `queued` (name, seconds) fixtures
    pub fn start(queued: &[(&str, f64)]) -> Self {
        Self::start_with(test_config(), queued)
    }

    pub fn start_with(config: Config, queued: &[(&str, f64)]) -> Self {
        let dir = TempDir::new().unwrap();
        let files = queued
            .iter()
            .map(|(name, seconds)| fixture(&dir, name, *seconds))
            .collect();

        let store = Arc::new(MemoryPositionStore::new());
        let queue = Arc::new(CountingQueue::new(files));
        let engine = PlaybackEngine::start(&config, store.clone(), queue.clone()).unwrap();
        let events = engine.subscribe_events();

        Self {
            engine,
            store,
            queue,
            events,
            dir,
        }
    }

    /// Write a fixture outside the queue
    pub fn wav(&self, name: &str, seconds: f64) -> MediaFile {
        fixture(&self.dir, name, seconds)
    }

    pub async fn current_time(&self) -> f64 {
        self.engine.snapshot().await.unwrap().current_time
    }

    /// Events received so far
    pub fn take_events(&mut self) -> Vec<PlayerEvent> {
        drain_events(&mut self.events)
    }
}

fn fixture(dir: &TempDir, name: &str, seconds: f64) -> MediaFile {
    let path = dir.path().join(name);
    generate_sine_wav(&path, seconds, 440.0).unwrap();
    MediaFile::from_path(&path).unwrap()
}

pub fn drain_events(rx: &mut broadcast::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
