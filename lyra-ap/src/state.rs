//! Published player state
//!
//! The engine publishes a `PlayerSnapshot` through a watch channel after
//! every command and display tick, and discrete `PlayerEvent`s through the
//! `EventBus`. Observers never see engine internals.

use lyra_common::events::{EventBus, PlayerEvent, PlayerState};
use lyra_common::MediaFile;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// Observable player fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub player_state: PlayerState,
    /// Seconds into the current track
    pub current_time: f64,
    /// Seconds; 0.0 when nothing is loaded
    pub duration: f64,
    pub speed: f64,
    /// Pitch ratio, 1.0 = no shift
    pub pitch: f64,
    pub volume: f32,
    pub current_file: Option<MediaFile>,
    pub session_id: Option<Uuid>,
    pub crossfade_enabled: bool,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            player_state: PlayerState::Stopped,
            current_time: 0.0,
            duration: 0.0,
            speed: 1.0,
            pitch: 1.0,
            volume: 1.0,
            current_file: None,
            session_id: None,
            crossfade_enabled: false,
        }
    }
}

/// Publishing side shared by the engine
#[derive(Clone)]
pub struct SharedState {
    snapshot: watch::Sender<PlayerSnapshot>,
    events: EventBus,
}

impl SharedState {
    pub fn new(event_capacity: usize) -> Self {
        let (snapshot, _) = watch::channel(PlayerSnapshot::default());
        Self {
            snapshot,
            events: EventBus::new(event_capacity),
        }
    }

    /// Replace the snapshot, waking observers only on change
    pub fn publish(&self, next: PlayerSnapshot) {
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    pub fn current(&self) -> PlayerSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PlayerSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: PlayerEvent) {
        self.events.emit_lossy(event);
    }
}
