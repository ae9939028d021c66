//! Event types for the Lyra event system
//!
//! Provides the player event definitions and the EventBus used to publish
//! them to observers (UI layer, persistence, logging).

mod playback_types;

pub use playback_types::{PlayerState, TrackEndReason};

use crate::media::TrackIdentity;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Player event types
///
/// Events are broadcast via EventBus and are serializable so an outer
/// surface can forward them unchanged. Every event carries the session id of
/// the load that produced it, so observers can drop events from a track that
/// has since been replaced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Transport state changed
    StateChanged {
        session_id: Option<Uuid>,
        old_state: PlayerState,
        new_state: PlayerState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track was opened and is ready to play
    TrackLoaded {
        session_id: Uuid,
        identity: TrackIdentity,
        file_name: String,
        duration: f64,
        sample_rate: u32,
        /// Whether a resumable position exists for this track
        resume_available: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback progress, emitted at most once per second while playing
    PositionChanged {
        session_id: Uuid,
        position: f64,
        duration: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A seek finished and the position is now `position`
    SeekCompleted {
        session_id: Uuid,
        position: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The current track stopped being current
    ///
    /// Fired exactly once per track.
    TrackEnded {
        session_id: Uuid,
        identity: TrackIdentity,
        reason: TrackEndReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A crossfade into the next track began
    CrossfadeStarted {
        outgoing_session_id: Uuid,
        incoming_session_id: Uuid,
        duration: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The outgoing voice of a crossfade has been stopped and detached
    CrossfadeCompleted {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A playback position was written to the store
    PositionSaved {
        identity: TrackIdentity,
        position: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The stored playback position for a track was removed
    PositionCleared {
        identity: TrackIdentity,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A fatal condition for the current track
    Error {
        session_id: Option<Uuid>,
        identity: Option<TrackIdentity>,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block the engine)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use lyra_common::events::{EventBus, PlayerEvent, PlayerState};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(PlayerEvent::StateChanged {
///     session_id: None,
///     old_state: PlayerState::Stopped,
///     new_state: PlayerState::Playing,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        if let Err(e) = self.tx.send(event) {
            trace!("No subscribers for event: {:?}", e.0);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_event() -> PlayerEvent {
        PlayerEvent::StateChanged {
            session_id: None,
            old_state: PlayerState::Paused,
            new_state: PlayerState::Playing,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);

        let _rx = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(state_event()).is_err());
        // Lossy variant must not panic
        bus.emit_lossy(state_event());
    }

    #[tokio::test]
    async fn test_emit_with_subscriber() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        assert_eq!(bus.emit(state_event()).unwrap(), 1);

        match rx.recv().await.unwrap() {
            PlayerEvent::StateChanged { old_state, new_state, .. } => {
                assert_eq!(old_state, PlayerState::Paused);
                assert_eq!(new_state, PlayerState::Playing);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = PlayerEvent::PositionCleared {
            identity: TrackIdentity("abc".to_string()),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PositionCleared");
        assert_eq!(json["identity"], "abc");
    }
}
