//! Position tracker
//!
//! Driven by the display tick. Each tick recomputes the position from the
//! session clock instead of accumulating deltas, throttles progress events
//! to one per second, and reports the end of the track exactly once per
//! session.

use super::session::PlaybackSession;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Minimum spacing of progress events
pub const PROGRESS_EVENT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Nothing to report: not playing, or a seek is pending
    Idle,
    Progress {
        position: f64,
        /// A progress event is due
        emit: bool,
    },
    /// The clock reached the duration; reported once per session
    Ended { position: f64 },
}

#[derive(Debug, Default)]
pub struct PositionTracker {
    last_emit: Option<Instant>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the throttle state, e.g. after a load or seek
    pub fn reset(&mut self) {
        self.last_emit = None;
    }

    pub fn tick(&mut self, session: &mut PlaybackSession, now: Instant) -> Tick {
        if !session.state.is_playing() || session.playback_start.is_none() {
            return Tick::Idle;
        }
        if session.is_seek_pending() {
            trace!("Tick skipped, seek pending");
            return Tick::Idle;
        }

        let position = session.current_time(now);
        if position >= session.duration() {
            if session.ended {
                return Tick::Idle;
            }
            session.ended = true;
            debug!("Track {} reached its end at {:.3}s", session.identity(), position);
            return Tick::Ended { position };
        }

        let emit = self
            .last_emit
            .map_or(true, |last| now.saturating_duration_since(last) >= PROGRESS_EVENT_INTERVAL);
        if emit {
            self.last_emit = Some(now);
        }
        Tick::Progress { position, emit }
    }
}
