//! Seek controller
//!
//! ```text
//! Idle ──request──▶ SeekRequested ──reload──▶ Reloading ──complete──▶ Idle (Playing | Paused)
//!                         │                       │
//!                         └──────── fail ─────────┴──────────────────▶ Idle (last position, Error)
//! ```
//!
//! While a seek is pending the session clock reads its frozen value and
//! display ticks do nothing. The engine performs the actual cancel and
//! reschedule between `begin_reload` and `complete`.

use super::session::PlaybackSession;
use crate::error::{Error, Result};
use lyra_common::events::PlayerState;
use lyra_common::time::seconds_to_frames;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekPhase {
    #[default]
    Idle,
    SeekRequested,
    Reloading,
}

impl SeekPhase {
    fn can_transition_to(self, next: SeekPhase) -> bool {
        use SeekPhase::*;
        matches!(
            (self, next),
            (Idle, SeekRequested) | (SeekRequested, Reloading) | (SeekRequested, Idle) | (Reloading, Idle)
        )
    }
}

/// A seek in progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekRequest {
    /// Clamped target, seconds
    pub target: f64,
    /// `round(target × sample_rate)`
    pub target_frame: u64,
    /// Transport was running when the seek was issued
    pub was_playing: bool,
    /// Position to fall back to if the reload fails
    pub previous_time: f64,
}

/// Clamp a seek target to `[0, duration]`
pub fn clamp_target(target: f64, duration: f64) -> f64 {
    if target.is_nan() {
        return 0.0;
    }
    target.clamp(0.0, duration.max(0.0))
}

pub struct SeekController;

impl SeekController {
    /// Enter `SeekRequested` and freeze the clock
    pub fn request(session: &mut PlaybackSession, target: f64, now: Instant) -> Result<SeekRequest> {
        transition(session, SeekPhase::SeekRequested)?;

        let previous_time = session.current_time(now);
        let was_playing = session.state.is_playing();
        session.freeze(now);

        let target = clamp_target(target, session.duration());
        let target_frame =
            seconds_to_frames(target, session.track.sample_rate).min(session.track.total_frames);
        trace!(
            "Seek requested to {:.3}s (frame {}) from {:.3}s",
            target,
            target_frame,
            previous_time
        );

        Ok(SeekRequest {
            target,
            target_frame,
            was_playing,
            previous_time,
        })
    }

    /// The old schedule is cancelled and a new read cursor is being opened
    pub fn begin_reload(session: &mut PlaybackSession) -> Result<()> {
        transition(session, SeekPhase::Reloading)
    }

    /// Land on the target, running the clock again if playback resumed
    pub fn complete(session: &mut PlaybackSession, request: &SeekRequest, resumed: bool, now: Instant) -> Result<()> {
        transition(session, SeekPhase::Idle)?;
        session.set_position(request.target);
        if resumed {
            session.state = PlayerState::Playing;
            session.start_clock(now);
        } else if session.state.is_playing() || session.state == PlayerState::Buffering {
            session.state = PlayerState::Paused;
        }
        Ok(())
    }

    /// Abandon the seek, keeping the last valid position
    ///
    /// The caller moves the player to `Error`.
    pub fn fail(session: &mut PlaybackSession, request: &SeekRequest) {
        session.seek_phase = SeekPhase::Idle;
        session.set_position(request.previous_time);
    }
}

fn transition(session: &mut PlaybackSession, next: SeekPhase) -> Result<()> {
    if !session.seek_phase.can_transition_to(next) {
        return Err(Error::InvalidState(format!(
            "Seek cannot move from {:?} to {:?}",
            session.seek_phase, next
        )));
    }
    session.seek_phase = next;
    Ok(())
}
