//! Playback session: one per loaded track
//!
//! Holds the clock the position tracker reads. While playing,
//!
//! ```text
//! current_time = min(duration, seek_position + speed × (now − playback_start))
//! ```
//!
//! Otherwise the last computed value is frozen.

use super::seek::SeekPhase;
use crate::audio::TrackInfo;
use crate::graph::VoiceId;
use lyra_common::events::PlayerState;
use lyra_common::{MediaFile, TrackIdentity};
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub id: Uuid,
    pub file: MediaFile,
    pub track: Arc<TrackInfo>,
    /// Graph voice playing this track
    pub voice: VoiceId,
    /// Position the current schedule started from, seconds
    pub seek_position: f64,
    /// Set while the transport runs
    pub playback_start: Option<Instant>,
    pub speed: f64,
    /// Pitch ratio, 1.0 = no shift
    pub pitch: f64,
    pub state: PlayerState,
    pub seek_phase: SeekPhase,
    frozen_time: f64,
    /// Track-ended has been reported for this session
    pub ended: bool,
}

impl PlaybackSession {
    pub fn new(file: MediaFile, track: Arc<TrackInfo>, voice: VoiceId, speed: f64, pitch: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            file,
            track,
            voice,
            seek_position: 0.0,
            playback_start: None,
            speed,
            pitch,
            state: PlayerState::Stopped,
            seek_phase: SeekPhase::Idle,
            frozen_time: 0.0,
            ended: false,
        }
    }

    pub fn identity(&self) -> &TrackIdentity {
        &self.track.identity
    }

    pub fn duration(&self) -> f64 {
        self.track.duration()
    }

    pub fn is_seek_pending(&self) -> bool {
        self.seek_phase != SeekPhase::Idle
    }

    /// Current position in seconds
    pub fn current_time(&self, now: Instant) -> f64 {
        match self.playback_start {
            Some(start) if self.state.is_playing() && !self.is_seek_pending() => {
                let elapsed = now.saturating_duration_since(start).as_secs_f64();
                (self.seek_position + self.speed * elapsed).min(self.duration())
            }
            _ => self.frozen_time,
        }
    }

    pub fn remaining(&self, now: Instant) -> f64 {
        (self.duration() - self.current_time(now)).max(0.0)
    }

    /// Start the clock from `seek_position`
    pub fn start_clock(&mut self, now: Instant) {
        self.frozen_time = self.seek_position;
        self.playback_start = Some(now);
    }

    /// Stop the clock, keeping the current position
    pub fn freeze(&mut self, now: Instant) {
        let current = self.current_time(now);
        self.seek_position = current;
        self.frozen_time = current;
        self.playback_start = None;
    }

    /// Restart the clock at the current position, for a speed change
    pub fn rebase(&mut self, now: Instant) {
        if self.playback_start.is_some() {
            let current = self.current_time(now);
            self.seek_position = current;
            self.frozen_time = current;
            self.playback_start = Some(now);
        }
    }

    /// Move to `seconds` with the clock stopped
    pub fn set_position(&mut self, seconds: f64) {
        self.seek_position = seconds;
        self.frozen_time = seconds;
        self.playback_start = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn session(duration_secs: u64) -> PlaybackSession {
        let track = Arc::new(TrackInfo {
            identity: TrackIdentity("track".into()),
            path: PathBuf::from("/music/track.wav"),
            sample_rate: 8000,
            channels: 1,
            total_frames: duration_secs * 8000,
            codec: "pcm_s16le".into(),
        });
        let file = MediaFile {
            name: "track.wav".into(),
            path: track.path.clone(),
            size: 1,
            modification_date: None,
            is_directory: false,
            file_extension: "wav".into(),
            identifier: None,
        };
        PlaybackSession::new(file, track, VoiceId::A, 1.0, 1.0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_speed_and_freezes() {
        let mut s = session(180);
        let start = Instant::now();
        s.state = PlayerState::Playing;
        s.start_clock(start);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(s.current_time(Instant::now()), 5.0);

        s.rebase(Instant::now());
        s.speed = 2.0;
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(s.current_time(Instant::now()), 15.0);

        s.freeze(Instant::now());
        s.state = PlayerState::Paused;
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(s.current_time(Instant::now()), 15.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_is_capped_at_duration() {
        let mut s = session(3);
        s.state = PlayerState::Playing;
        s.set_position(2.9);
        s.start_clock(Instant::now());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(s.current_time(Instant::now()), 3.0);
        assert_eq!(s.remaining(Instant::now()), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_pending_freezes_reading() {
        let mut s = session(180);
        s.state = PlayerState::Playing;
        s.set_position(10.0);
        s.start_clock(Instant::now());
        s.seek_phase = SeekPhase::Reloading;

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(s.current_time(Instant::now()), 10.0);
    }
}
