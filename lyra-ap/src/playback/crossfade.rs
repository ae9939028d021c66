//! Crossfade manager
//!
//! Near the end of a track the next queue entry is opened on the idle voice
//! and its first chunk scheduled, stopped, at gain 0. When the remaining
//! time drops to the fade length the shadow voice starts, the gains ramp in
//! opposite directions, and the roles swap. Once the ramp has run the old
//! voice is stopped and its schedule cancelled.

use super::session::PlaybackSession;
use crate::audio::TrackInfo;
use crate::config::{clamp_crossfade, CrossfadeConfig};
use crate::graph::VoiceId;
use lyra_common::{FadeCurve, MediaFile};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Seconds of playback before a fade begins at which the next track is opened
pub const PREPARE_LEAD_SECS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossfadeSettings {
    pub enabled: bool,
    /// Seconds, always within [0.5, 5.0]
    pub duration: f64,
    pub curve: FadeCurve,
}

impl From<&CrossfadeConfig> for CrossfadeSettings {
    fn from(config: &CrossfadeConfig) -> Self {
        Self {
            enabled: config.enabled,
            duration: config.clamped_duration(),
            curve: config.curve,
        }
    }
}

/// The next track, scheduled on the shadow voice and waiting to start
#[derive(Debug, Clone)]
pub struct PreparedTrack {
    pub file: MediaFile,
    pub track: Arc<TrackInfo>,
    pub voice: VoiceId,
}

/// A fade in progress
#[derive(Debug)]
pub struct ActiveCrossfade {
    /// The session being faded out
    pub outgoing: PlaybackSession,
    pub deadline: Instant,
}

#[derive(Debug)]
pub struct CrossfadeManager {
    settings: CrossfadeSettings,
    prepared: Option<PreparedTrack>,
    active: Option<ActiveCrossfade>,
    /// Session a preparation was already attempted for
    attempted: Option<Uuid>,
}

impl CrossfadeManager {
    pub fn new(settings: CrossfadeSettings) -> Self {
        Self {
            settings,
            prepared: None,
            active: None,
            attempted: None,
        }
    }

    pub fn settings(&self) -> CrossfadeSettings {
        self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn configure(&mut self, enabled: bool, duration: f64) {
        self.settings.enabled = enabled;
        self.settings.duration = clamp_crossfade(duration);
    }

    /// Fade length in output frames
    pub fn fade_frames(&self, output_rate: u32) -> usize {
        (self.settings.duration * output_rate as f64).round() as usize
    }

    /// Time to open the next track for `session`
    pub fn should_prepare(&self, session: &PlaybackSession, remaining: f64) -> bool {
        self.settings.enabled
            && self.prepared.is_none()
            && self.active.is_none()
            && self.attempted != Some(session.id)
            && remaining <= (self.settings.duration + PREPARE_LEAD_SECS) * session.speed
    }

    pub fn mark_attempted(&mut self, session_id: Uuid) {
        self.attempted = Some(session_id);
    }

    /// Time to start fading: remaining track time covers the fade at `speed`
    pub fn should_start(&self, remaining: f64, speed: f64) -> bool {
        self.settings.enabled
            && self.prepared.is_some()
            && self.active.is_none()
            && remaining <= self.settings.duration * speed
    }

    pub fn set_prepared(&mut self, prepared: PreparedTrack) {
        self.prepared = Some(prepared);
    }

    pub fn prepared(&self) -> Option<&PreparedTrack> {
        self.prepared.as_ref()
    }

    pub fn take_prepared(&mut self) -> Option<PreparedTrack> {
        self.prepared.take()
    }

    pub fn begin(&mut self, outgoing: PlaybackSession, now: Instant) {
        let deadline = now + Duration::from_secs_f64(self.settings.duration);
        self.active = Some(ActiveCrossfade { outgoing, deadline });
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Voice currently fading out
    pub fn outgoing_voice(&self) -> Option<VoiceId> {
        self.active.as_ref().map(|a| a.outgoing.voice)
    }

    /// Take the fade if its ramp has run
    pub fn finish_due(&mut self, now: Instant) -> Option<ActiveCrossfade> {
        match &self.active {
            Some(active) if now >= active.deadline => self.active.take(),
            _ => None,
        }
    }

    /// Drop the running fade and anything prepared
    pub fn abort(&mut self) -> (Option<ActiveCrossfade>, Option<PreparedTrack>) {
        (self.active.take(), self.prepared.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyra_common::TrackIdentity;

    fn session(speed: f64) -> PlaybackSession {
        let track = Arc::new(TrackInfo {
            identity: TrackIdentity("a".into()),
            path: "/music/a.ogg".into(),
            sample_rate: 48_000,
            channels: 2,
            total_frames: 48_000 * 120,
            codec: "vorbis".into(),
        });
        let file = MediaFile {
            name: "a.ogg".into(),
            path: track.path.clone(),
            size: 1,
            modification_date: None,
            is_directory: false,
            file_extension: "ogg".into(),
            identifier: None,
        };
        PlaybackSession::new(file, track, VoiceId::A, speed, 1.0)
    }

    fn prepared(s: &PlaybackSession) -> PreparedTrack {
        PreparedTrack {
            file: s.file.clone(),
            track: s.track.clone(),
            voice: VoiceId::B,
        }
    }

    fn manager() -> CrossfadeManager {
        CrossfadeManager::new(CrossfadeSettings {
            enabled: true,
            duration: 2.0,
            curve: FadeCurve::EqualPower,
        })
    }

    #[test]
    fn test_duration_is_clamped() {
        let mut m = manager();
        m.configure(true, 9.0);
        assert_eq!(m.settings().duration, 5.0);
        m.configure(true, 0.1);
        assert_eq!(m.settings().duration, 0.5);
        assert_eq!(m.fade_frames(48_000), 24_000);
    }

    #[test]
    fn test_prepare_and_start_windows_scale_with_speed() {
        let mut m = manager();
        let s = session(2.0);
        assert!(!m.should_prepare(&s, 14.1));
        assert!(m.should_prepare(&s, 14.0));

        m.mark_attempted(s.id);
        assert!(!m.should_prepare(&s, 10.0));

        assert!(!m.should_start(3.0, 2.0), "nothing prepared");
        m.set_prepared(prepared(&s));
        assert!(!m.should_start(4.1, 2.0));
        assert!(m.should_start(4.0, 2.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_after_deadline() {
        let mut m = manager();
        let s = session(1.0);
        m.set_prepared(prepared(&s));
        m.take_prepared();
        m.begin(s, Instant::now());
        assert_eq!(m.outgoing_voice(), Some(VoiceId::A));

        tokio::time::advance(Duration::from_millis(1999)).await;
        assert!(m.finish_due(Instant::now()).is_none());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(m.finish_due(Instant::now()).is_some());
        assert!(!m.is_active());
    }

    #[test]
    fn test_disabled_never_engages() {
        let mut m = manager();
        m.configure(false, 2.0);
        let s = session(1.0);
        assert!(!m.should_prepare(&s, 1.0));
        m.set_prepared(prepared(&s));
        assert!(!m.should_start(0.5, 1.0));
    }
}
