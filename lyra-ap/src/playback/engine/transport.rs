//! Transport commands
//!
//! load, play, pause, stop, seek and the live speed/pitch/volume controls.
//! Every method runs on the engine task, so they never interleave.

use super::core::EngineCore;
use crate::audio::{probe, TrackInfo};
use crate::error::{Error, Result};
use crate::graph::{GraphCommand, VoiceId};
use crate::playback::scheduler::ScheduleStart;
use crate::playback::seek::SeekController;
use crate::playback::session::PlaybackSession;
use lyra_common::events::{PlayerEvent, PlayerState, TrackEndReason};
use lyra_common::time::seconds_to_frames;
use lyra_common::{MediaFile, PlaybackPositionRecord};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const MIN_SPEED: f64 = 0.5;
pub const MAX_SPEED: f64 = 3.0;
pub const MIN_PITCH: f64 = 0.5;
pub const MAX_PITCH: f64 = 1.5;

/// Clamp a speed factor to [0.5, 3.0]; non-numbers reset to 1.0
pub fn clamp_speed(speed: f64) -> f64 {
    if speed.is_nan() {
        return 1.0;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

/// Clamp a pitch ratio to [0.5, 1.5]; non-numbers reset to 1.0
pub fn clamp_pitch(ratio: f64) -> f64 {
    if ratio.is_nan() {
        return 1.0;
    }
    ratio.clamp(MIN_PITCH, MAX_PITCH)
}

/// Pitch ratio to the semitone offset applied by the pitch node
pub fn ratio_to_semitones(ratio: f64) -> f64 {
    (ratio - 1.0) * 12.0
}

fn no_track() -> Error {
    Error::InvalidState("No track loaded".into())
}

/// Probe on the blocking pool
pub(super) async fn probe_file(file: &MediaFile) -> Result<TrackInfo> {
    let file = file.clone();
    tokio::task::spawn_blocking(move || probe(&file))
        .await
        .map_err(|e| Error::Internal(format!("Probe task failed: {}", e)))?
}

impl EngineCore {
    fn session_mut(&mut self) -> Result<&mut PlaybackSession> {
        self.session.as_mut().ok_or_else(no_track)
    }

    /// Stop the current session's audio and freeze its clock
    ///
    /// Returns the frozen position.
    fn halt(&mut self) -> Option<f64> {
        let now = Instant::now();
        let session = self.session.as_mut()?;
        session.freeze(now);
        let (voice, position) = (session.voice, session.current_time(now));
        self.silence_voice(voice);
        Some(position)
    }

    async fn save_current(&self, position: f64) {
        if let Some(session) = self.session.as_ref().filter(|s| !s.ended) {
            self.persistence.save_quietly(session, position).await;
        }
    }

    /// Retire the current session: save, silence and report it as ended
    pub(super) async fn end_current(&mut self, reason: TrackEndReason) {
        self.abort_crossfade();
        let Some(position) = self.halt() else {
            return;
        };
        self.save_current(position).await;

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.ended {
            return;
        }
        session.ended = true;
        let event = PlayerEvent::TrackEnded {
            session_id: session.id,
            identity: session.identity().clone(),
            reason,
            timestamp: lyra_common::time::now(),
        };
        debug!("Track {} ended ({:?})", session.identity(), reason);
        self.state.emit(event);
    }

    pub(super) async fn load(&mut self, file: MediaFile) -> Result<Option<PlaybackPositionRecord>> {
        info!("Loading {}", file.path.display());
        self.pending_next = None;
        self.end_current(TrackEndReason::Skipped).await;

        let identity = file.identity();
        if !file.is_playable() {
            let error = Error::decode(&identity, format!("{} is not a playable audio file", file.name));
            self.fail(&error, Some(identity));
            return Err(error);
        }

        let track = match probe_file(&file).await {
            Ok(track) => Arc::new(track),
            Err(e) => {
                self.fail(&e, Some(identity));
                return Err(e);
            }
        };

        let voice = self.session.as_ref().map_or(VoiceId::A, |s| s.voice);
        self.send(GraphCommand::ConfigureVoice {
            voice,
            input_rate: track.sample_rate,
        });
        self.send(GraphCommand::SetGain { voice, gain: 1.0 });

        let mut session = PlaybackSession::new(file, track, voice, self.speed, self.pitch);
        session.state = self.player_state();
        let (session_id, file_name) = (session.id, session.file.name.clone());
        let (duration, sample_rate) = (session.duration(), session.track.sample_rate);
        self.session = Some(session);
        self.tracker.reset();

        let record = self.persistence.load(&identity).await;
        info!(
            "Loaded {} ({:.1}s, {} Hz){}",
            file_name,
            duration,
            sample_rate,
            if record.is_some() { ", resume point available" } else { "" }
        );
        self.state.emit(PlayerEvent::TrackLoaded {
            session_id,
            identity,
            file_name,
            duration,
            sample_rate,
            resume_available: record.is_some(),
            timestamp: lyra_common::time::now(),
        });
        self.set_state(PlayerState::Paused);
        Ok(record)
    }

    pub(super) async fn play(&mut self) -> Result<()> {
        match self.session.as_ref().map(|s| &s.state) {
            None => return Err(no_track()),
            Some(PlayerState::Playing) => return Ok(()),
            Some(PlayerState::Error(message)) => {
                return Err(Error::InvalidState(format!(
                    "Cannot play after an error ({}); load a track",
                    message
                )))
            }
            Some(_) => {}
        }
        self.ensure_running()?;

        let session = self.session_mut()?;
        let position = session.current_time(Instant::now());
        session.set_position(position);
        let (voice, track) = (session.voice, session.track.clone());
        let start_frame = seconds_to_frames(position, track.sample_rate);
        let first_chunk = self.config.start_chunk_frames(track.sample_rate);

        self.set_state(PlayerState::Buffering);
        let started = self.schedulers[voice.index()]
            .start(&self.graph, &self.reads_tx, track, start_frame, first_chunk)
            .await;
        match started {
            Ok(ScheduleStart::Started) => {}
            Ok(ScheduleStart::AtEnd) => debug!("Play requested at the end of the track"),
            Err(e) => {
                self.fail(&e, None);
                return Err(e);
            }
        }

        self.send(GraphCommand::SetGain { voice, gain: 1.0 });
        self.send(GraphCommand::SetRunning {
            voice,
            running: true,
        });
        self.session_mut()?.start_clock(Instant::now());
        self.set_state(PlayerState::Playing);
        self.reset_persist_timer = true;
        Ok(())
    }

    pub(super) async fn pause(&mut self) -> Result<()> {
        if self.session.is_none() {
            return Err(no_track());
        }
        if !self.player_state().is_playing() {
            return Ok(());
        }
        self.abort_crossfade();
        if let Some(position) = self.halt() {
            self.set_state(PlayerState::Paused);
            self.save_current(position).await;
        }
        Ok(())
    }

    /// Stop playback, keep the track loaded and rewind it
    pub(super) async fn stop(&mut self) -> Result<()> {
        if self.session.is_none() {
            self.set_state(PlayerState::Stopped);
            return Ok(());
        }
        self.abort_crossfade();
        if let Some(position) = self.halt() {
            self.save_current(position).await;
        }
        let session = self.session_mut()?;
        session.set_position(0.0);
        session.ended = false;
        self.tracker.reset();
        self.set_state(PlayerState::Stopped);
        Ok(())
    }

    pub(super) async fn seek(&mut self, target: f64) -> Result<f64> {
        match self.session.as_ref().map(|s| &s.state) {
            None => return Err(no_track()),
            Some(PlayerState::Error(message)) => {
                return Err(Error::InvalidState(format!("Cannot seek after an error ({})", message)))
            }
            Some(_) => {}
        }
        self.abort_crossfade();
        self.ensure_running()?;

        let request = SeekController::request(self.session_mut()?, target, Instant::now())?;
        let session = self.session_mut()?;
        let (voice, track) = (session.voice, session.track.clone());
        self.silence_voice(voice);
        SeekController::begin_reload(self.session_mut()?)?;

        let resumed = if request.was_playing {
            let first_chunk = self.config.start_chunk_frames(track.sample_rate);
            let started = self.schedulers[voice.index()]
                .start(&self.graph, &self.reads_tx, track, request.target_frame, first_chunk)
                .await;
            if let Err(e) = started {
                SeekController::fail(self.session_mut()?, &request);
                self.fail(&e, None);
                return Err(e);
            }
            self.send(GraphCommand::SetRunning {
                voice,
                running: true,
            });
            true
        } else {
            false
        };

        let session = self.session_mut()?;
        SeekController::complete(session, &request, resumed, Instant::now())?;
        if request.target < session.duration() {
            session.ended = false;
        }
        let (session_id, identity) = (session.id, session.identity().clone());
        self.tracker.reset();

        if request.target == 0.0 {
            self.persistence.clear_quietly(&identity).await;
        }
        debug!("Seek landed at {:.3}s", request.target);
        self.state.emit(PlayerEvent::SeekCompleted {
            session_id,
            position: request.target,
            timestamp: lyra_common::time::now(),
        });
        Ok(request.target)
    }

    pub(super) async fn seek_relative(&mut self, delta: f64) -> Result<f64> {
        let current = self
            .session
            .as_ref()
            .ok_or_else(no_track)?
            .current_time(Instant::now());
        self.seek(current + delta).await
    }

    /// Takes effect immediately, including for audio already scheduled
    pub(super) fn set_speed(&mut self, speed: f64) -> Result<f64> {
        let speed = clamp_speed(speed);
        if let Some(session) = self.session.as_mut() {
            session.rebase(Instant::now());
            session.speed = speed;
        }
        self.speed = speed;
        self.send(GraphCommand::SetSpeed(speed));
        debug!("Speed set to {:.2}x", speed);
        Ok(speed)
    }

    pub(super) fn set_pitch(&mut self, ratio: f64) -> Result<f64> {
        let ratio = clamp_pitch(ratio);
        if let Some(session) = self.session.as_mut() {
            session.pitch = ratio;
        }
        self.pitch = ratio;
        let semitones = ratio_to_semitones(ratio);
        self.send(GraphCommand::SetPitch(semitones));
        debug!("Pitch set to {:.3} ({:+.2} semitones)", ratio, semitones);
        Ok(ratio)
    }

    pub(super) fn set_volume(&mut self, volume: f32) -> Result<f32> {
        let volume = if volume.is_nan() { 1.0 } else { volume.clamp(0.0, 1.0) };
        self.volume = volume;
        self.send(GraphCommand::SetVolume(volume));
        Ok(volume)
    }

    /// Seek to a stored resume point, restoring its speed and pitch
    pub(super) async fn resume_from(&mut self, record: PlaybackPositionRecord) -> Result<()> {
        let session = self.session.as_ref().ok_or_else(no_track)?;
        if session.identity() != &record.file_identity {
            return Err(Error::InvalidState(format!(
                "Resume point is for {}, loaded track is {}",
                record.file_identity,
                session.identity()
            )));
        }
        if let Some(speed) = record.speed {
            self.set_speed(speed)?;
        }
        if let Some(pitch) = record.pitch {
            self.set_pitch(pitch)?;
        }
        let position = self.seek(record.position).await?;
        info!("Resumed {} at {:.1}s", record.file_name, position);
        Ok(())
    }

    pub(super) async fn unload(&mut self) -> Result<()> {
        self.end_current(TrackEndReason::Skipped).await;
        let last_state = self.player_state();
        if let Some(session) = self.session.take() {
            info!("Unloaded {}", session.file.name);
        }
        self.idle_state = last_state;
        self.pending_next = None;
        self.tracker.reset();
        self.set_state(PlayerState::Stopped);
        Ok(())
    }

    pub(super) fn set_crossfade(&mut self, enabled: bool, duration: f64) -> Result<f64> {
        self.crossfade.configure(enabled, duration);
        if !enabled {
            if let Some(prepared) = self.crossfade.take_prepared() {
                self.silence_voice(prepared.voice);
            }
        }
        let applied = self.crossfade.settings().duration;
        if duration.is_finite() && (applied - duration).abs() > f64::EPSILON {
            warn!("Crossfade duration {:.2}s clamped to {:.2}s", duration, applied);
        }
        info!(
            "Crossfade {} ({:.2}s)",
            if enabled { "enabled" } else { "disabled" },
            applied
        );
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_and_pitch_clamping() {
        assert_eq!(clamp_speed(0.1), 0.5);
        assert_eq!(clamp_speed(4.0), 3.0);
        assert_eq!(clamp_speed(f64::NAN), 1.0);
        assert_eq!(clamp_pitch(2.0), 1.5);
        assert_eq!(clamp_pitch(0.25), 0.5);
    }

    #[test]
    fn test_ratio_to_semitones() {
        assert_eq!(ratio_to_semitones(1.0), 0.0);
        assert_eq!(ratio_to_semitones(1.5), 6.0);
        assert_eq!(ratio_to_semitones(0.5), -6.0);
    }
}
