//! Queue-driven transitions
//!
//! **Responsibilities:**
//! - Explicit next/previous
//! - Natural track completion: report once, clear the resume point, advance
//! - Crossfade into the next track: prepare the shadow voice, start and
//!   finish the fade

use super::core::EngineCore;
use super::transport::probe_file;
use crate::error::Result;
use crate::graph::GraphCommand;
use crate::playback::crossfade::PreparedTrack;
use crate::playback::scheduler::ScheduleStart;
use crate::playback::session::PlaybackSession;
use lyra_common::events::{PlayerEvent, PlayerState, TrackEndReason};
use lyra_common::MediaFile;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

impl EngineCore {
    /// The queue entry to play next, advancing the queue at most once
    fn take_next(&mut self) -> Option<MediaFile> {
        self.pending_next
            .take()
            .or_else(|| self.queue.advance_to_next())
    }

    async fn load_and_continue(&mut self, file: MediaFile, play: bool) -> Result<()> {
        self.load(file).await?;
        if play {
            self.play().await?;
        }
        Ok(())
    }

    pub(super) async fn next(&mut self) -> Result<bool> {
        let was_playing = self.player_state().is_playing();
        let Some(file) = self.take_next() else {
            info!("Already at the end of the queue");
            return Ok(false);
        };
        info!("Skipping to {}", file.name);
        self.load_and_continue(file, was_playing).await?;
        Ok(true)
    }

    /// Restart when past the threshold, otherwise go to the previous entry
    pub(super) async fn previous(&mut self) -> Result<bool> {
        let was_playing = self.player_state().is_playing();
        let restartable = self
            .session
            .as_ref()
            .filter(|s| !s.state.is_error())
            .map(|s| s.current_time(Instant::now()));

        if let Some(position) = restartable {
            if position > self.config.restart_threshold_secs {
                debug!("Restarting current track from {:.1}s", position);
                self.seek(0.0).await?;
                return Ok(true);
            }
        }

        match self.queue.go_to_previous() {
            Some(file) => {
                info!("Going back to {}", file.name);
                self.load_and_continue(file, was_playing).await?;
                Ok(true)
            }
            None if restartable.is_some() => {
                self.seek(0.0).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The tracker saw the clock reach the end of the current track
    pub(super) async fn handle_track_end(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let (session_id, identity, voice) = (session.id, session.identity().clone(), session.voice);
        info!("Track {} completed", session.file.name);

        self.state.emit(PlayerEvent::TrackEnded {
            session_id,
            identity: identity.clone(),
            reason: TrackEndReason::Completed,
            timestamp: lyra_common::time::now(),
        });
        self.persistence.clear_quietly(&identity).await;
        self.abort_crossfade();
        self.silence_voice(voice);

        match self.take_next() {
            Some(file) => {
                info!("Advancing to {}", file.name);
                if let Err(e) = self.load_and_continue(file, true).await {
                    warn!("Could not continue with the next track: {}", e);
                }
            }
            None => {
                info!("Queue finished");
                if let Some(session) = self.session.as_mut() {
                    session.set_position(0.0);
                    session.ended = false;
                }
                self.tracker.reset();
                self.set_state(PlayerState::Stopped);
            }
        }
    }

    /// Prepare or start a crossfade as the current track nears its end
    pub(super) async fn check_crossfade(&mut self, position: f64) {
        if !self.crossfade.is_enabled() {
            return;
        }
        let Some(session) = self.session.as_ref().filter(|s| !s.is_seek_pending()) else {
            return;
        };
        let remaining = (session.duration() - position).max(0.0);
        let speed = session.speed;

        if self.crossfade.should_prepare(session, remaining) {
            let session_id = session.id;
            self.crossfade.mark_attempted(session_id);
            self.prepare_next().await;
        }
        if self.crossfade.should_start(remaining, speed) {
            self.start_crossfade().await;
        }
    }

    /// Open the upcoming track on the idle voice, stopped at gain 0
    async fn prepare_next(&mut self) {
        let Some(current_voice) = self.session.as_ref().map(|s| s.voice) else {
            return;
        };
        let Some(file) = self.queue.peek_next() else {
            debug!("Next track unknown, crossfade falls back to stop-then-load");
            return;
        };
        if !file.is_playable() {
            debug!("Next entry {} is not playable, not preparing", file.name);
            return;
        }

        let track = match probe_file(&file).await {
            Ok(track) => Arc::new(track),
            Err(e) => {
                warn!("Could not prepare {} for crossfade: {}", file.name, e);
                return;
            }
        };

        let voice = current_voice.other();
        self.send(GraphCommand::ConfigureVoice {
            voice,
            input_rate: track.sample_rate,
        });
        self.send(GraphCommand::SetGain { voice, gain: 0.0 });

        let first_chunk = self.config.start_chunk_frames(track.sample_rate);
        let started = self.schedulers[voice.index()]
            .start(&self.graph, &self.reads_tx, track.clone(), 0, first_chunk)
            .await;
        match started {
            Ok(ScheduleStart::Started) => {
                debug!("Prepared {} on voice {:?}", file.name, voice);
                self.crossfade.set_prepared(PreparedTrack { file, track, voice });
            }
            Ok(ScheduleStart::AtEnd) => debug!("Next track {} has no audio", file.name),
            Err(e) => {
                warn!("Could not prepare {} for crossfade: {}", file.name, e);
                self.silence_voice(voice);
            }
        }
    }

    /// Swap to the prepared track and ramp both voices
    async fn start_crossfade(&mut self) {
        let Some(prepared) = self.crossfade.take_prepared() else {
            return;
        };

        let next = self.queue.advance_to_next();
        if next.as_ref().map(|f| f.identity()) != Some(prepared.track.identity.clone()) {
            warn!(
                "Queue moved to {:?} instead of the prepared {}, crossfade skipped",
                next.as_ref().map(|f| f.name.as_str()),
                prepared.file.name
            );
            self.pending_next = next;
            self.silence_voice(prepared.voice);
            return;
        }

        let Some(mut outgoing) = self.session.take() else {
            self.silence_voice(prepared.voice);
            return;
        };
        let now = Instant::now();
        outgoing.freeze(now);
        outgoing.ended = true;
        self.state.emit(PlayerEvent::TrackEnded {
            session_id: outgoing.id,
            identity: outgoing.identity().clone(),
            reason: TrackEndReason::CrossfadedOut,
            timestamp: lyra_common::time::now(),
        });
        self.persistence.clear_quietly(outgoing.identity()).await;

        let settings = self.crossfade.settings();
        let frames = self.crossfade.fade_frames(self.output_rate);
        let mut incoming =
            PlaybackSession::new(prepared.file, prepared.track, prepared.voice, self.speed, self.pitch);
        incoming.state = PlayerState::Playing;

        self.send(GraphCommand::SetRunning {
            voice: incoming.voice,
            running: true,
        });
        self.send(GraphCommand::RampGain {
            voice: incoming.voice,
            target: 1.0,
            frames,
            curve: settings.curve,
        });
        self.send(GraphCommand::RampGain {
            voice: outgoing.voice,
            target: 0.0,
            frames,
            curve: settings.curve,
        });
        let now = Instant::now();
        incoming.start_clock(now);

        info!(
            "Crossfading {} -> {} over {:.1}s",
            outgoing.file.name, incoming.file.name, settings.duration
        );
        let record = self.persistence.load(incoming.identity()).await;
        self.state.emit(PlayerEvent::TrackLoaded {
            session_id: incoming.id,
            identity: incoming.identity().clone(),
            file_name: incoming.file.name.clone(),
            duration: incoming.duration(),
            sample_rate: incoming.track.sample_rate,
            resume_available: record.is_some(),
            timestamp: lyra_common::time::now(),
        });
        self.state.emit(PlayerEvent::CrossfadeStarted {
            outgoing_session_id: outgoing.id,
            incoming_session_id: incoming.id,
            duration: settings.duration,
            timestamp: lyra_common::time::now(),
        });

        self.crossfade.begin(outgoing, now);
        self.session = Some(incoming);
        self.tracker.reset();
        self.reset_persist_timer = true;
    }

    /// Stop and detach the outgoing voice once its ramp has run
    pub(super) fn finish_crossfade_if_due(&mut self, now: Instant) {
        let Some(finished) = self.crossfade.finish_due(now) else {
            return;
        };
        let voice = finished.outgoing.voice;
        self.silence_voice(voice);
        self.send(GraphCommand::SetGain { voice, gain: 1.0 });
        debug!("Crossfade out of {} complete", finished.outgoing.file.name);
        self.state.emit(PlayerEvent::CrossfadeCompleted {
            session_id: finished.outgoing.id,
            timestamp: lyra_common::time::now(),
        });
    }
}
