//! Engine actor: state, run loop and audio lifecycle
//!
//! **Responsibilities:**
//! - `EngineCore` construction (output, ring buffer, render thread)
//! - The run loop: commands, render completions, chunk reads, display
//!   ticks and the periodic position save
//! - Published state and state transitions
//! - Lazy restart of a stopped output or render thread

use super::EngineCommand;
use crate::audio::{audio_ring_buffer, start_output, OutputHandle};
use crate::config::{Config, EngineConfig, OutputConfig};
use crate::error::{Error, Result};
use crate::graph::{GraphCommand, GraphHandle, RenderEvent, VoiceId};
use crate::playback::crossfade::{CrossfadeManager, CrossfadeSettings};
use crate::playback::persistence::PositionPersistence;
use crate::playback::scheduler::{BufferScheduler, ChunkRead, SchedulerSignal};
use crate::playback::session::PlaybackSession;
use crate::playback::tracker::{PositionTracker, Tick};
use crate::state::{PlayerSnapshot, SharedState};
use lyra_common::events::{PlayerEvent, PlayerState};
use lyra_common::{MediaFile, PlaybackQueue, PositionStore, TrackIdentity};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

pub(super) struct EngineCore {
    pub(super) config: EngineConfig,
    output_config: OutputConfig,
    pub(super) state: SharedState,
    pub(super) persistence: PositionPersistence,
    pub(super) queue: Arc<dyn PlaybackQueue>,

    output: Option<OutputHandle>,
    pub(super) output_rate: u32,
    pub(super) graph: GraphHandle,
    render_tx: UnboundedSender<RenderEvent>,
    render_rx: Option<UnboundedReceiver<RenderEvent>>,
    pub(super) reads_tx: UnboundedSender<ChunkRead>,
    reads_rx: Option<UnboundedReceiver<ChunkRead>>,

    /// One scheduler per graph voice, indexed by `VoiceId::index`
    pub(super) schedulers: [BufferScheduler; 2],
    pub(super) session: Option<PlaybackSession>,
    /// Player state while no session exists
    pub(super) idle_state: PlayerState,
    pub(super) tracker: PositionTracker,
    pub(super) crossfade: CrossfadeManager,
    /// Queue entry already taken by a crossfade that could not start
    pub(super) pending_next: Option<MediaFile>,

    pub(super) speed: f64,
    pub(super) pitch: f64,
    pub(super) volume: f32,
    /// Restart the persist interval after the loop iteration
    pub(super) reset_persist_timer: bool,
}

impl EngineCore {
    pub(super) fn new(
        config: &Config,
        state: SharedState,
        store: Arc<dyn PositionStore>,
        queue: Arc<dyn PlaybackQueue>,
    ) -> Result<Self> {
        let (producer, consumer) = audio_ring_buffer(config.output.ring_capacity);
        let output = start_output(&config.output, consumer)?;
        let output_rate = output.sample_rate();

        let (render_tx, render_rx) = mpsc::unbounded_channel();
        let graph = GraphHandle::spawn(output_rate, producer, render_tx.clone())?;
        let (reads_tx, reads_rx) = mpsc::unbounded_channel();

        let chunk_frames = config.engine.chunk_frames;
        info!(
            "Engine ready: {:?} output at {} Hz, {} frame chunks",
            output.backend(),
            output_rate,
            chunk_frames
        );

        Ok(Self {
            config: config.engine.clone(),
            output_config: config.output.clone(),
            persistence: PositionPersistence::new(store, state.clone()),
            state,
            queue,
            output: Some(output),
            output_rate,
            graph,
            render_tx,
            render_rx: Some(render_rx),
            reads_tx,
            reads_rx: Some(reads_rx),
            schedulers: [
                BufferScheduler::new(VoiceId::A, chunk_frames),
                BufferScheduler::new(VoiceId::B, chunk_frames),
            ],
            session: None,
            idle_state: PlayerState::Stopped,
            tracker: PositionTracker::new(),
            crossfade: CrossfadeManager::new(CrossfadeSettings::from(&config.crossfade)),
            pending_next: None,
            speed: 1.0,
            pitch: 1.0,
            volume: 1.0,
            reset_persist_timer: false,
        })
    }

    pub(super) async fn run(mut self, mut commands: mpsc::Receiver<EngineCommand>) {
        let (Some(mut render_rx), Some(mut reads_rx)) = (self.render_rx.take(), self.reads_rx.take())
        else {
            error!("Engine started twice");
            return;
        };

        let mut tick = interval(self.config.tick_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let persist_period = self.config.persist_interval();
        let mut persist = interval_at(Instant::now() + persist_period, persist_period);
        persist.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(EngineCommand::Shutdown(reply)) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All engine handles dropped");
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = render_rx.recv() => self.on_render_event(event),
                Some(read) = reads_rx.recv() => self.on_chunk_read(read),
                _ = tick.tick() => self.on_tick().await,
                _ = persist.tick() => self.on_persist_tick().await,
            }

            if self.reset_persist_timer {
                self.reset_persist_timer = false;
                persist.reset();
            }
        }
        info!("Playback engine stopped");
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Load { file, reply } => {
                let _ = reply.send(self.load(file).await);
            }
            EngineCommand::Play(reply) => {
                let _ = reply.send(self.play().await);
            }
            EngineCommand::Pause(reply) => {
                let _ = reply.send(self.pause().await);
            }
            EngineCommand::Toggle(reply) => {
                let result = if self.player_state().is_playing() {
                    self.pause().await
                } else {
                    self.play().await
                };
                let _ = reply.send(result);
            }
            EngineCommand::Stop(reply) => {
                let _ = reply.send(self.stop().await);
            }
            EngineCommand::Seek { target, reply } => {
                let _ = reply.send(self.seek(target).await);
            }
            EngineCommand::SeekRelative { delta, reply } => {
                let _ = reply.send(self.seek_relative(delta).await);
            }
            EngineCommand::SetSpeed { speed, reply } => {
                let _ = reply.send(self.set_speed(speed));
            }
            EngineCommand::SetPitch { ratio, reply } => {
                let _ = reply.send(self.set_pitch(ratio));
            }
            EngineCommand::SetVolume { volume, reply } => {
                let _ = reply.send(self.set_volume(volume));
            }
            EngineCommand::ResumeFrom { record, reply } => {
                let _ = reply.send(self.resume_from(record).await);
            }
            EngineCommand::Next(reply) => {
                let _ = reply.send(self.next().await);
            }
            EngineCommand::Previous(reply) => {
                let _ = reply.send(self.previous().await);
            }
            EngineCommand::Unload(reply) => {
                let _ = reply.send(self.unload().await);
            }
            EngineCommand::SetCrossfade {
                enabled,
                duration,
                reply,
            } => {
                let _ = reply.send(self.set_crossfade(enabled, duration));
            }
            EngineCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            EngineCommand::Shutdown(_) => {}
            EngineCommand::FailOutput(reply) => {
                if let Some(output) = &self.output {
                    output.mark_failed();
                }
                let _ = reply.send(Ok(()));
            }
            EngineCommand::FailNextRead(reply) => {
                let result = match self.session.as_ref().map(|s| s.voice) {
                    Some(voice) => {
                        self.schedulers[voice.index()].test_fail_next_read();
                        Ok(())
                    }
                    None => Err(Error::InvalidState("No track loaded".into())),
                };
                let _ = reply.send(result);
            }
        }
        self.publish();
    }

    // ========================================
    // Published state
    // ========================================

    pub(super) fn player_state(&self) -> PlayerState {
        match &self.session {
            Some(session) => session.state.clone(),
            None => self.idle_state.clone(),
        }
    }

    /// Change the player state, reporting real changes
    pub(super) fn set_state(&mut self, new_state: PlayerState) {
        let old_state = self.player_state();
        if old_state == new_state {
            return;
        }
        let session_id = self.session.as_ref().map(|s| s.id);
        match self.session.as_mut() {
            Some(session) => session.state = new_state.clone(),
            None => self.idle_state = new_state.clone(),
        }
        info!("Player state: {} -> {}", old_state, new_state);
        self.state.emit(PlayerEvent::StateChanged {
            session_id,
            old_state,
            new_state,
            timestamp: lyra_common::time::now(),
        });
    }

    pub(super) fn snapshot(&self) -> PlayerSnapshot {
        let now = Instant::now();
        let crossfade_enabled = self.crossfade.is_enabled();
        match &self.session {
            Some(session) => PlayerSnapshot {
                player_state: session.state.clone(),
                current_time: session.current_time(now),
                duration: session.duration(),
                speed: self.speed,
                pitch: self.pitch,
                volume: self.volume,
                current_file: Some(session.file.clone()),
                session_id: Some(session.id),
                crossfade_enabled,
            },
            None => PlayerSnapshot {
                player_state: self.idle_state.clone(),
                speed: self.speed,
                pitch: self.pitch,
                volume: self.volume,
                crossfade_enabled,
                ..PlayerSnapshot::default()
            },
        }
    }

    pub(super) fn publish(&self) {
        self.state.publish(self.snapshot());
    }

    /// Report a fatal condition for the current track and stop its audio
    pub(super) fn fail(&mut self, error: &Error, identity: Option<TrackIdentity>) {
        error!("Playback error: {}", error);
        let now = Instant::now();
        self.abort_crossfade();
        let session_id = match self.session.as_mut() {
            Some(session) => {
                session.freeze(now);
                Some(session.id)
            }
            None => None,
        };
        if let Some(voice) = self.session.as_ref().map(|s| s.voice) {
            self.silence_voice(voice);
        }
        let identity = identity.or_else(|| self.session.as_ref().map(|s| s.identity().clone()));

        self.set_state(PlayerState::Error(error.to_string()));
        self.state.emit(PlayerEvent::Error {
            session_id,
            identity,
            message: error.to_string(),
            timestamp: lyra_common::time::now(),
        });
    }

    // ========================================
    // Graph helpers
    // ========================================

    pub(super) fn send(&self, command: GraphCommand) {
        if let Err(e) = self.graph.send(command) {
            warn!("Dropped graph command: {}", e);
        }
    }

    /// Cancel the voice's schedule and stop it
    pub(super) fn silence_voice(&mut self, voice: VoiceId) {
        if let Err(e) = self.schedulers[voice.index()].cancel(&self.graph) {
            warn!("Failed to cancel voice {:?}: {}", voice, e);
        }
        self.send(GraphCommand::SetRunning {
            voice,
            running: false,
        });
    }

    /// Stop the crossfade in progress and discard a prepared shadow track
    pub(super) fn abort_crossfade(&mut self) {
        let (active, prepared) = self.crossfade.abort();
        if let Some(active) = active {
            debug!("Crossfade from {} aborted", active.outgoing.identity());
            self.silence_voice(active.outgoing.voice);
            self.send(GraphCommand::SetGain {
                voice: active.outgoing.voice,
                gain: 1.0,
            });
            if let Some(voice) = self.session.as_ref().map(|s| s.voice) {
                self.send(GraphCommand::SetGain { voice, gain: 1.0 });
            }
        }
        if let Some(prepared) = prepared {
            debug!("Discarding prepared track {}", prepared.track.identity);
            self.silence_voice(prepared.voice);
        }
    }

    /// Restart a stopped output or render thread, once
    pub(super) fn ensure_running(&mut self) -> Result<()> {
        let output_ok = self.output.as_ref().is_some_and(|o| o.is_running());
        let graph_ok = self.graph.is_alive();
        if output_ok && graph_ok {
            return Ok(());
        }

        warn!(
            "Audio engine not running (output: {}, render: {}), restarting",
            output_ok, graph_ok
        );
        if let Err(e) = self.restart_audio(graph_ok) {
            let error = Error::EngineNotRunning(e.to_string());
            self.fail(&error, None);
            return Err(error);
        }
        info!("Audio engine restarted at {} Hz", self.output_rate);
        Ok(())
    }

    fn restart_audio(&mut self, graph_alive: bool) -> Result<()> {
        // Release the device before reopening it
        self.output = None;

        let (producer, consumer) = audio_ring_buffer(self.output_config.ring_capacity);
        let output = start_output(&self.output_config, consumer)?;
        let rate = output.sample_rate();

        if graph_alive {
            self.graph.send(GraphCommand::AttachOutput {
                producer,
                sample_rate: rate,
            })?;
        } else {
            self.graph = GraphHandle::spawn(rate, producer, self.render_tx.clone())?;
            for voice in VoiceId::ALL {
                self.schedulers[voice.index()].cancel(&self.graph)?;
            }
            self.graph.send(GraphCommand::SetSpeed(self.speed))?;
            self.graph
                .send(GraphCommand::SetPitch(super::transport::ratio_to_semitones(self.pitch)))?;
            self.graph.send(GraphCommand::SetVolume(self.volume))?;
            if let Some(session) = &self.session {
                self.graph.send(GraphCommand::ConfigureVoice {
                    voice: session.voice,
                    input_rate: session.track.sample_rate,
                })?;
            }
        }

        self.output = Some(output);
        self.output_rate = rate;
        Ok(())
    }

    // ========================================
    // Loop events
    // ========================================

    fn on_render_event(&mut self, event: RenderEvent) {
        let RenderEvent::BufferCompleted {
            voice,
            generation,
            chunk_index,
            is_last,
        } = event;
        let signal = self.schedulers[voice.index()].on_buffer_completed(
            &self.reads_tx,
            generation,
            chunk_index,
            is_last,
        );
        self.on_scheduler_signal(voice, signal);
    }

    fn on_chunk_read(&mut self, read: ChunkRead) {
        let voice = read.voice;
        let signal = self.schedulers[voice.index()].on_chunk_read(&self.graph, &self.reads_tx, read);
        self.on_scheduler_signal(voice, signal);
    }

    fn on_scheduler_signal(&mut self, voice: VoiceId, signal: SchedulerSignal) {
        match signal {
            SchedulerSignal::Continue => {}
            SchedulerSignal::Drained => {
                trace!("Voice {:?} played out", voice);
            }
            SchedulerSignal::Failed(e) => {
                if self.session.as_ref().is_some_and(|s| s.voice == voice) {
                    self.fail(&e, None);
                } else if self.crossfade.outgoing_voice() == Some(voice) {
                    warn!("Outgoing track failed during crossfade: {}", e);
                    self.silence_voice(voice);
                } else if self.crossfade.prepared().is_some_and(|p| p.voice == voice) {
                    warn!("Prepared track failed, crossfade skipped: {}", e);
                    self.crossfade.take_prepared();
                    self.silence_voice(voice);
                } else {
                    debug!("Read failure on idle voice {:?}: {}", voice, e);
                }
            }
        }
    }

    async fn on_tick(&mut self) {
        let now = Instant::now();
        self.finish_crossfade_if_due(now);
        self.check_output(now);

        let tick = match self.session.as_mut() {
            Some(session) => self.tracker.tick(session, now),
            None => Tick::Idle,
        };

        match tick {
            Tick::Idle => {}
            Tick::Progress { position, emit } => {
                if emit {
                    if let Some(session) = &self.session {
                        self.state.emit(PlayerEvent::PositionChanged {
                            session_id: session.id,
                            position,
                            duration: session.duration(),
                            timestamp: lyra_common::time::now(),
                        });
                    }
                }
                self.check_crossfade(position).await;
            }
            Tick::Ended { .. } => self.handle_track_end().await,
        }
        self.publish();
    }

    /// Pause when the output died under a playing track
    fn check_output(&mut self, now: Instant) {
        let playing = self.session.as_ref().is_some_and(|s| s.state.is_playing());
        if !playing || (self.output.as_ref().is_some_and(|o| o.is_running()) && self.graph.is_alive()) {
            return;
        }

        warn!("Audio output stopped during playback, pausing");
        self.abort_crossfade();
        if let Some(session) = self.session.as_mut() {
            session.freeze(now);
            let voice = session.voice;
            let (id, identity) = (session.id, session.identity().clone());
            self.silence_voice(voice);
            self.set_state(PlayerState::Paused);
            self.state.emit(PlayerEvent::Error {
                session_id: Some(id),
                identity: Some(identity),
                message: Error::EngineNotRunning("audio output stopped".into()).to_string(),
                timestamp: lyra_common::time::now(),
            });
        }
    }

    async fn on_persist_tick(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        if !session.state.is_playing() || session.is_seek_pending() {
            return;
        }
        let position = session.current_time(Instant::now());
        trace!("Periodic position save at {:.1}s", position);
        self.persistence.save_quietly(session, position).await;
    }

    async fn shutdown(&mut self) {
        info!("Shutting down playback engine");
        if let Some(session) = &self.session {
            if !session.ended {
                let position = session.current_time(Instant::now());
                self.persistence.save_quietly(session, position).await;
            }
        }
        self.abort_crossfade();
        if let Some(voice) = self.session.as_ref().map(|s| s.voice) {
            self.silence_voice(voice);
            if let Some(session) = self.session.as_mut() {
                session.freeze(Instant::now());
            }
        }
        self.set_state(PlayerState::Stopped);
        self.publish();

        self.graph.shutdown();
        if let Some(mut output) = self.output.take() {
            output.stop();
        }
    }
}
