//! Playback engine
//!
//! **Module Structure:**
//! - `mod.rs`: `PlaybackEngine` handle and the command set
//! - `core.rs`: actor state, run loop, render/read event handling, audio restart
//! - `transport.rs`: load, play, pause, stop, seek, speed, pitch, volume, resume
//! - `queue.rs`: next/previous, track completion, crossfade into the next track
//!
//! The engine runs as one tokio task that owns every piece of playback
//! state. Callers talk to it through the cloneable `PlaybackEngine` handle;
//! each call is a command with a oneshot reply, so commands are applied
//! strictly in order and a `play()` sent during a `seek()` waits for it.

mod core;
mod queue;
mod transport;

pub use transport::{clamp_pitch, clamp_speed, MAX_PITCH, MAX_SPEED, MIN_PITCH, MIN_SPEED};

use self::core::EngineCore;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::state::{PlayerSnapshot, SharedState};
use lyra_common::events::PlayerEvent;
use lyra_common::{MediaFile, PlaybackPositionRecord, PlaybackQueue, PositionStore};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::info;

const COMMAND_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<Result<T>>;

pub(crate) enum EngineCommand {
    Load {
        file: MediaFile,
        reply: Reply<Option<PlaybackPositionRecord>>,
    },
    Play(Reply<()>),
    Pause(Reply<()>),
    Toggle(Reply<()>),
    Stop(Reply<()>),
    Seek {
        target: f64,
        reply: Reply<f64>,
    },
    SeekRelative {
        delta: f64,
        reply: Reply<f64>,
    },
    SetSpeed {
        speed: f64,
        reply: Reply<f64>,
    },
    SetPitch {
        ratio: f64,
        reply: Reply<f64>,
    },
    SetVolume {
        volume: f32,
        reply: Reply<f32>,
    },
    ResumeFrom {
        record: PlaybackPositionRecord,
        reply: Reply<()>,
    },
    Next(Reply<bool>),
    Previous(Reply<bool>),
    Unload(Reply<()>),
    SetCrossfade {
        enabled: bool,
        duration: f64,
        reply: Reply<f64>,
    },
    Snapshot(oneshot::Sender<PlayerSnapshot>),
    Shutdown(oneshot::Sender<()>),
    FailOutput(Reply<()>),
    FailNextRead(Reply<()>),
}

/// Handle on a running playback engine
#[derive(Clone)]
pub struct PlaybackEngine {
    commands: mpsc::Sender<EngineCommand>,
    state: SharedState,
}

impl PlaybackEngine {
    /// Open the audio output, spawn the render thread and the engine task
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &Config,
        store: Arc<dyn PositionStore>,
        queue: Arc<dyn PlaybackQueue>,
    ) -> Result<Self> {
        let state = SharedState::new(config.engine.event_capacity);
        let core = EngineCore::new(config, state.clone(), store, queue)?;
        let (commands, rx) = mpsc::channel(COMMAND_CAPACITY);

        tokio::spawn(core.run(rx));
        info!("Playback engine started");
        Ok(Self { commands, state })
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> EngineCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Open `file`, stopping whatever was playing
    ///
    /// Returns the stored resume point for the track, if any. The engine
    /// never jumps to it by itself; pass it to `resume_from` to do so.
    pub async fn load(&self, file: MediaFile) -> Result<Option<PlaybackPositionRecord>> {
        self.request(|reply| EngineCommand::Load { file, reply }).await
    }

    pub async fn play(&self) -> Result<()> {
        self.request(EngineCommand::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(EngineCommand::Pause).await
    }

    pub async fn toggle(&self) -> Result<()> {
        self.request(EngineCommand::Toggle).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(EngineCommand::Stop).await
    }

    /// Seek to `seconds`, clamped to the track; returns the landed position
    pub async fn seek(&self, seconds: f64) -> Result<f64> {
        self.request(|reply| EngineCommand::Seek {
            target: seconds,
            reply,
        })
        .await
    }

    /// Skip by `delta` seconds (negative goes back)
    pub async fn seek_relative(&self, delta: f64) -> Result<f64> {
        self.request(|reply| EngineCommand::SeekRelative { delta, reply })
            .await
    }

    /// Set playback speed; returns the applied (clamped) value
    pub async fn set_speed(&self, speed: f64) -> Result<f64> {
        self.request(|reply| EngineCommand::SetSpeed { speed, reply })
            .await
    }

    /// Set pitch as a ratio (1.0 = unchanged); returns the applied value
    pub async fn set_pitch(&self, ratio: f64) -> Result<f64> {
        self.request(|reply| EngineCommand::SetPitch { ratio, reply })
            .await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<f32> {
        self.request(|reply| EngineCommand::SetVolume { volume, reply })
            .await
    }

    /// Jump to a stored resume point of the loaded track
    pub async fn resume_from(&self, record: PlaybackPositionRecord) -> Result<()> {
        self.request(|reply| EngineCommand::ResumeFrom { record, reply })
            .await
    }

    /// Move to the next queue entry; `false` at the end of the queue
    pub async fn next(&self) -> Result<bool> {
        self.request(EngineCommand::Next).await
    }

    /// Restart the track, or move to the previous entry near its start
    pub async fn previous(&self) -> Result<bool> {
        self.request(EngineCommand::Previous).await
    }

    pub async fn unload(&self) -> Result<()> {
        self.request(EngineCommand::Unload).await
    }

    /// Enable or disable crossfading; returns the applied duration
    pub async fn set_crossfade(&self, enabled: bool, duration: f64) -> Result<f64> {
        self.request(|reply| EngineCommand::SetCrossfade {
            enabled,
            duration,
            reply,
        })
        .await
    }

    /// Exact state as of this call
    pub async fn snapshot(&self) -> Result<PlayerSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(EngineCommand::Snapshot(reply))
            .await
            .map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }

    /// Published state, updated after every command and display tick
    pub fn subscribe_state(&self) -> watch::Receiver<PlayerSnapshot> {
        self.state.subscribe_state()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.state.subscribe_events()
    }

    /// Mark the audio output as failed, as a device error would
    ///
    /// **Test helper only**
    #[doc(hidden)]
    pub async fn test_fail_output(&self) -> Result<()> {
        self.request(EngineCommand::FailOutput).await
    }

    /// Make the current track's next background read fail with a decode error
    ///
    /// **Test helper only**
    #[doc(hidden)]
    pub async fn test_fail_next_read(&self) -> Result<()> {
        self.request(EngineCommand::FailNextRead).await
    }

    /// Save the position, stop audio and end the engine task
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(EngineCommand::Shutdown(reply))
            .await
            .map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }
}
