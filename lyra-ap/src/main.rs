//! Audio Player (lyra-ap) - command-line entry point
//!
//! Plays a list of files through the playback engine, saving resume points
//! to the SQLite position store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lyra_ap::config::OutputBackend;
use lyra_ap::{Config, PlaybackEngine};
use lyra_common::db::{init_database, SqlitePositionStore};
use lyra_common::events::{PlayerEvent, PlayerState};
use lyra_common::time::format_position;
use lyra_common::{ListQueue, MediaFile, PlaybackMode, PlaybackQueue};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for lyra-ap
#[derive(Parser, Debug)]
#[command(name = "lyra-ap")]
#[command(about = "Lyra audio player")]
#[command(version)]
struct Args {
    /// Config file (overrides LYRA_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play files in order
    Play {
        /// Audio files to queue
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Playback speed (0.5 - 3.0)
        #[arg(long, default_value_t = 1.0)]
        speed: f64,

        /// Pitch ratio (0.5 - 1.5, 1.0 = unchanged)
        #[arg(long, default_value_t = 1.0)]
        pitch: f64,

        /// Crossfade between tracks over SECS seconds
        #[arg(long, value_name = "SECS")]
        crossfade: Option<f64>,

        /// Continue from stored resume points
        #[arg(long)]
        resume: bool,

        /// Discard audio instead of opening a device
        #[arg(long)]
        null_output: bool,

        #[arg(long, value_enum, default_value_t = Mode::Normal)]
        mode: Mode,

        /// Print player events to stdout as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// List output devices
    Devices,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Normal,
    RepeatOne,
    RepeatAll,
    Shuffle,
}

impl From<Mode> for PlaybackMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Normal => PlaybackMode::Normal,
            Mode::RepeatOne => PlaybackMode::RepeatOne,
            Mode::RepeatAll => PlaybackMode::RepeatAll,
            Mode::Shuffle => PlaybackMode::Shuffle,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::resolve(args.config.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    let default_filter = format!(
        "lyra_ap={level},lyra_common={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Command::Devices => {
            for name in lyra_ap::audio::output::list_devices()? {
                println!("{}", name);
            }
            Ok(())
        }
        Command::Play {
            files,
            speed,
            pitch,
            crossfade,
            resume,
            null_output,
            mode,
            json,
        } => {
            if null_output {
                config.output.backend = OutputBackend::Null;
            }
            if let Some(seconds) = crossfade {
                config.crossfade.enabled = true;
                config.crossfade.duration_secs = seconds;
            }
            let options = PlayOptions {
                speed,
                pitch,
                resume,
                mode: mode.into(),
                json,
            };
            play(config, files, options).await
        }
    }
}

struct PlayOptions {
    speed: f64,
    pitch: f64,
    resume: bool,
    mode: PlaybackMode,
    json: bool,
}

async fn play(config: Config, paths: Vec<PathBuf>, options: PlayOptions) -> Result<()> {
    let mut files = Vec::new();
    for path in &paths {
        match MediaFile::from_path(path) {
            Ok(file) if file.is_playable() => files.push(file),
            Ok(_) => warn!("Skipping {}: not an audio file", path.display()),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    if files.is_empty() {
        bail!("No playable files given");
    }
    info!("Queued {} file(s)", files.len());

    let db_path = config.database_path();
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open position database {}", db_path.display()))?;
    let store = Arc::new(SqlitePositionStore::new(pool));
    let queue = Arc::new(ListQueue::new(files, options.mode));

    let engine = PlaybackEngine::start(&config, store, queue.clone())
        .context("Failed to start playback engine")?;
    let mut events = engine.subscribe_events();

    engine.set_speed(options.speed).await?;
    engine.set_pitch(options.pitch).await?;

    let Some(first) = queue.advance_to_next() else {
        bail!("Queue is empty");
    };
    let record = engine.load(first).await?;
    if let Some(record) = record.filter(|_| options.resume) {
        info!("Resuming at {}", format_position(record.position));
        engine.resume_from(record).await?;
    }
    engine.play().await?;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
            event = events.recv() => {
                if let (true, Ok(event)) = (options.json, &event) {
                    println!("{}", serde_json::to_string(event)?);
                }
                match event {
                    Ok(PlayerEvent::TrackLoaded { file_name, duration, .. }) => {
                        info!("Now playing: {} [{}]", file_name, format_position(duration));
                    }
                    Ok(PlayerEvent::PositionChanged { position, duration, .. }) => {
                        info!("{} / {}", format_position(position), format_position(duration));
                    }
                    Ok(PlayerEvent::StateChanged { new_state: PlayerState::Stopped, .. }) => {
                        info!("Playback finished");
                        break;
                    }
                    Ok(PlayerEvent::Error { message, .. }) => {
                        warn!("{}", message);
                        if engine.snapshot().await?.player_state.is_error() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Missed {} player events", n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    engine.shutdown().await?;
    info!("Shutdown complete");
    Ok(())
}
