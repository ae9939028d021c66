//! Configuration for lyra-ap
//!
//! Settings come from a TOML file resolved in priority order:
//!
//! 1. Command-line argument (`--config`)
//! 2. `LYRA_CONFIG` environment variable
//! 3. `<user config dir>/lyra/config.toml`
//! 4. Built-in defaults
//!
//! Every key is optional. A file only needs to name what it changes.

use crate::error::{Error, Result};
use lyra_common::config::{default_data_dir, resolve_config_file};
use lyra_common::FadeCurve;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "LYRA_CONFIG";

/// Shortest accepted crossfade, seconds
pub const MIN_CROSSFADE_SECS: f64 = 0.5;
/// Longest accepted crossfade, seconds
pub const MAX_CROSSFADE_SECS: f64 = 5.0;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub crossfade: CrossfadeConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// SQLite file for playback positions (default: `<data dir>/positions.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scheduling and timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Frames read per scheduled chunk
    #[serde(default = "default_chunk_frames")]
    pub chunk_frames: usize,

    /// Cap on the first chunk after a (re)start, seconds of audio
    #[serde(default = "default_start_chunk_secs")]
    pub start_chunk_secs: f64,

    /// Display tick period
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Position save period while playing
    #[serde(default = "default_persist_interval_secs")]
    pub persist_interval_secs: u64,

    /// Event bus capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// "Previous" restarts the track when further in than this, seconds
    #[serde(default = "default_restart_threshold_secs")]
    pub restart_threshold_secs: f64,
}

/// Track-to-track crossfade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossfadeConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Fade length in seconds, clamped to [0.5, 5.0]
    #[serde(default = "default_crossfade_secs")]
    pub duration_secs: f64,

    #[serde(default)]
    pub curve: FadeCurve,
}

/// Audio output backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputBackend {
    /// System audio device through cpal
    #[default]
    Cpal,
    /// Discards audio at real-time pace (headless runs and tests)
    Null,
}

/// Audio output device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub backend: OutputBackend,

    /// Device name (None = system default)
    #[serde(default)]
    pub device: Option<String>,

    /// Preferred output sample rate
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Device buffer size in frames (None = device default)
    #[serde(default)]
    pub buffer_frames: Option<u32>,

    /// Ring buffer between render thread and device, frames
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_chunk_frames() -> usize {
    1 << 20
}

fn default_start_chunk_secs() -> f64 {
    2.0
}

fn default_tick_interval_ms() -> u64 {
    16
}

fn default_persist_interval_secs() -> u64 {
    10
}

fn default_event_capacity() -> usize {
    256
}

fn default_restart_threshold_secs() -> f64 {
    3.0
}

fn default_crossfade_secs() -> f64 {
    2.0
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_ring_capacity() -> usize {
    crate::audio::ring_buffer::DEFAULT_RING_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_frames: default_chunk_frames(),
            start_chunk_secs: default_start_chunk_secs(),
            tick_interval_ms: default_tick_interval_ms(),
            persist_interval_secs: default_persist_interval_secs(),
            event_capacity: default_event_capacity(),
            restart_threshold_secs: default_restart_threshold_secs(),
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs.max(1))
    }

    /// Size of the first chunk after a (re)start at `sample_rate`
    pub fn start_chunk_frames(&self, sample_rate: u32) -> usize {
        let frames = (self.start_chunk_secs.max(0.1) * sample_rate as f64) as usize;
        frames.clamp(1, self.chunk_frames.max(1))
    }
}

impl Default for CrossfadeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            duration_secs: default_crossfade_secs(),
            curve: FadeCurve::default(),
        }
    }
}

impl CrossfadeConfig {
    /// Fade length clamped to the accepted range
    pub fn clamped_duration(&self) -> f64 {
        clamp_crossfade(self.duration_secs)
    }
}

/// Clamp a crossfade length to [0.5, 5.0] seconds
pub fn clamp_crossfade(seconds: f64) -> f64 {
    if seconds.is_nan() {
        return default_crossfade_secs();
    }
    seconds.clamp(MIN_CROSSFADE_SECS, MAX_CROSSFADE_SECS)
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            backend: OutputBackend::default(),
            device: None,
            sample_rate: default_sample_rate(),
            buffer_frames: None,
            ring_capacity: default_ring_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from an explicit file, or defaults when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve the config file (CLI, env, user dir) and load it
    pub fn resolve(cli_arg: Option<&str>) -> Result<Self> {
        let path = resolve_config_file(cli_arg, CONFIG_ENV_VAR);
        Self::load(path.as_deref())
    }

    /// Parse and validate TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.chunk_frames == 0 {
            return Err(Error::Config("engine.chunk_frames must be positive".into()));
        }
        if self.output.sample_rate == 0 {
            return Err(Error::Config("output.sample_rate must be positive".into()));
        }
        if !self.crossfade.duration_secs.is_finite() {
            return Err(Error::Config("crossfade.duration_secs must be a number".into()));
        }
        Ok(())
    }

    /// Position database path, defaulting under the platform data dir
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("positions.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.chunk_frames, 1_048_576);
        assert_eq!(config.engine.tick_interval(), Duration::from_millis(16));
        assert_eq!(config.engine.persist_interval(), Duration::from_secs(10));
        assert!(!config.crossfade.enabled);
        assert_eq!(config.crossfade.clamped_duration(), 2.0);
        assert_eq!(config.output.backend, OutputBackend::Cpal);
        assert!(config.database_path().ends_with("positions.db"));
    }

    #[test]
    fn test_partial_file() {
        let config = Config::parse(
            r#"
            [crossfade]
            enabled = true
            duration_secs = 9.0
            curve = "SCurve"

            [output]
            backend = "null"
            sample_rate = 8000
            "#,
        )
        .unwrap();

        assert!(config.crossfade.enabled);
        assert_eq!(config.crossfade.clamped_duration(), 5.0);
        assert_eq!(config.crossfade.curve, FadeCurve::SCurve);
        assert_eq!(config.output.backend, OutputBackend::Null);
        assert_eq!(config.output.sample_rate, 8000);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::parse("[engine]\nchunk_frames = 0\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(Config::parse("engine = 3"), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_path = \"/tmp/lyra-test.db\"").unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/tmp/lyra-test.db"));
        assert_eq!(config.logging.level, "debug");

        assert!(Config::load(Some(Path::new("/no/such/lyra.toml"))).is_err());
    }

    #[test]
    fn test_start_chunk_and_clamp() {
        let engine = EngineConfig {
            chunk_frames: 10_000,
            ..EngineConfig::default()
        };
        assert_eq!(engine.start_chunk_frames(8000), 10_000);
        assert_eq!(EngineConfig::default().start_chunk_frames(8000), 16_000);
        assert_eq!(clamp_crossfade(0.1), 0.5);
        assert_eq!(clamp_crossfade(f64::NAN), 2.0);
    }
}
