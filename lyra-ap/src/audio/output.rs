//! Audio output backends
//!
//! Both backends consume the ring buffer filled by the render thread:
//!
//! - `Cpal`: system device. The cpal `Stream` is `!Send`, so it lives on a
//!   dedicated thread for its whole life.
//! - `Null`: drains the ring at real-time pace and discards the audio.
//!
//! A device error sets the shared error flag. The engine checks the flag
//! before play/seek and restarts the output once when it is set.

use crate::audio::ring_buffer::{AudioConsumer, RingBufferStats, RingStatsHandle};
use crate::config::{OutputBackend, OutputConfig};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Running output backend
pub struct OutputHandle {
    backend: OutputBackend,
    sample_rate: u32,
    error_flag: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    stats: RingStatsHandle,
}

impl OutputHandle {
    /// Actual output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn backend(&self) -> OutputBackend {
        self.backend
    }

    /// False once the device reported an error or its thread exited
    pub fn is_running(&self) -> bool {
        !self.error_flag.load(Ordering::SeqCst)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Mark the output as failed, as a device error callback would
    pub fn mark_failed(&self) {
        self.error_flag.store(true, Ordering::SeqCst);
    }

    pub fn stats(&self) -> RingBufferStats {
        self.stats.stats()
    }

    /// Stop the backend and wait for its thread
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Audio output thread panicked");
            }
        }
    }
}

impl Drop for OutputHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// List available output device names
pub fn list_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
        .filter_map(|device| device.name().ok())
        .collect();

    debug!("Found {} output devices", devices.len());
    Ok(devices)
}

/// Start the configured backend draining `consumer`
pub fn start_output(config: &OutputConfig, consumer: AudioConsumer) -> Result<OutputHandle> {
    match config.backend {
        OutputBackend::Cpal => start_cpal(config, consumer),
        OutputBackend::Null => Ok(start_null(config.sample_rate, consumer)),
    }
}

fn start_null(sample_rate: u32, mut consumer: AudioConsumer) -> OutputHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let error_flag = Arc::new(AtomicBool::new(false));
    let stats = consumer.stats_handle();
    let thread_stop = Arc::clone(&stop);

    let thread = thread::Builder::new()
        .name("lyra-null-output".into())
        .spawn(move || {
            let started = Instant::now();
            let mut consumed: u64 = 0;
            while !thread_stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(5));
                let due = (started.elapsed().as_secs_f64() * sample_rate as f64) as u64;
                let owed = due.saturating_sub(consumed);
                // Time passes whether or not the ring had audio
                consumer.discard(owed as usize);
                consumed = due;
            }
        });

    let thread = match thread {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("Failed to spawn null output thread: {}", e);
            error_flag.store(true, Ordering::SeqCst);
            None
        }
    };

    info!("Null audio output started at {} Hz", sample_rate);
    OutputHandle {
        backend: OutputBackend::Null,
        sample_rate,
        error_flag,
        stop,
        thread,
        stats,
    }
}

fn start_cpal(config: &OutputConfig, consumer: AudioConsumer) -> Result<OutputHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let error_flag = Arc::new(AtomicBool::new(false));
    let stats = consumer.stats_handle();
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<u32>>(1);

    let thread_config = config.clone();
    let thread_stop = Arc::clone(&stop);
    let thread_error = Arc::clone(&error_flag);

    let thread = thread::Builder::new()
        .name("lyra-cpal-output".into())
        .spawn(move || {
            let stream = match open_stream(&thread_config, consumer, Arc::clone(&thread_error)) {
                Ok((stream, rate)) => {
                    let _ = ready_tx.send(Ok(rate));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            while !thread_stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(50));
            }
            if let Err(e) = stream.pause() {
                debug!("Failed to pause stream on shutdown: {}", e);
            }
        })
        .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {}", e)))?;

    let sample_rate = ready_rx
        .recv()
        .map_err(|_| Error::AudioOutput("Output thread exited during startup".into()))??;

    Ok(OutputHandle {
        backend: OutputBackend::Cpal,
        sample_rate,
        error_flag,
        stop,
        thread: Some(thread),
        stats,
    })
}

fn find_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Found requested audio device: {}", name);
            return Ok(device);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
    info!(
        "Using default audio device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(device)
}

/// Prefer stereo f32 at `preferred_rate`, else the device default
fn best_config(device: &Device, preferred_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

    let preferred = supported.find(|c| {
        c.channels() == 2
            && c.min_sample_rate().0 <= preferred_rate
            && c.max_sample_rate().0 >= preferred_rate
            && c.sample_format() == SampleFormat::F32
    });
    if let Some(c) = preferred {
        let format = c.sample_format();
        return Ok((c.with_sample_rate(cpal::SampleRate(preferred_rate)).config(), format));
    }

    let fallback = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    Ok((fallback.config(), fallback.sample_format()))
}

fn open_stream(
    config: &OutputConfig,
    consumer: AudioConsumer,
    error_flag: Arc<AtomicBool>,
) -> Result<(Stream, u32)> {
    let device = find_device(config.device.as_deref())?;
    let (mut stream_config, sample_format) = best_config(&device, config.sample_rate)?;
    if let Some(frames) = config.buffer_frames {
        stream_config.buffer_size = cpal::BufferSize::Fixed(frames);
    }

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
        stream_config.sample_rate.0, stream_config.channels, sample_format, stream_config.buffer_size
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, consumer, error_flag)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, consumer, error_flag)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, consumer, error_flag)?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

    info!("Audio stream started at {} Hz", stream_config.sample_rate.0);
    Ok((stream, stream_config.sample_rate.0))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: AudioConsumer,
    error_flag: Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let mut audio = consumer.pop_or_silence();
                    audio.clamp();
                    if channels == 1 {
                        frame[0] = T::from_sample((audio.left + audio.right) * 0.5);
                        continue;
                    }
                    for (i, sample) in frame.iter_mut().enumerate() {
                        let value = match i {
                            0 => audio.left,
                            1 => audio.right,
                            _ => 0.0,
                        };
                        *sample = T::from_sample(value);
                    }
                }
            },
            move |err| {
                error!("Audio stream error: {} - marking for restart", err);
                error_flag.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}
