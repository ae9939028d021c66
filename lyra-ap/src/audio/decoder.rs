//! Track reader on symphonia
//!
//! `probe` opens a file once to learn its format and length. `TrackReader`
//! is a read cursor over an opened track: it starts at an exact frame and
//! yields bounded chunks of interleaved stereo f32. A reader is owned by
//! exactly one party at a time; seeking discards the old reader and opens a
//! new one.

use crate::audio::types::{to_stereo, PcmChunk, TrackInfo, CHANNELS};
use crate::error::{Error, Result};
use lyra_common::{MediaFile, TrackIdentity};
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, trace, warn};

/// Consecutive undecodable packets tolerated before the stream is declared corrupt
const MAX_CONSECUTIVE_DECODE_ERRORS: usize = 3;

struct OpenedFormat {
    format: Box<dyn FormatReader>,
    track_id: u32,
    params: CodecParameters,
}

fn open_format(path: &Path, identity: &TrackIdentity) -> Result<OpenedFormat> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => Error::FileNotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::decode(identity, format!("Failed to probe format: {}", e)))?;

    let format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::decode(identity, "No audio track found"))?;

    Ok(OpenedFormat {
        track_id: track.id,
        params: track.codec_params.clone(),
        format,
    })
}

fn make_decoder(params: &CodecParameters, identity: &TrackIdentity) -> Result<Box<dyn Decoder>> {
    symphonia::default::get_codecs()
        .make(params, &DecoderOptions::default())
        .map_err(|e| Error::decode(identity, format!("Failed to create decoder: {}", e)))
}

fn ts_to_frame(ts: u64, time_base: Option<TimeBase>, sample_rate: u32) -> u64 {
    match time_base {
        Some(tb) => {
            let time = tb.calc_time(ts);
            ((time.seconds as f64 + time.frac) * sample_rate as f64).round() as u64
        }
        None => ts,
    }
}

/// Open `file` and read its format, rate and length
///
/// Length comes from the container header when present, otherwise from a
/// scan over packet durations.
pub fn probe(file: &MediaFile) -> Result<TrackInfo> {
    let identity = file.identity();
    let mut opened = open_format(&file.path, &identity)?;

    let sample_rate = opened
        .params
        .sample_rate
        .ok_or_else(|| Error::decode(&identity, "Sample rate not found"))?;
    let channels = opened.params.channels.map(|c| c.count() as u16).unwrap_or(2);

    // Fails early for codecs we cannot decode
    make_decoder(&opened.params, &identity)?;

    let total_frames = match opened.params.n_frames {
        Some(n) => n,
        None => {
            debug!("No frame count in header, scanning packets: {}", file.path.display());
            let mut duration_ts = 0u64;
            loop {
                match opened.format.next_packet() {
                    Ok(packet) if packet.track_id() == opened.track_id => {
                        duration_ts += packet.dur();
                    }
                    Ok(_) => {}
                    Err(SymphoniaError::IoError(ref e)) if e.kind() == ErrorKind::UnexpectedEof => {
                        break
                    }
                    Err(e) => {
                        return Err(Error::decode(&identity, format!("Packet scan failed: {}", e)))
                    }
                }
            }
            ts_to_frame(duration_ts, opened.params.time_base, sample_rate)
        }
    };

    let codec = symphonia::default::get_codecs()
        .get_codec(opened.params.codec)
        .map(|d| d.short_name.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    debug!(
        "Probed {}: codec={}, sample_rate={}, channels={}, frames={}",
        file.path.display(),
        codec,
        sample_rate,
        channels,
        total_frames
    );

    Ok(TrackInfo {
        identity,
        path: file.path.clone(),
        sample_rate,
        channels,
        total_frames,
        codec,
    })
}

/// Read cursor over one track
pub struct TrackReader {
    info: Arc<TrackInfo>,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    /// Frame index of `pending[0]`
    position: u64,
    /// Frame index the decoder will produce next
    decoded_position: u64,
    /// Frames before this index are decoded and dropped
    skip_to: u64,
    /// Decoded stereo samples not yet handed out
    pending: Vec<f32>,
    sample_buf: Option<SampleBuffer<f32>>,
    consecutive_errors: usize,
    exhausted: bool,
}

impl TrackReader {
    /// Open a reader positioned exactly at `start_frame`
    ///
    /// Uses an accurate container seek when the format supports one and
    /// otherwise decodes from the start and skips.
    pub fn open(info: Arc<TrackInfo>, start_frame: u64) -> Result<Self> {
        let opened = open_format(&info.path, &info.identity)?;
        let decoder = make_decoder(&opened.params, &info.identity)?;

        let mut reader = TrackReader {
            time_base: opened.params.time_base,
            track_id: opened.track_id,
            format: opened.format,
            decoder,
            info,
            position: start_frame,
            decoded_position: 0,
            skip_to: start_frame,
            pending: Vec::new(),
            sample_buf: None,
            consecutive_errors: 0,
            exhausted: false,
        };

        if start_frame > 0 && start_frame < reader.info.total_frames {
            if let Err(e) = reader.seek_container(start_frame) {
                debug!(
                    "Container seek unavailable for {} ({}), decoding from start",
                    reader.info.path.display(),
                    e
                );
                // The failed seek may have moved the stream
                let fresh = open_format(&reader.info.path, &reader.info.identity)?;
                reader.format = fresh.format;
                reader.decoder = make_decoder(&fresh.params, &reader.info.identity)?;
                reader.decoded_position = 0;
            }
        } else if start_frame >= reader.info.total_frames {
            reader.exhausted = true;
        }

        trace!(
            "Opened reader for {} at frame {}",
            reader.info.identity,
            start_frame
        );
        Ok(reader)
    }

    fn seek_container(&mut self, frame: u64) -> std::result::Result<(), SymphoniaError> {
        let rate = self.info.sample_rate as u64;
        let time = Time::new(frame / rate, (frame % rate) as f64 / rate as f64);
        let seeked = self.format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time,
                track_id: Some(self.track_id),
            },
        )?;
        self.decoder.reset();
        self.decoded_position = ts_to_frame(seeked.actual_ts, self.time_base, self.info.sample_rate);
        if self.decoded_position > frame {
            // Never start late; fall back to the slow path
            return Err(SymphoniaError::SeekError(
                symphonia::core::errors::SeekErrorKind::OutOfRange,
            ));
        }
        Ok(())
    }

    pub fn info(&self) -> &Arc<TrackInfo> {
        &self.info
    }

    /// Read up to `max_frames` frames
    ///
    /// An empty chunk means the track is exhausted.
    pub fn read_chunk(&mut self, max_frames: usize) -> Result<PcmChunk> {
        let wanted = max_frames * CHANNELS;
        let start_frame = self.position;
        let mut samples = Vec::with_capacity(wanted.min(1 << 22));

        loop {
            if !self.pending.is_empty() {
                let take = (wanted - samples.len()).min(self.pending.len());
                samples.extend(self.pending.drain(..take));
            }
            if samples.len() >= wanted || self.exhausted {
                break;
            }
            self.decode_next_packet()?;
        }

        self.position += (samples.len() / CHANNELS) as u64;
        Ok(PcmChunk {
            start_frame,
            samples,
            end_of_track: self.exhausted && self.pending.is_empty(),
        })
    }

    fn decode_next_packet(&mut self) -> Result<()> {
        let packet = match self.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == ErrorKind::UnexpectedEof => {
                self.exhausted = true;
                return Ok(());
            }
            Err(SymphoniaError::ResetRequired) => {
                self.decoder.reset();
                return Ok(());
            }
            Err(e) => {
                return Err(Error::decode(
                    &self.info.identity,
                    format!("Failed to read packet: {}", e),
                ))
            }
        };

        if packet.track_id() != self.track_id {
            return Ok(());
        }

        let decoded = match self.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                self.consecutive_errors += 1;
                warn!(
                    "Skipping undecodable packet in {} ({}/{}): {}",
                    self.info.identity, self.consecutive_errors, MAX_CONSECUTIVE_DECODE_ERRORS, msg
                );
                if self.consecutive_errors > MAX_CONSECUTIVE_DECODE_ERRORS {
                    return Err(Error::decode(&self.info.identity, msg));
                }
                return Ok(());
            }
            Err(e) => return Err(Error::decode(&self.info.identity, e.to_string())),
        };
        self.consecutive_errors = 0;

        let spec = *decoded.spec();
        let frames = decoded.frames();
        if frames == 0 {
            return Ok(());
        }

        let needs_new_buf = self
            .sample_buf
            .as_ref()
            .map_or(true, |b| b.capacity() < decoded.capacity() * spec.channels.count());
        if needs_new_buf {
            self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = self.sample_buf.as_mut() else {
            return Ok(());
        };
        buf.copy_interleaved_ref(decoded);

        let channels = spec.channels.count();
        let first = self.decoded_position;
        self.decoded_position += frames as u64;
        if self.decoded_position <= self.skip_to {
            return Ok(());
        }

        let skip = self.skip_to.saturating_sub(first) as usize;
        to_stereo(&buf.samples()[skip * channels..], channels, &mut self.pending);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_ts_to_frame_without_time_base() {
        assert_eq!(ts_to_frame(1234, None, 44100), 1234);
    }

    #[test]
    fn test_ts_to_frame_with_time_base() {
        let tb = TimeBase::new(1, 1000);
        assert_eq!(ts_to_frame(1500, Some(tb), 8000), 12_000);
    }

    #[test]
    fn test_probe_missing_file() {
        let file = MediaFile {
            name: "gone.mp3".into(),
            path: PathBuf::from("/definitely/not/here/gone.mp3"),
            size: 0,
            modification_date: None,
            is_directory: false,
            file_extension: "mp3".into(),
            identifier: None,
        };
        assert!(matches!(probe(&file), Err(Error::FileNotFound(_))));
    }
}
