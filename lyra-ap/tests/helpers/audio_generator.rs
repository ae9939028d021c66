//! Audio test file generation
//!
//! Mono 16-bit sine WAVs at a low sample rate keep long fixtures small:
//! three minutes at 8 kHz is under 3 MB.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Sample rate of generated fixtures
pub const TEST_SAMPLE_RATE: u32 = 8000;

/// Write `seconds` of a sine wave at `frequency_hz`
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    seconds: f64,
    frequency_hz: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;

    let frames = (seconds * TEST_SAMPLE_RATE as f64).round() as u64;
    for i in 0..frames {
        let t = i as f32 / TEST_SAMPLE_RATE as f32;
        let sample = (2.0 * PI * frequency_hz * t).sin() * 0.5;
        writer.write_sample((sample * i16::MAX as f32) as i16)?;
    }
    writer.finalize()
}

/// Write bytes no decoder accepts, under an audio extension
pub fn write_garbage_file<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    let junk: Vec<u8> = (0..4096u32).map(|i| (i.wrapping_mul(31) % 251) as u8).collect();
    std::fs::write(path, junk)
}
