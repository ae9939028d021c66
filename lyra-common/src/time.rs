//! Time and frame conversion utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert seconds to the nearest frame index at `sample_rate`
pub fn seconds_to_frames(seconds: f64, sample_rate: u32) -> u64 {
    (seconds.max(0.0) * sample_rate as f64).round() as u64
}

/// Convert a frame count to seconds at `sample_rate`
pub fn frames_to_seconds(frames: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    frames as f64 / sample_rate as f64
}

/// Format seconds as `m:ss`, or `h:mm:ss` past one hour
pub fn format_position(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_conversions() {
        assert_eq!(seconds_to_frames(1.0, 44100), 44100);
        assert_eq!(seconds_to_frames(0.5, 48000), 24000);
        assert_eq!(seconds_to_frames(-3.0, 44100), 0);
        assert_eq!(frames_to_seconds(22050, 44100), 0.5);
        assert_eq!(frames_to_seconds(10, 0), 0.0);
    }

    #[test]
    fn test_round_trip_within_one_frame() {
        let rate = 44100;
        for &t in &[0.0, 1.234_567, 59.999, 170.0] {
            let back = frames_to_seconds(seconds_to_frames(t, rate), rate);
            assert!((back - t).abs() <= 1.0 / rate as f64);
        }
    }

    #[test]
    fn test_format_position() {
        assert_eq!(format_position(0.0), "0:00");
        assert_eq!(format_position(65.9), "1:05");
        assert_eq!(format_position(3725.0), "1:02:05");
    }
}
