//! Time representation for the playback pipeline.
//! All presentation timestamps are seconds (f64) relative to stream start.

/// Presentation time in seconds since stream start
pub type Seconds = f64;

/// Time constants for conversions
pub mod constants {
    pub const MICROS_PER_SECOND: i64 = 1_000_000;
    pub const MILLIS_PER_SECOND: i64 = 1_000;
}

/// Time zero constant
pub const ZERO: Seconds = 0.0;

/// Convert a stream timestamp expressed in time-base ticks to seconds.
/// The time base is the rational `num/den`: `ticks * num / den = seconds`.
pub fn ticks_to_seconds(ticks: i64, num: i32, den: i32) -> Seconds {
    if den == 0 {
        return ZERO;
    }
    // i128 keeps ticks * num exact for 90kHz streams of any length
    let scaled = ticks as i128 * num as i128 * constants::MICROS_PER_SECOND as i128 / den as i128;
    scaled as f64 / constants::MICROS_PER_SECOND as f64
}

/// Convert seconds to time-base ticks, rounding towards negative infinity
/// so a seek never lands after the requested position.
pub fn seconds_to_ticks(seconds: Seconds, num: i32, den: i32) -> i64 {
    if num == 0 {
        return 0;
    }
    let micros = (seconds * constants::MICROS_PER_SECOND as f64).floor() as i128;
    let num_scaled = num as i128 * constants::MICROS_PER_SECOND as i128;
    micros.saturating_mul(den as i128).div_euclid(num_scaled) as i64
}

/// Duration of one frame at the given rate; falls back to 30 fps for a
/// missing or nonsensical rate.
#[inline]
pub fn frame_interval(fps: f64) -> Seconds {
    if fps.is_finite() && fps > 0.0 {
        1.0 / fps
    } else {
        1.0 / 30.0
    }
}

/// Convert time to frame index given a frame rate
#[inline]
pub fn to_frame_index(seconds: Seconds, fps: f64) -> usize {
    (seconds.max(ZERO) * fps + 1e-9).floor() as usize
}

/// Convert frame index to time given a frame rate
#[inline]
pub fn from_frame_index(frame_index: usize, fps: f64) -> Seconds {
    frame_index as f64 * frame_interval(fps)
}

/// Clamp a position into `[0, duration]`. A non-finite position maps to zero.
#[inline]
pub fn clamp_position(seconds: Seconds, duration: Seconds) -> Seconds {
    if !seconds.is_finite() {
        return ZERO;
    }
    seconds.max(ZERO).min(duration.max(ZERO))
}

/// Format time as HH:MM:SS.mmm
pub fn format_time(seconds: Seconds) -> String {
    let total_millis = (seconds.max(ZERO) * constants::MILLIS_PER_SECOND as f64).round() as i64;
    let millis = total_millis % 1000;
    let total_seconds = total_millis / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}
