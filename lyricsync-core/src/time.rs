//! Time arithmetic shared by the timeline, audio engines and controller.
//!
//! All playback times are `f64` seconds and all frame timestamps are `f64`
//! milliseconds, mirroring what an animation-frame scheduler hands out.

use std::time::Duration;

/// Extension trait for converting durations into frame-clock milliseconds.
pub trait DurationExt {
    /// Convert duration to fractional milliseconds.
    fn as_frame_millis(&self) -> f64;
}

impl DurationExt for Duration {
    fn as_frame_millis(&self) -> f64 {
        self.as_secs_f64() * 1000.0
    }
}

/// Wrap `time` into `[0, duration)` using floor-mod semantics.
///
/// Returns `0.0` for a non-positive or non-finite duration, or a non-finite time.
#[must_use]
pub fn wrap_time(time: f64, duration: f64) -> f64 {
    if !time.is_finite() || !duration.is_finite() || duration <= 0.0 {
        return 0.0;
    }
    let wrapped = time.rem_euclid(duration);
    // rem_euclid can round up to `duration` for tiny negative inputs
    if wrapped >= duration {
        0.0
    } else {
        wrapped
    }
}

/// Shortest signed distance from `current` to `target` on a loop of length `duration`.
///
/// The result lies in `[-duration / 2, duration / 2)`.
#[must_use]
pub fn circular_delta(target: f64, current: f64, duration: f64) -> f64 {
    if !duration.is_finite() || duration <= 0.0 {
        return target - current;
    }
    let half = duration / 2.0;
    wrap_time(target - current + half, duration) - half
}

/// Clamp a frame delta (milliseconds) into `[min_ms, max_ms]`.
///
/// Non-finite or negative deltas collapse to `min_ms`.
#[must_use]
pub fn clamp_frame_delta(dt_ms: f64, min_ms: f64, max_ms: f64) -> f64 {
    if !dt_ms.is_finite() || dt_ms < 0.0 {
        return min_ms;
    }
    dt_ms.clamp(min_ms, max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_frame_millis() {
        assert!((Duration::from_micros(16_667).as_frame_millis() - 16.667).abs() < 1e-9);
        assert!(Duration::ZERO.as_frame_millis().abs() < f64::EPSILON);
    }

    #[test]
    fn test_wrap_time_range() {
        let duration = 30.0;
        for t in [-90.5, -30.0, -0.25, 0.0, 0.1, 12.5, 29.999, 30.0, 61.75, 1e6] {
            let wrapped = wrap_time(t, duration);
            assert!((0.0..duration).contains(&wrapped), "{t} wrapped to {wrapped}");
        }
    }

    #[test]
    fn test_wrap_time_periodic() {
        let duration = 30.0;
        for t in [-12.0, 0.0, 7.25, 29.5] {
            let a = wrap_time(t, duration);
            let b = wrap_time(t + duration, duration);
            assert!((a - b).abs() < 1e-9, "{t}: {a} != {b}");
        }
    }

    #[test]
    fn test_wrap_time_negative() {
        assert!((wrap_time(-5.0, 30.0) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_wrap_time_tiny_negative_stays_below_duration() {
        let wrapped = wrap_time(-1e-18, 30.0);
        assert!(wrapped < 30.0);
    }

    #[test]
    fn test_wrap_time_degenerate_inputs() {
        assert!(wrap_time(5.0, 0.0).abs() < f64::EPSILON);
        assert!(wrap_time(5.0, -3.0).abs() < f64::EPSILON);
        assert!(wrap_time(f64::NAN, 30.0).abs() < f64::EPSILON);
        assert!(wrap_time(5.0, f64::INFINITY).abs() < f64::EPSILON);
    }

    #[test]
    fn test_circular_delta_across_wrap() {
        // 14.9 -> 0.05 on a 15 s loop is a short step forward, not a 14.85 s jump back
        let delta = circular_delta(0.05, 14.9, 15.0);
        assert!((delta - 0.15).abs() < 1e-9);
        let delta = circular_delta(14.9, 0.05, 15.0);
        assert!((delta + 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_circular_delta_plain() {
        assert!((circular_delta(5.0, 3.0, 30.0) - 2.0).abs() < 1e-12);
        assert!((circular_delta(3.0, 5.0, 30.0) + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_clamp_frame_delta() {
        assert!((clamp_frame_delta(2.0, 8.0, 33.0) - 8.0).abs() < f64::EPSILON);
        assert!((clamp_frame_delta(16.0, 8.0, 33.0) - 16.0).abs() < f64::EPSILON);
        assert!((clamp_frame_delta(500.0, 8.0, 33.0) - 33.0).abs() < f64::EPSILON);
        assert!((clamp_frame_delta(f64::NAN, 8.0, 33.0) - 8.0).abs() < f64::EPSILON);
        assert!((clamp_frame_delta(-4.0, 8.0, 33.0) - 8.0).abs() < f64::EPSILON);
    }
}
