//! Audio clock strategies.
//!
//! The sync controller only talks to the [`AudioEngine`] trait. Two
//! strategies implement it:
//!
//! - [`MediaAudioEngine`] wraps a host playback primitive ([`MediaElement`])
//!   and polls its position once per frame.
//! - [`SimulatedClock`] advances its own position from frame timestamps and
//!   stands in when no real media is available.

mod loop_detect;
mod media;
mod simulated;

pub use loop_detect::{LoopDetector, LoopJump};
pub use media::{MediaAudioEngine, MediaElement, MediaEvent};
pub use simulated::SimulatedClock;

use async_trait::async_trait;

const LOG_TARGET: &str = "lyricsync::audio";

/// Snapshot of an engine's playback state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioEngineState {
    pub is_playing: bool,
    /// Last polled media position in seconds
    pub current_time: f64,
    /// Media length in seconds (0 while unknown)
    pub duration: f64,
    /// Output volume in `[0, 1]`
    pub volume: f64,
    pub is_ready: bool,
    /// Most recent failure, cleared by a successful `play` or `reset`
    pub error: Option<String>,
}

/// The single external clock authority consumed by the sync controller.
///
/// Every method except [`AudioEngine::play`] is synchronous. None of them
/// panic or return errors across this boundary: failures are recorded in
/// [`AudioEngineState::error`] and logged.
#[async_trait]
pub trait AudioEngine: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Start playback and high-frequency polling.
    ///
    /// Returns `false` and records an error if the media is not ready or the
    /// host rejected playback.
    async fn play(&mut self) -> bool;

    /// Stop playback and high-frequency polling.
    fn pause(&mut self);

    /// Move playback to `time` seconds, clamped to `[0, duration]`.
    ///
    /// Seeks within a small epsilon of the current position are dropped.
    fn seek(&mut self, time: f64);

    /// Position cached by the most recent poll or seek.
    fn current_time(&self) -> f64;

    fn state(&self) -> &AudioEngineState;

    /// Per-frame poll. Refreshes the cached position and reports a backward
    /// jump of the media clock that was not caused by [`AudioEngine::seek`].
    fn poll(&mut self, now_ms: f64) -> Option<LoopJump>;

    /// Whether the primitive wraps to the start on its own at the end of media.
    fn auto_loops(&self) -> bool;

    /// Backward jumps smaller than `minor` seconds are treated as clock jitter.
    fn set_loop_threshold(&mut self, minor: f64);

    fn set_volume(&mut self, volume: f64);

    fn clear_error(&mut self);

    /// Pause, rewind to the start and clear any recorded error.
    fn reset(&mut self) {
        self.pause();
        self.seek(0.0);
        self.clear_error();
    }

    fn is_playing(&self) -> bool {
        self.state().is_playing
    }

    fn is_ready(&self) -> bool {
        self.state().is_ready
    }
}

#[async_trait]
impl<T: AudioEngine + ?Sized> AudioEngine for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn play(&mut self) -> bool {
        (**self).play().await
    }

    fn pause(&mut self) {
        (**self).pause();
    }

    fn seek(&mut self, time: f64) {
        (**self).seek(time);
    }

    fn current_time(&self) -> f64 {
        (**self).current_time()
    }

    fn state(&self) -> &AudioEngineState {
        (**self).state()
    }

    fn poll(&mut self, now_ms: f64) -> Option<LoopJump> {
        (**self).poll(now_ms)
    }

    fn auto_loops(&self) -> bool {
        (**self).auto_loops()
    }

    fn set_loop_threshold(&mut self, minor: f64) {
        (**self).set_loop_threshold(minor);
    }

    fn set_volume(&mut self, volume: f64) {
        (**self).set_volume(volume);
    }

    fn clear_error(&mut self) {
        (**self).clear_error();
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

fn clamp_volume(volume: f64) -> f64 {
    if volume.is_finite() {
        volume.clamp(0.0, 1.0)
    } else {
        1.0
    }
}
