use super::{clamp_volume, AudioEngine, AudioEngineState, LoopDetector, LoopJump, LOG_TARGET};
use crate::config::AudioConfig;
use crate::time::wrap_time;
use async_trait::async_trait;
use tracing::{debug, info};

/// Audio clock driven purely by frame timestamps.
///
/// Used when no media is attached. Advances by the wall-clock delta between
/// polls while playing and either wraps or stops at the end of the loop.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    state: AudioEngineState,
    looping: bool,
    detector: LoopDetector,
    last_frame_ms: Option<f64>,
    seek_epsilon: f64,
}

impl SimulatedClock {
    #[must_use]
    pub fn new(duration: f64, looping: bool) -> Self {
        let duration = if duration.is_finite() && duration > 0.0 {
            duration
        } else {
            0.0
        };
        Self {
            state: AudioEngineState {
                duration,
                volume: 1.0,
                is_ready: duration > 0.0,
                ..AudioEngineState::default()
            },
            looping,
            detector: LoopDetector::default(),
            last_frame_ms: None,
            seek_epsilon: 0.0,
        }
    }

    /// Clock for a loop of `duration` seconds using the audio section's settings.
    #[must_use]
    pub fn from_config(config: &AudioConfig, duration: f64) -> Self {
        let mut clock = Self::new(duration, config.auto_loop);
        clock.state.volume = clamp_volume(config.volume);
        clock.seek_epsilon = config.seek_epsilon_ms.max(0.0) / 1000.0;
        clock
    }
}

#[async_trait]
impl AudioEngine for SimulatedClock {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn play(&mut self) -> bool {
        if !self.state.is_ready {
            self.state.error = Some("simulated clock has no duration".to_string());
            return false;
        }
        if self.state.current_time >= self.state.duration {
            self.state.current_time = 0.0;
            self.detector.rebase(0.0);
        }
        if !self.state.is_playing {
            info!(target: LOG_TARGET, "Simulated playback started at {:.3}s", self.state.current_time);
        }
        self.state.is_playing = true;
        self.state.error = None;
        self.last_frame_ms = None;
        true
    }

    fn pause(&mut self) {
        self.state.is_playing = false;
        self.last_frame_ms = None;
    }

    fn seek(&mut self, time: f64) {
        if !self.state.is_ready || !time.is_finite() {
            return;
        }
        let time = time.clamp(0.0, self.state.duration);
        if (time - self.state.current_time).abs() < self.seek_epsilon {
            return;
        }
        self.state.current_time = time;
        self.detector.rebase(time);
    }

    fn current_time(&self) -> f64 {
        self.state.current_time
    }

    fn state(&self) -> &AudioEngineState {
        &self.state
    }

    fn poll(&mut self, now_ms: f64) -> Option<LoopJump> {
        let last = self.last_frame_ms.replace(now_ms);
        if !self.state.is_playing {
            return None;
        }
        let last = last?;

        let elapsed = ((now_ms - last) / 1000.0).max(0.0);
        let advanced = self.state.current_time + elapsed;
        if advanced < self.state.duration {
            self.state.current_time = advanced;
            return self.detector.observe(advanced);
        }

        if self.looping {
            let wrapped = wrap_time(advanced, self.state.duration);
            self.state.current_time = wrapped;
            return self.detector.observe(wrapped);
        }

        debug!(target: LOG_TARGET, "Simulated clock reached the end, rewinding");
        let from = self.state.duration;
        self.state.current_time = 0.0;
        self.state.is_playing = false;
        self.last_frame_ms = None;
        self.detector.rebase(0.0);
        Some(LoopJump { from, to: 0.0 })
    }

    fn auto_loops(&self) -> bool {
        self.looping
    }

    fn set_loop_threshold(&mut self, minor: f64) {
        self.detector.set_minor_threshold(minor);
    }

    fn set_volume(&mut self, volume: f64) {
        self.state.volume = clamp_volume(volume);
    }

    fn clear_error(&mut self) {
        self.state.error = None;
    }
}
