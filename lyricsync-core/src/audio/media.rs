use super::{clamp_volume, AudioEngine, AudioEngineState, LoopDetector, LoopJump, LOG_TARGET};
use crate::config::AudioConfig;
use crate::error::MediaError;
use async_trait::async_trait;
use tracing::{debug, error, info, trace, warn};

/// A host media playback primitive (an `<audio>` element, a native player, ...).
///
/// Implementations only mirror the primitive; all policy lives in
/// [`MediaAudioEngine`].
#[async_trait]
pub trait MediaElement: Send {
    /// Current playback position in seconds (may be NaN before metadata loads).
    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, time: f64);

    /// Media length in seconds (NaN or infinite while unknown).
    fn duration(&self) -> f64;

    fn is_paused(&self) -> bool;

    /// Whether the primitive restarts from zero by itself at the end.
    fn loops(&self) -> bool;

    fn set_volume(&mut self, volume: f64);

    /// Begin playback; resolves once the host accepts or rejects the request.
    async fn start(&mut self) -> Result<(), MediaError>;

    fn stop(&mut self);
}

/// Notifications delivered by the host about the media primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    LoadedMetadata { duration: f64 },
    CanPlay,
    Play,
    Pause,
    Seeked,
    TimeUpdate,
    Progress { buffered: f64 },
    Waiting,
    Stalled,
    Ended,
    Error { message: String },
}

/// [`AudioEngine`] backed by a [`MediaElement`].
///
/// While playing, [`AudioEngine::poll`] reads the primitive's position every
/// frame instead of relying on low-frequency `timeupdate` events, and
/// classifies backward jumps through a [`LoopDetector`].
pub struct MediaAudioEngine<M> {
    media: M,
    state: AudioEngineState,
    detector: LoopDetector,
    polling: bool,
    seek_epsilon: f64,
    /// Wrap synthesised from an `ended` event on non-looping media
    pending_wrap: Option<LoopJump>,
}

impl<M: MediaElement> MediaAudioEngine<M> {
    #[must_use]
    pub fn new(mut media: M, config: &AudioConfig) -> Self {
        let volume = clamp_volume(config.volume);
        media.set_volume(volume);
        let duration = finite_or_zero(media.duration());

        Self {
            media,
            state: AudioEngineState {
                duration,
                volume,
                ..AudioEngineState::default()
            },
            detector: LoopDetector::default(),
            polling: false,
            seek_epsilon: config.seek_epsilon_ms.max(0.0) / 1000.0,
            pending_wrap: None,
        }
    }

    #[must_use]
    pub const fn media(&self) -> &M {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut M {
        &mut self.media
    }

    /// Whether the per-frame poll currently reads the primitive.
    #[must_use]
    pub const fn is_polling(&self) -> bool {
        self.polling
    }

    /// Apply a host notification to the engine state.
    pub fn handle_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::LoadedMetadata { duration } => {
                // A new source starts its own timeline
                self.detector.clear();
                self.state.duration = finite_or_zero(duration);
                debug!(target: LOG_TARGET, "Media metadata loaded: {:.3}s", self.state.duration);
            }
            MediaEvent::CanPlay => {
                if !self.state.is_ready {
                    info!(target: LOG_TARGET, "Media ready");
                }
                self.state.is_ready = true;
                let duration = finite_or_zero(self.media.duration());
                if duration > 0.0 {
                    self.state.duration = duration;
                }
            }
            MediaEvent::Play => {
                self.state.is_playing = true;
                self.polling = true;
                self.detector.rebase(self.media.current_time());
            }
            MediaEvent::Pause => {
                self.state.is_playing = false;
                self.polling = false;
                self.refresh_time();
            }
            MediaEvent::Seeked => {
                self.refresh_time();
                self.detector.rebase(self.state.current_time);
            }
            MediaEvent::TimeUpdate => {
                // Low-frequency fallback while the frame poll is idle
                if !self.polling {
                    self.refresh_time();
                    self.detector.rebase(self.state.current_time);
                }
            }
            MediaEvent::Progress { buffered } => {
                trace!(target: LOG_TARGET, "Media buffered to {:.3}s", buffered);
            }
            MediaEvent::Waiting => {
                debug!(target: LOG_TARGET, "Media waiting for data");
            }
            MediaEvent::Stalled => {
                warn!(target: LOG_TARGET, "Media stalled at {:.3}s", self.state.current_time);
            }
            MediaEvent::Ended => self.handle_ended(),
            MediaEvent::Error { message } => {
                error!(target: LOG_TARGET, "Media error: {}", message);
                self.state.error = Some(
                    MediaError::LoadFailed {
                        reason: message,
                    }
                    .to_string(),
                );
                self.state.is_ready = false;
                self.state.is_playing = false;
                self.polling = false;
            }
        }
    }

    fn handle_ended(&mut self) {
        if self.media.loops() {
            // Looping media reports the wrap through the position poll
            trace!(target: LOG_TARGET, "Ignoring ended event on looping media");
            return;
        }
        let from = self.state.current_time.max(finite_or_zero(self.media.current_time()));
        debug!(target: LOG_TARGET, "Media ended at {:.3}s, rewinding", from);

        self.media.set_current_time(0.0);
        self.state.current_time = 0.0;
        self.state.is_playing = false;
        self.polling = false;
        self.detector.rebase(0.0);
        self.pending_wrap = Some(LoopJump { from, to: 0.0 });
    }

    fn refresh_time(&mut self) {
        let time = self.media.current_time();
        if time.is_finite() {
            self.state.current_time = time;
        }
    }
}

#[async_trait]
impl<M: MediaElement> AudioEngine for MediaAudioEngine<M> {
    fn name(&self) -> &'static str {
        "media"
    }

    async fn play(&mut self) -> bool {
        if !self.state.is_ready {
            warn!(target: LOG_TARGET, "Cannot play: media not ready");
            self.state.error = Some(MediaError::NotReady.to_string());
            return false;
        }

        match self.media.start().await {
            Ok(()) => {
                self.state.is_playing = true;
                self.state.error = None;
                self.polling = true;
                self.refresh_time();
                self.detector.rebase(self.state.current_time);
                info!(target: LOG_TARGET, "Playback started at {:.3}s", self.state.current_time);
                true
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Playback start failed: {}", e);
                self.state.is_playing = false;
                self.state.error = Some(e.to_string());
                false
            }
        }
    }

    fn pause(&mut self) {
        if !self.state.is_ready {
            debug!(target: LOG_TARGET, "Ignoring pause: media not ready");
            return;
        }
        self.media.stop();
        self.state.is_playing = false;
        self.polling = false;
        self.refresh_time();
    }

    fn seek(&mut self, time: f64) {
        if !self.state.is_ready {
            debug!(target: LOG_TARGET, "Ignoring seek to {:.3}s: media not ready", time);
            return;
        }
        if !time.is_finite() {
            return;
        }
        let upper = if self.state.duration > 0.0 {
            self.state.duration
        } else {
            f64::MAX
        };
        let time = time.clamp(0.0, upper);
        if (time - self.state.current_time).abs() < self.seek_epsilon {
            return;
        }

        self.media.set_current_time(time);
        self.state.current_time = time;
        self.detector.rebase(time);
    }

    fn current_time(&self) -> f64 {
        self.state.current_time
    }

    fn state(&self) -> &AudioEngineState {
        &self.state
    }

    fn poll(&mut self, _now_ms: f64) -> Option<LoopJump> {
        if let Some(jump) = self.pending_wrap.take() {
            return Some(jump);
        }
        if !self.polling {
            return None;
        }

        let time = self.media.current_time();
        if !time.is_finite() {
            return None;
        }
        self.state.current_time = time;

        if self.media.is_paused() {
            debug!(target: LOG_TARGET, "Media paused outside the engine at {:.3}s", time);
            self.state.is_playing = false;
            self.polling = false;
        }

        let jump = self.detector.observe(time);
        if let Some(jump) = jump {
            debug!(
                target: LOG_TARGET,
                "Loop detected: {:.3}s -> {:.3}s", jump.from, jump.to
            );
        }
        jump
    }

    fn auto_loops(&self) -> bool {
        self.media.loops()
    }

    fn set_loop_threshold(&mut self, minor: f64) {
        self.detector.set_minor_threshold(minor);
    }

    fn set_volume(&mut self, volume: f64) {
        let volume = clamp_volume(volume);
        self.media.set_volume(volume);
        self.state.volume = volume;
    }

    fn clear_error(&mut self) {
        self.state.error = None;
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory stand-in for a host media element.
    #[derive(Debug, Default)]
    struct FakeMedia {
        time: f64,
        duration: f64,
        paused: bool,
        looping: bool,
        volume: f64,
        reject: Option<MediaError>,
        writes: Vec<f64>,
    }

    impl FakeMedia {
        fn new(duration: f64) -> Self {
            Self {
                duration,
                paused: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl MediaElement for FakeMedia {
        fn current_time(&self) -> f64 {
            self.time
        }

        fn set_current_time(&mut self, time: f64) {
            self.time = time;
            self.writes.push(time);
        }

        fn duration(&self) -> f64 {
            self.duration
        }

        fn is_paused(&self) -> bool {
            self.paused
        }

        fn loops(&self) -> bool {
            self.looping
        }

        fn set_volume(&mut self, volume: f64) {
            self.volume = volume;
        }

        async fn start(&mut self) -> Result<(), MediaError> {
            if let Some(err) = self.reject.clone() {
                return Err(err);
            }
            self.paused = false;
            Ok(())
        }

        fn stop(&mut self) {
            self.paused = true;
        }
    }

    fn ready_engine(duration: f64) -> MediaAudioEngine<FakeMedia> {
        let mut engine = MediaAudioEngine::new(FakeMedia::new(duration), &AudioConfig::default());
        engine.handle_event(MediaEvent::CanPlay);
        engine.set_loop_threshold(0.5);
        engine
    }

    #[tokio::test]
    async fn test_play_before_ready_fails_softly() {
        let mut engine = MediaAudioEngine::new(FakeMedia::new(30.0), &AudioConfig::default());
        assert!(!engine.play().await);
        assert!(!engine.state().is_playing);
        assert_eq!(engine.state().error.as_deref(), Some("media not ready"));
        engine.seek(10.0);
        assert!(engine.media().writes.is_empty());
    }

    #[tokio::test]
    async fn test_autoplay_rejection_is_recorded() {
        let mut engine = ready_engine(30.0);
        engine.media_mut().reject = Some(MediaError::PlaybackRejected {
            reason: "user gesture required".to_string(),
        });
        assert!(!engine.play().await);
        assert!(!engine.is_polling());
        assert!(engine
            .state()
            .error
            .as_deref()
            .is_some_and(|e| e.contains("user gesture required")));

        engine.media_mut().reject = None;
        assert!(engine.play().await);
        assert!(engine.state().error.is_none());
        assert!(engine.is_polling());
    }

    #[tokio::test]
    async fn test_poll_reads_media_every_frame_while_playing() {
        let mut engine = ready_engine(30.0);
        assert!(engine.play().await);
        engine.media_mut().time = 1.25;
        assert!(engine.poll(16.0).is_none());
        assert!((engine.current_time() - 1.25).abs() < f64::EPSILON);

        engine.pause();
        engine.media_mut().time = 9.0;
        engine.poll(32.0);
        assert!((engine.current_time() - 1.25).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_poll_detects_wrap_but_not_seek() {
        let mut engine = ready_engine(30.0);
        assert!(engine.play().await);

        for t in [29.8, 29.9] {
            engine.media_mut().time = t;
            assert!(engine.poll(0.0).is_none());
        }
        engine.media_mut().time = 0.1;
        let jump = engine.poll(0.0).unwrap();
        assert!((jump.from - 29.9).abs() < 1e-12);

        engine.media_mut().time = 20.0;
        engine.poll(0.0);
        engine.seek(5.0);
        engine.media_mut().time = 5.02;
        assert!(engine.poll(0.0).is_none());
    }

    #[tokio::test]
    async fn test_seek_clamps_and_skips_tiny_moves() {
        let mut engine = ready_engine(30.0);
        engine.seek(45.0);
        assert!((engine.current_time() - 30.0).abs() < f64::EPSILON);
        engine.seek(-3.0);
        assert!(engine.current_time().abs() < f64::EPSILON);
        engine.seek(0.004);
        assert_eq!(engine.media().writes, vec![30.0, 0.0]);
    }

    #[tokio::test]
    async fn test_ended_on_non_looping_media_reports_wrap() {
        let mut engine = ready_engine(30.0);
        assert!(engine.play().await);
        engine.media_mut().time = 29.99;
        engine.poll(0.0);

        engine.handle_event(MediaEvent::Ended);
        assert!(!engine.state().is_playing);
        let jump = engine.poll(16.0).unwrap();
        assert!((jump.from - 29.99).abs() < 1e-12);
        assert!(jump.to.abs() < f64::EPSILON);
        assert!(engine.poll(32.0).is_none());
    }

    #[tokio::test]
    async fn test_ended_on_looping_media_is_ignored() {
        let mut engine = ready_engine(30.0);
        engine.media_mut().looping = true;
        assert!(engine.play().await);
        engine.handle_event(MediaEvent::Ended);
        assert!(engine.state().is_playing);
        assert!(engine.auto_loops());
    }

    #[tokio::test]
    async fn test_error_event_marks_not_ready() {
        let mut engine = ready_engine(30.0);
        assert!(engine.play().await);
        engine.handle_event(MediaEvent::Error {
            message: "decode failed".to_string(),
        });
        assert!(!engine.state().is_ready);
        assert!(!engine.state().is_playing);
        assert!(engine.state().error.is_some());
        assert!(!engine.play().await);
    }

    #[test]
    fn test_volume_is_clamped() {
        let mut engine = ready_engine(30.0);
        engine.set_volume(3.0);
        assert!((engine.state().volume - 1.0).abs() < f64::EPSILON);
        assert!((engine.media().volume - 1.0).abs() < f64::EPSILON);
        engine.set_volume(-1.0);
        assert!(engine.state().volume.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_reset_pauses_rewinds_and_clears_error() {
        let mut engine = ready_engine(30.0);
        assert!(engine.play().await);
        engine.media_mut().time = 12.0;
        engine.poll(0.0);
        engine.state.error = Some("stale".to_string());

        engine.reset();
        assert!(!engine.state().is_playing);
        assert!(engine.current_time().abs() < f64::EPSILON);
        assert!(engine.state().error.is_none());
    }

    #[test]
    fn test_metadata_updates_duration() {
        let mut engine = MediaAudioEngine::new(FakeMedia::new(f64::NAN), &AudioConfig::default());
        assert!(engine.state().duration.abs() < f64::EPSILON);
        engine.handle_event(MediaEvent::LoadedMetadata { duration: 42.0 });
        assert!((engine.state().duration - 42.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_new_source_is_not_a_wrap() {
        let mut engine = ready_engine(30.0);
        assert!(engine.play().await);
        engine.media_mut().time = 25.0;
        assert!(engine.poll(0.0).is_none());

        engine.handle_event(MediaEvent::LoadedMetadata { duration: 42.0 });
        engine.media_mut().time = 0.0;
        assert!(engine.poll(16.0).is_none());
    }
}
