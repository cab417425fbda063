//! The lyric/audio/scroll synchronization state machine.
//!
//! [`SyncController`] owns the display clock and arbitrates between the audio
//! clock and user scroll input once per frame:
//!
//! | From          | Trigger                             | To                        |
//! |---------------|-------------------------------------|---------------------------|
//! | `AutoPlay`    | scroll input                        | `UserScrub` (active)      |
//! | `AutoPlay`    | loop jump                           | `LoopCooling`             |
//! | `UserScrub`   | input stopped and momentum spent    | `IdleAuto`                |
//! | `IdleAuto`    | error above the hard threshold      | `AutoPlay` (snap)         |
//! | `IdleAuto`    | frozen for `stable_frames` frames   | `AutoPlay`                |
//! | `IdleAuto`    | scroll input                        | `UserScrub`               |
//! | `LoopCooling` | cooling period elapsed              | `AutoPlay` or `IdleAuto`  |
//!
//! Within a frame the order is fixed: consume input, poll the audio clock,
//! classify a loop jump, then run the state update.

use crate::adhesion::{Adhesion, AdhesionState, AdhesionStrategy};
use crate::audio::{AudioEngine, LoopJump};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::mapping::{scroll_extent, scroll_to_time, time_to_scroll};
use crate::scroll::{InputDelta, InputEvent, ScrollEngine, ScrollFrame, ScrollSurface};
use crate::time::wrap_time;
use crate::timeline::Timeline;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

const LOG_TARGET: &str = "lyricsync::sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Display follows the audio clock and drives the scroll surface
    #[default]
    AutoPlay,
    /// Scroll input drives the display and, while active, the audio
    UserScrub,
    /// Input has stopped; waiting for the display to settle on the audio clock
    IdleAuto,
    /// Audio just wrapped; display follows audio only and input is ignored
    LoopCooling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubPhase {
    /// Input arrived within the active timeout
    Active,
    /// Coasting on the remaining scroll momentum
    Inertia,
}

/// Events emitted by the sync controller
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    StateChanged {
        from: SyncState,
        to: SyncState,
    },
    /// The displayed lyric line changed
    LyricChanged {
        index: Option<usize>,
    },
    /// The audio clock wrapped back to the start
    LoopDetected {
        from: f64,
        to: f64,
        cooling_ms: f64,
    },
    PlaybackResumed,
    AudioError {
        message: String,
    },
}

/// What the rendering layer reads each frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSnapshot {
    pub display_time: f64,
    pub current_lyric_index: Option<usize>,
    pub state: SyncState,
    pub scrub_phase: Option<ScrubPhase>,
    pub audio_time: f64,
    pub audio_ready: bool,
    pub audio_playing: bool,
    pub audio_error: Option<String>,
    pub is_looping: bool,
    pub adhesion: AdhesionState,
}

/// Loop-cooling bookkeeping
#[derive(Debug, Clone, Copy, Default)]
struct Cooling {
    started_ms: f64,
    duration_ms: f64,
    last_wrap_time: f64,
}

/// Keeps a display clock consistent with an audio clock and a scroll surface.
pub struct SyncController<A, S> {
    config: SyncConfig,
    timeline: Arc<Timeline>,
    audio: A,
    surface: S,
    scroll: ScrollEngine,
    adhesion: Adhesion,
    state: SyncState,
    scrub_phase: ScrubPhase,
    display_time: f64,
    current_lyric_index: Option<usize>,
    is_looping: bool,
    cooling: Cooling,
    last_frame_ms: Option<f64>,
    frame_count: u64,
    resume_requested: bool,
    last_audio_error: Option<String>,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl<A: AudioEngine, S: ScrollSurface> SyncController<A, S> {
    /// Create a controller in the `AutoPlay` state.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::ConfigInvalid`] if the sync configuration
    /// fails validation.
    pub fn new(
        config: SyncConfig,
        timeline: Arc<Timeline>,
        mut audio: A,
        surface: S,
    ) -> Result<Self> {
        config.validate()?;

        let thresholds = timeline.loop_thresholds(&config.loop_cooling);
        audio.set_loop_threshold(thresholds.minor);

        let display_time = timeline.wrap(audio.current_time());
        let current_lyric_index = timeline.lyric_index(display_time, config.timeline.pre_roll);
        let (event_tx, _) = broadcast::channel(64);

        info!(
            target: LOG_TARGET,
            "Sync controller ready: {} lines, {:.3}s loop, {} audio",
            timeline.len(),
            timeline.duration(),
            audio.name()
        );

        Ok(Self {
            scroll: ScrollEngine::new(config.scroll.clone(), config.scrub.clone()),
            adhesion: Adhesion::new(config.adhesion.clone()),
            config,
            timeline,
            audio,
            surface,
            state: SyncState::AutoPlay,
            scrub_phase: ScrubPhase::Active,
            display_time,
            current_lyric_index,
            is_looping: false,
            cooling: Cooling::default(),
            last_frame_ms: None,
            frame_count: 0,
            resume_requested: false,
            last_audio_error: None,
            event_tx,
        })
    }

    /// Subscribe to sync events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Queue a host input event for the next frame.
    ///
    /// Input is dropped while loop cooling is in progress.
    pub fn handle_input(&mut self, event: InputEvent) -> Option<InputDelta> {
        if self.state == SyncState::LoopCooling {
            trace!(target: LOG_TARGET, "Ignoring input during loop cooling");
            return None;
        }
        self.refresh_scroll_scale();
        self.scroll.handle(event)
    }

    /// Advance one frame at host time `now_ms`.
    pub fn tick(&mut self, now_ms: f64) -> SyncSnapshot {
        let dt_ms = self.frame_delta(now_ms);
        self.frame_count = self.frame_count.wrapping_add(1);

        // Loop classification sees the state the frame started in
        let jump = self.audio.poll(now_ms);
        self.check_audio_error();
        if let Some(jump) = jump {
            self.on_loop_jump(jump, now_ms);
        }

        self.refresh_scroll_scale();
        let frame = self.scroll.take_frame(dt_ms);
        if frame.had_input && matches!(self.state, SyncState::AutoPlay | SyncState::IdleAuto) {
            self.enter_scrub();
        }

        match self.state {
            SyncState::AutoPlay => self.update_auto_play(dt_ms),
            SyncState::UserScrub => self.update_user_scrub(&frame, now_ms),
            SyncState::IdleAuto => self.update_idle_auto(dt_ms),
            SyncState::LoopCooling => self.update_loop_cooling(dt_ms, now_ms),
        }

        self.display_time = self.timeline.wrap(self.display_time);
        self.update_lyric_index();
        self.sample();

        self.snapshot()
    }

    #[must_use]
    pub fn snapshot(&self) -> SyncSnapshot {
        let audio = self.audio.state();
        SyncSnapshot {
            display_time: self.display_time,
            current_lyric_index: self.current_lyric_index,
            state: self.state,
            scrub_phase: (self.state == SyncState::UserScrub).then_some(self.scrub_phase),
            audio_time: audio.current_time,
            audio_ready: audio.is_ready,
            audio_playing: audio.is_playing,
            audio_error: audio.error.clone(),
            is_looping: self.is_looping,
            adhesion: *self.adhesion.state(),
        }
    }

    /// Start audio playback (user gesture or post-cooling resume).
    pub async fn play(&mut self) -> bool {
        if self.audio.play().await {
            info!(target: LOG_TARGET, "Playback resumed at {:.3}s", self.audio.current_time());
            let _ = self.event_tx.send(SyncEvent::PlaybackResumed);
            true
        } else {
            warn!(target: LOG_TARGET, "Playback did not start; display stays scroll-driven");
            self.check_audio_error();
            false
        }
    }

    pub fn pause(&mut self) {
        self.audio.pause();
    }

    /// Whether a cooling exit asked for playback to be restarted; clears the request.
    pub fn take_resume_request(&mut self) -> bool {
        std::mem::take(&mut self.resume_requested)
    }

    #[must_use]
    pub const fn state(&self) -> SyncState {
        self.state
    }

    #[must_use]
    pub const fn display_time(&self) -> f64 {
        self.display_time
    }

    #[must_use]
    pub const fn current_lyric_index(&self) -> Option<usize> {
        self.current_lyric_index
    }

    #[must_use]
    pub const fn is_looping(&self) -> bool {
        self.is_looping
    }

    #[must_use]
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub const fn audio(&self) -> &A {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut A {
        &mut self.audio
    }

    #[must_use]
    pub const fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    fn frame_delta(&mut self, now_ms: f64) -> f64 {
        let previous = self.last_frame_ms.replace(now_ms);
        match previous {
            Some(previous) if now_ms.is_finite() && previous.is_finite() => {
                (now_ms - previous).max(0.0)
            }
            _ => 0.0,
        }
    }

    fn refresh_scroll_scale(&mut self) {
        self.scroll.set_scale(
            self.surface.line_height(),
            self.timeline.average_entry_duration(),
        );
    }

    fn transition(&mut self, to: SyncState) {
        if self.state == to {
            return;
        }
        let from = std::mem::replace(&mut self.state, to);
        info!(target: LOG_TARGET, "{:?} -> {:?} at {:.3}s", from, to, self.display_time);
        let _ = self.event_tx.send(SyncEvent::StateChanged { from, to });
    }

    fn enter_scrub(&mut self) {
        self.scrub_phase = ScrubPhase::Active;
        self.transition(SyncState::UserScrub);
    }

    fn on_loop_jump(&mut self, jump: LoopJump, now_ms: f64) {
        match self.state {
            SyncState::AutoPlay | SyncState::LoopCooling => self.enter_cooling(jump, now_ms),
            SyncState::UserScrub => {
                debug!(
                    target: LOG_TARGET,
                    "Backward move {:.3}s -> {:.3}s during scrub is not a loop", jump.from, jump.to
                );
            }
            SyncState::IdleAuto => {
                debug!(
                    target: LOG_TARGET,
                    "Loop jump {:.3}s -> {:.3}s while idle, adhesion will resync", jump.from, jump.to
                );
            }
        }
    }

    fn enter_cooling(&mut self, jump: LoopJump, now_ms: f64) {
        let c = &self.config.loop_cooling;
        let thresholds = self.timeline.loop_thresholds(c);
        let ratio = (jump.magnitude() / thresholds.main).min(1.0);
        let duration_ms = (c.min_duration_ms + (c.max_duration_ms - c.min_duration_ms) * ratio)
            .clamp(c.min_duration_ms, c.max_duration_ms);

        if self.scroll.has_pending() {
            debug!(target: LOG_TARGET, "Dropping queued scroll input at loop wrap");
        }
        self.scroll.reset();
        self.is_looping = true;
        self.cooling = Cooling {
            started_ms: now_ms,
            duration_ms,
            last_wrap_time: jump.to,
        };
        self.adhesion.reset();

        info!(
            target: LOG_TARGET,
            "Loop detected {:.3}s -> {:.3}s, cooling for {:.0}ms", jump.from, jump.to, duration_ms
        );
        let _ = self.event_tx.send(SyncEvent::LoopDetected {
            from: jump.from,
            to: jump.to,
            cooling_ms: duration_ms,
        });
        self.transition(SyncState::LoopCooling);
    }

    /// Move the display towards the audio clock. Within the freeze band the
    /// display snaps to the audio position.
    fn follow_audio(&mut self, dt_ms: f64) {
        let duration = self.timeline.duration();
        let target = self.timeline.wrap(self.audio.current_time());
        let predicted = if self.audio.is_playing() {
            wrap_time(self.display_time + dt_ms / 1000.0, duration)
        } else {
            self.display_time
        };

        let next = self.adhesion.step(predicted, target, dt_ms, duration);
        self.display_time = if self.adhesion.state().strategy == AdhesionStrategy::Freeze {
            target
        } else {
            next
        };
    }

    /// Audio drives scroll: move the surface to the display time unless it is
    /// already within the scroll epsilon.
    fn sync_surface(&mut self) {
        let line_height = self.surface.line_height();
        if !line_height.is_finite() || line_height <= 0.0 {
            return;
        }
        let target = time_to_scroll(&self.timeline, self.display_time, line_height);
        let threshold = self.config.scroll.scroll_epsilon_lines * line_height;
        if (target - self.surface.scroll_position()).abs() >= threshold {
            self.surface.scroll_to_position(target);
        }
    }

    fn update_auto_play(&mut self, dt_ms: f64) {
        if self.audio.is_ready() {
            self.follow_audio(dt_ms);
        }
        self.sync_surface();
    }

    fn update_user_scrub(&mut self, frame: &ScrollFrame, now_ms: f64) {
        // Input consumed this frame counts as active even if its timestamp
        // went stale while the frame was delayed
        let phase = if frame.had_input || self.scroll.is_recent(now_ms) {
            Some(ScrubPhase::Active)
        } else if self.scroll.has_momentum() {
            Some(ScrubPhase::Inertia)
        } else {
            None
        };

        let Some(phase) = phase else {
            self.exit_scrub();
            return;
        };
        self.scrub_phase = phase;

        let line_height = self.surface.line_height();
        let extent = scroll_extent(&self.timeline, line_height);
        if extent <= 0.0 {
            // Surface not measured yet: nothing to map
            return;
        }

        let movement = if frame.had_input { frame.pixels } else { frame.inertia };
        let position = wrap_time(self.surface.scroll_position() + movement, extent);
        if movement != 0.0 {
            self.surface.scroll_to_position(position);
        }
        self.display_time = self
            .timeline
            .wrap(scroll_to_time(&self.timeline, position, line_height));

        if phase == ScrubPhase::Active {
            self.audio.seek(self.display_time);
        }
    }

    fn exit_scrub(&mut self) {
        self.scroll.reset();
        self.adhesion.reset();
        self.adhesion.reset_stable_frames();
        self.transition(SyncState::IdleAuto);
        // Audio catches up to where the user left the view
        self.audio.seek(self.display_time);
    }

    fn update_idle_auto(&mut self, dt_ms: f64) {
        if !self.audio.is_ready() {
            self.transition(SyncState::AutoPlay);
            self.sync_surface();
            return;
        }

        self.follow_audio(dt_ms);
        let adhesion = *self.adhesion.state();
        match adhesion.strategy {
            AdhesionStrategy::Hard => {
                debug!(
                    target: LOG_TARGET,
                    "Idle error {:.0}ms beyond hard threshold, snapped to audio",
                    adhesion.error.abs() * 1000.0
                );
                self.transition(SyncState::AutoPlay);
            }
            AdhesionStrategy::Freeze
                if adhesion.stable_frame_count >= self.config.monitor.stable_frames =>
            {
                self.transition(SyncState::AutoPlay);
            }
            _ => {}
        }
        self.sync_surface();
    }

    fn update_loop_cooling(&mut self, dt_ms: f64, now_ms: f64) {
        if self.audio.is_ready() {
            self.follow_audio(dt_ms);
        }
        self.sync_surface();

        if now_ms - self.cooling.started_ms < self.cooling.duration_ms {
            return;
        }

        self.is_looping = false;
        if !self.audio.is_playing() && !self.audio.auto_loops() {
            debug!(
                target: LOG_TARGET,
                "Media stopped after wrap to {:.3}s, restarting from the top", self.cooling.last_wrap_time
            );
            self.audio.seek(0.0);
            self.display_time = 0.0;
            self.resume_requested = true;
        }

        if self.adhesion.state().is_stable {
            self.transition(SyncState::AutoPlay);
        } else {
            self.adhesion.reset_stable_frames();
            self.transition(SyncState::IdleAuto);
        }
    }

    fn update_lyric_index(&mut self) {
        let index = self
            .timeline
            .lyric_index(self.display_time, self.config.timeline.pre_roll);
        if index != self.current_lyric_index {
            self.current_lyric_index = index;
            trace!(target: LOG_TARGET, "Lyric index -> {:?}", index);
            let _ = self.event_tx.send(SyncEvent::LyricChanged { index });
        }
    }

    fn check_audio_error(&mut self) {
        let error = &self.audio.state().error;
        if *error == self.last_audio_error {
            return;
        }
        self.last_audio_error.clone_from(error);
        if let Some(message) = error.clone() {
            warn!(target: LOG_TARGET, "Audio error: {}", message);
            let _ = self.event_tx.send(SyncEvent::AudioError { message });
        }
    }

    fn sample(&self) {
        let rate = u64::from(self.config.monitor.sample_rate);
        if rate == 0 || self.frame_count % rate != 0 {
            return;
        }
        let adhesion = self.adhesion.state();
        debug!(
            target: LOG_TARGET,
            state = ?self.state,
            display_time = self.display_time,
            audio_time = self.audio.current_time(),
            strategy = ?adhesion.strategy,
            error_ms = adhesion.error * 1000.0,
            stable_frames = adhesion.stable_frame_count,
            scroll_velocity = self.scroll.velocity(),
            "sync sample"
        );
    }
}
