//! Scroll input normalization and per-frame coalescing.
//!
//! Host listeners feed raw wheel, touch and key events into
//! [`ScrollEngine::handle`]. Each source owns a single mailbox slot that
//! accumulates until the next frame calls [`ScrollEngine::take_frame`], so a
//! burst of wheel events inside one frame becomes one effective delta.

use crate::config::{ScrollConfig, ScrubConfig};
use tracing::trace;

const LOG_TARGET: &str = "lyricsync::scroll";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSource {
    Wheel,
    Touch,
    Keyboard,
}

impl InputSource {
    const COUNT: usize = 3;

    const fn slot(self) -> usize {
        match self {
            Self::Wheel => 0,
            Self::Touch => 1,
            Self::Keyboard => 2,
        }
    }
}

/// Unit of a wheel event's `delta_y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WheelDeltaMode {
    #[default]
    Pixel,
    Line,
    Page,
}

/// Navigation keys understood by the scroll engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    PageUp,
    PageDown,
}

impl Key {
    /// Map a host key code. `W`/`S` alias the arrow keys.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "ArrowUp" | "KeyW" | "w" | "W" => Some(Self::Up),
            "ArrowDown" | "KeyS" | "s" | "S" => Some(Self::Down),
            "PageUp" => Some(Self::PageUp),
            "PageDown" => Some(Self::PageDown),
            _ => None,
        }
    }
}

/// Host input before normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawInput {
    Wheel { delta_y: f64, delta_mode: WheelDeltaMode },
    TouchStart { client_y: f64 },
    TouchMove { client_y: f64 },
    TouchEnd,
    Key { key: Key },
}

/// A raw input stamped with the host's event time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputEvent {
    pub input: RawInput,
    pub timestamp_ms: f64,
}

impl InputEvent {
    #[must_use]
    pub const fn new(input: RawInput, timestamp_ms: f64) -> Self {
        Self { input, timestamp_ms }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollDirection {
    Backward = -1,
    #[default]
    None = 0,
    Forward = 1,
}

impl ScrollDirection {
    fn of(value: f64) -> Self {
        if value > 0.0 {
            Self::Forward
        } else if value < 0.0 {
            Self::Backward
        } else {
            Self::None
        }
    }
}

/// Normalized input: how far, which way, when and from where.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputDelta {
    /// Equivalent playback distance in seconds
    pub value: f64,
    /// Scroll distance in pixels
    pub pixels: f64,
    pub direction: ScrollDirection,
    pub timestamp_ms: f64,
    pub source: InputSource,
}

/// Everything the controller needs from one frame of scroll input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollFrame {
    /// Sum of all input deltas since the previous frame
    pub pixels: f64,
    /// Distance the surface coasts this frame when no input arrived
    pub inertia: f64,
    /// Smoothed scroll velocity in pixels per second
    pub velocity: f64,
    /// Whether any input arrived since the previous frame
    pub had_input: bool,
}

/// Normalizes, coalesces and tracks the momentum of user scroll input.
#[derive(Debug, Clone)]
pub struct ScrollEngine {
    config: ScrollConfig,
    scrub: ScrubConfig,
    line_height: f64,
    seconds_per_line: f64,
    mailbox: [Option<InputDelta>; InputSource::COUNT],
    velocity: f64,
    last_input_ms: Option<f64>,
    touch_y: Option<f64>,
}

impl ScrollEngine {
    #[must_use]
    pub fn new(config: ScrollConfig, scrub: ScrubConfig) -> Self {
        Self {
            config,
            scrub,
            line_height: 0.0,
            seconds_per_line: 0.0,
            mailbox: [None; InputSource::COUNT],
            velocity: 0.0,
            last_input_ms: None,
            touch_y: None,
        }
    }

    /// Update the pixel and time size of one lyric line.
    pub fn set_scale(&mut self, line_height: f64, seconds_per_line: f64) {
        self.line_height = if line_height.is_finite() { line_height.max(0.0) } else { 0.0 };
        self.seconds_per_line = if seconds_per_line.is_finite() {
            seconds_per_line.max(0.0)
        } else {
            0.0
        };
    }

    /// Normalize one host event and merge it into its source's mailbox slot.
    ///
    /// Returns the normalized delta, or `None` for events that carry no
    /// movement (touch start/end, zero wheel deltas).
    pub fn handle(&mut self, event: InputEvent) -> Option<InputDelta> {
        let (pixels, source) = match event.input {
            RawInput::Wheel { delta_y, delta_mode } => {
                let unit = match delta_mode {
                    WheelDeltaMode::Pixel => 1.0,
                    WheelDeltaMode::Line => self.config.wheel_line_px,
                    WheelDeltaMode::Page => self.config.wheel_page_px,
                };
                (delta_y * unit, InputSource::Wheel)
            }
            RawInput::TouchStart { client_y } => {
                self.touch_y = Some(client_y);
                self.velocity = 0.0;
                return None;
            }
            RawInput::TouchMove { client_y } => {
                let previous = self.touch_y.replace(client_y)?;
                // Dragging the finger up scrolls the content down
                ((previous - client_y) * self.config.touch_gain, InputSource::Touch)
            }
            RawInput::TouchEnd => {
                self.touch_y = None;
                return None;
            }
            RawInput::Key { key } => {
                let step = self.config.key_step_lines * self.line_height;
                let pixels = match key {
                    Key::Up => -step,
                    Key::Down => step,
                    Key::PageUp => -self.config.wheel_page_px,
                    Key::PageDown => self.config.wheel_page_px,
                };
                (pixels, InputSource::Keyboard)
            }
        };

        if !pixels.is_finite() || pixels == 0.0 {
            return None;
        }

        let delta = InputDelta {
            value: self.pixels_to_seconds(pixels),
            pixels,
            direction: ScrollDirection::of(pixels),
            timestamp_ms: event.timestamp_ms,
            source,
        };

        let slot = &mut self.mailbox[source.slot()];
        *slot = Some(match slot.take() {
            Some(pending) => {
                let pixels = pending.pixels + delta.pixels;
                InputDelta {
                    value: pending.value + delta.value,
                    pixels,
                    direction: ScrollDirection::of(pixels),
                    timestamp_ms: delta.timestamp_ms.max(pending.timestamp_ms),
                    source,
                }
            }
            None => delta,
        });
        self.last_input_ms = Some(
            self.last_input_ms
                .map_or(event.timestamp_ms, |t| t.max(event.timestamp_ms)),
        );
        trace!(target: LOG_TARGET, "{:?} input {:+.1}px", source, pixels);

        Some(delta)
    }

    /// Drain the mailbox and advance momentum by `dt_ms`.
    pub fn take_frame(&mut self, dt_ms: f64) -> ScrollFrame {
        let dt = if dt_ms.is_finite() { dt_ms.max(0.0) / 1000.0 } else { 0.0 };
        let mut pixels = 0.0;
        let mut momentum_pixels = 0.0;
        let mut had_input = false;

        for delta in self.mailbox.iter_mut().filter_map(Option::take) {
            had_input = true;
            pixels += delta.pixels;
            if delta.source != InputSource::Keyboard {
                momentum_pixels += delta.pixels;
            }
        }

        let mut inertia = 0.0;
        if had_input {
            if momentum_pixels == 0.0 || dt == 0.0 {
                // Discrete steps carry no momentum
                self.velocity = 0.0;
            } else {
                let sample = momentum_pixels / dt;
                let blend = self.scrub.velocity_smoothing.clamp(0.0, 1.0);
                self.velocity += (sample - self.velocity) * blend;
            }
        } else {
            self.velocity *= self.scrub.inertia_friction.powf(dt * 60.0);
            inertia = self.velocity * dt;
        }

        ScrollFrame {
            pixels,
            inertia,
            velocity: self.velocity,
            had_input,
        }
    }

    /// Whether input arrived within the active-scrub timeout of `now_ms`.
    #[must_use]
    pub fn is_recent(&self, now_ms: f64) -> bool {
        self.last_input_ms
            .is_some_and(|t| now_ms - t < self.scrub.active_timeout_ms)
    }

    /// Whether the remaining momentum is worth coasting on.
    #[must_use]
    pub fn has_momentum(&self) -> bool {
        self.velocity.abs() >= self.scrub.min_velocity
    }

    #[must_use]
    pub const fn velocity(&self) -> f64 {
        self.velocity
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.mailbox.iter().any(Option::is_some)
    }

    /// Stop any momentum and forget pending input.
    pub fn reset(&mut self) {
        self.mailbox = [None; InputSource::COUNT];
        self.velocity = 0.0;
        self.last_input_ms = None;
        self.touch_y = None;
    }

    fn pixels_to_seconds(&self, pixels: f64) -> f64 {
        if self.line_height > 0.0 {
            pixels / self.line_height * self.seconds_per_line
        } else {
            0.0
        }
    }
}

/// The scrollable lyric container the controller drives.
pub trait ScrollSurface: Send {
    /// Current scroll offset in pixels.
    fn scroll_position(&self) -> f64;

    fn scroll_to_position(&mut self, position: f64);

    /// Height of one lyric line in pixels; `0` while the surface is unmeasured.
    fn line_height(&self) -> f64;
}

/// A scroll surface with no rendering behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualScrollSurface {
    position: f64,
    line_height: f64,
}

impl VirtualScrollSurface {
    #[must_use]
    pub const fn new(line_height: f64) -> Self {
        Self {
            position: 0.0,
            line_height,
        }
    }
}

impl ScrollSurface for VirtualScrollSurface {
    fn scroll_position(&self) -> f64 {
        self.position
    }

    fn scroll_to_position(&mut self, position: f64) {
        if position.is_finite() {
            self.position = position;
        }
    }

    fn line_height(&self) -> f64 {
        self.line_height
    }
}
