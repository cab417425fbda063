use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub animation: AnimationConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LyricsConfig {
    /// LRC or JSON lyric file; a built-in demo set is used when absent
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Loop length override in seconds
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Length of the simulated clock when no lyric duration is known
    #[serde(default = "default_audio_duration")]
    pub duration_secs: f64,
    /// Whether the playback primitive wraps to the start by itself
    #[serde(default = "default_true")]
    pub auto_loop: bool,
    #[serde(default = "default_volume")]
    pub volume: f64,
    /// Seeks closer than this to the current position are dropped
    #[serde(default = "default_seek_epsilon")]
    pub seek_epsilon_ms: f64,
}

const fn default_audio_duration() -> f64 {
    60.0
}

const fn default_true() -> bool {
    true
}

const fn default_volume() -> f64 {
    1.0
}

const fn default_seek_epsilon() -> f64 {
    10.0
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_audio_duration(),
            auto_loop: true,
            volume: default_volume(),
            seek_epsilon_ms: default_seek_epsilon(),
        }
    }
}

/// Every tunable of the synchronization engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub adhesion: AdhesionConfig,
    #[serde(default)]
    pub loop_cooling: LoopCoolingConfig,
    #[serde(default)]
    pub scrub: ScrubConfig,
    #[serde(default)]
    pub scroll: ScrollConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub timeline: TimelineConfig,
}

/// Spring-damping thresholds and integrator limits.
///
/// Thresholds are compared against `|target - display|` in milliseconds and
/// must satisfy `freeze < soft_lo < soft_hi < hard`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdhesionConfig {
    #[serde(default = "default_freeze_ms")]
    pub freeze_ms: f64,
    /// Error a frozen display must exceed before correction re-engages
    #[serde(default = "default_soft_lo_ms")]
    pub soft_lo_ms: f64,
    /// Boundary between the weak and the strong spring
    #[serde(default = "default_soft_hi_ms")]
    pub soft_hi_ms: f64,
    #[serde(default = "default_hard_ms")]
    pub hard_ms: f64,
    #[serde(default = "default_damping_ratio")]
    pub damping_ratio: f64,
    #[serde(default = "default_target_settle_ms")]
    pub target_settle_ms: f64,
    /// Settle-time multiplier for the weak spring
    #[serde(default = "default_weak_settle_factor")]
    pub weak_settle_factor: f64,
    #[serde(default = "default_min_dt_ms")]
    pub min_dt_ms: f64,
    #[serde(default = "default_max_dt_ms")]
    pub max_dt_ms: f64,
}

const fn default_freeze_ms() -> f64 {
    10.0
}

const fn default_soft_lo_ms() -> f64 {
    30.0
}

const fn default_soft_hi_ms() -> f64 {
    120.0
}

const fn default_hard_ms() -> f64 {
    800.0
}

const fn default_damping_ratio() -> f64 {
    0.9
}

const fn default_target_settle_ms() -> f64 {
    240.0
}

const fn default_weak_settle_factor() -> f64 {
    1.6
}

const fn default_min_dt_ms() -> f64 {
    8.0
}

const fn default_max_dt_ms() -> f64 {
    33.0
}

impl Default for AdhesionConfig {
    fn default() -> Self {
        Self {
            freeze_ms: default_freeze_ms(),
            soft_lo_ms: default_soft_lo_ms(),
            soft_hi_ms: default_soft_hi_ms(),
            hard_ms: default_hard_ms(),
            damping_ratio: default_damping_ratio(),
            target_settle_ms: default_target_settle_ms(),
            weak_settle_factor: default_weak_settle_factor(),
            min_dt_ms: default_min_dt_ms(),
            max_dt_ms: default_max_dt_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopCoolingConfig {
    #[serde(default = "default_cooling_min_ms")]
    pub min_duration_ms: f64,
    #[serde(default = "default_cooling_max_ms")]
    pub max_duration_ms: f64,
    /// Minor (jitter) threshold as a fraction of the loop length
    #[serde(default = "default_minor_ratio")]
    pub minor_ratio: f64,
    /// Lower bound for the minor threshold in seconds
    #[serde(default = "default_minor_floor")]
    pub minor_floor_secs: f64,
    /// Jump magnitude, as a fraction of the loop length, that earns the full cooling period
    #[serde(default = "default_main_ratio")]
    pub main_ratio: f64,
}

const fn default_cooling_min_ms() -> f64 {
    300.0
}

const fn default_cooling_max_ms() -> f64 {
    1200.0
}

const fn default_minor_ratio() -> f64 {
    0.01
}

const fn default_minor_floor() -> f64 {
    0.5
}

const fn default_main_ratio() -> f64 {
    0.5
}

impl Default for LoopCoolingConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: default_cooling_min_ms(),
            max_duration_ms: default_cooling_max_ms(),
            minor_ratio: default_minor_ratio(),
            minor_floor_secs: default_minor_floor(),
            main_ratio: default_main_ratio(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrubConfig {
    /// Input younger than this keeps the scrub in its active phase
    #[serde(default = "default_active_timeout")]
    pub active_timeout_ms: f64,
    /// Inertia below this speed (pixels per second) counts as stopped
    #[serde(default = "default_min_velocity")]
    pub min_velocity: f64,
    /// Velocity retained per 60 Hz frame while coasting
    #[serde(default = "default_inertia_friction")]
    pub inertia_friction: f64,
    /// Blend factor for new velocity samples
    #[serde(default = "default_velocity_smoothing")]
    pub velocity_smoothing: f64,
}

const fn default_active_timeout() -> f64 {
    150.0
}

const fn default_min_velocity() -> f64 {
    20.0
}

const fn default_inertia_friction() -> f64 {
    0.92
}

const fn default_velocity_smoothing() -> f64 {
    0.5
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            active_timeout_ms: default_active_timeout(),
            min_velocity: default_min_velocity(),
            inertia_friction: default_inertia_friction(),
            velocity_smoothing: default_velocity_smoothing(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollConfig {
    /// Pixels per wheel notch in line delta mode
    #[serde(default = "default_wheel_line_px")]
    pub wheel_line_px: f64,
    /// Pixels per wheel notch in page delta mode
    #[serde(default = "default_wheel_page_px")]
    pub wheel_page_px: f64,
    /// Lyric lines moved per arrow / W / S key press
    #[serde(default = "default_key_step_lines")]
    pub key_step_lines: f64,
    #[serde(default = "default_touch_gain")]
    pub touch_gain: f64,
    /// Audio-driven scroll requests smaller than this fraction of a line are suppressed
    #[serde(default = "default_scroll_epsilon_lines")]
    pub scroll_epsilon_lines: f64,
}

const fn default_wheel_line_px() -> f64 {
    16.0
}

const fn default_wheel_page_px() -> f64 {
    800.0
}

const fn default_key_step_lines() -> f64 {
    1.0
}

const fn default_touch_gain() -> f64 {
    1.0
}

const fn default_scroll_epsilon_lines() -> f64 {
    0.05
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            wheel_line_px: default_wheel_line_px(),
            wheel_page_px: default_wheel_page_px(),
            key_step_lines: default_key_step_lines(),
            touch_gain: default_touch_gain(),
            scroll_epsilon_lines: default_scroll_epsilon_lines(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Frames between diagnostic samples (0 disables sampling)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Consecutive frozen frames before the idle state hands back to auto-play
    #[serde(default = "default_stable_frames")]
    pub stable_frames: u32,
}

const fn default_sample_rate() -> u32 {
    60
}

const fn default_stable_frames() -> u32 {
    3
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            stable_frames: default_stable_frames(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineConfig {
    #[serde(default)]
    pub pre_roll: PreRollBehavior,
}

/// Which lyric index is reported before the first lyric's timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreRollBehavior {
    /// Report no lyric until the first timestamp is reached
    Hold,
    /// Report the first lyric immediately
    #[default]
    ClampToFirst,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationConfig {
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

const fn default_frame_rate() -> u32 {
    60
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
        }
    }
}

impl SyncConfig {
    /// Check that the tunables describe a usable controller.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigInvalid`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let a = &self.adhesion;
        let thresholds = [a.freeze_ms, a.soft_lo_ms, a.soft_hi_ms, a.hard_ms];
        if thresholds.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(invalid("sync.adhesion thresholds must be finite and non-negative"));
        }
        if !(a.freeze_ms < a.soft_lo_ms && a.soft_lo_ms < a.soft_hi_ms && a.soft_hi_ms < a.hard_ms)
        {
            return Err(invalid(
                "sync.adhesion thresholds must satisfy freeze_ms < soft_lo_ms < soft_hi_ms < hard_ms",
            ));
        }
        if !(a.damping_ratio.is_finite() && a.damping_ratio > 0.0) {
            return Err(invalid("sync.adhesion.damping_ratio must be positive"));
        }
        if !(a.target_settle_ms.is_finite() && a.target_settle_ms > 0.0) {
            return Err(invalid("sync.adhesion.target_settle_ms must be positive"));
        }
        if !(a.weak_settle_factor.is_finite() && a.weak_settle_factor >= 1.0) {
            return Err(invalid("sync.adhesion.weak_settle_factor must be at least 1"));
        }
        if !(a.min_dt_ms > 0.0 && a.min_dt_ms <= a.max_dt_ms && a.max_dt_ms.is_finite()) {
            return Err(invalid("sync.adhesion requires 0 < min_dt_ms <= max_dt_ms"));
        }

        let c = &self.loop_cooling;
        if !(c.min_duration_ms >= 0.0
            && c.min_duration_ms <= c.max_duration_ms
            && c.max_duration_ms.is_finite())
        {
            return Err(invalid(
                "sync.loop_cooling requires 0 <= min_duration_ms <= max_duration_ms",
            ));
        }
        if !(c.minor_ratio >= 0.0 && c.minor_floor_secs >= 0.0 && c.main_ratio > 0.0) {
            return Err(invalid("sync.loop_cooling ratios must be non-negative"));
        }

        let s = &self.scrub;
        if !(s.active_timeout_ms > 0.0 && s.min_velocity >= 0.0) {
            return Err(invalid("sync.scrub timeouts must be positive"));
        }
        if !((0.0..1.0).contains(&s.inertia_friction) && (0.0..=1.0).contains(&s.velocity_smoothing))
        {
            return Err(invalid(
                "sync.scrub.inertia_friction must be in [0, 1) and velocity_smoothing in [0, 1]",
            ));
        }

        if self.scroll.scroll_epsilon_lines < 0.0 {
            return Err(invalid("sync.scroll.scroll_epsilon_lines must be non-negative"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> CoreError {
    CoreError::ConfigInvalid {
        message: message.to_string(),
    }
}

impl Config {
    /// Get the configuration directory path (~/.config/lyricsync/)
    #[must_use]
    pub fn config_dir() -> PathBuf {
        crate::paths::config_dir()
    }

    /// Get the config file path (~/.config/lyricsync/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default path, writing the template on first run.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after creating the template, or an
    /// error if the file cannot be read, parsed or validated.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// Same as [`Config::load_or_create`] for an explicit path.
    ///
    /// # Errors
    ///
    /// See [`Config::load_or_create`].
    pub fn load_or_create_at(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(config_path, CONFIG_TEMPLATE)?;

            return Err(CoreError::ConfigNotFound {
                path: config_path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(config_path)?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or fails validation.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.sync.validate()?;
        if config.animation.frame_rate == 0 {
            return Err(invalid("animation.frame_rate must be positive"));
        }
        Ok(config)
    }
}

const CONFIG_TEMPLATE: &str = r#"# Lyricsync Configuration
# ~/.config/lyricsync/config.toml

[lyrics]
# LRC or JSON lyric file. A demo set is used when unset.
# path = "/path/to/song.lrc"
# Loop length in seconds; defaults to the LRC [length] tag or last line + average line length
# duration_secs = 180.0

[audio]
duration_secs = 60.0
auto_loop = true
volume = 1.0
seek_epsilon_ms = 10.0

[animation]
frame_rate = 60

[sync.adhesion]
# Error tiers in milliseconds: freeze < soft_lo < soft_hi < hard
freeze_ms = 10.0
soft_lo_ms = 30.0
soft_hi_ms = 120.0
hard_ms = 800.0
damping_ratio = 0.9
target_settle_ms = 240.0
weak_settle_factor = 1.6
min_dt_ms = 8.0
max_dt_ms = 33.0

[sync.loop_cooling]
min_duration_ms = 300.0
max_duration_ms = 1200.0
minor_ratio = 0.01
minor_floor_secs = 0.5
main_ratio = 0.5

[sync.scrub]
active_timeout_ms = 150.0
min_velocity = 20.0
inertia_friction = 0.92
velocity_smoothing = 0.5

[sync.scroll]
wheel_line_px = 16.0
wheel_page_px = 800.0
key_step_lines = 1.0
touch_gain = 1.0
scroll_epsilon_lines = 0.05

[sync.monitor]
sample_rate = 60
stable_frames = 3

[sync.timeline]
# "hold" reports no lyric before the first timestamp, "clamp_to_first" reports the first lyric
pre_roll = "clamp_to_first"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses_to_defaults() {
        let config = Config::parse(CONFIG_TEMPLATE).unwrap();
        let defaults = SyncConfig::default();
        assert!((config.sync.adhesion.hard_ms - defaults.adhesion.hard_ms).abs() < f64::EPSILON);
        assert_eq!(config.sync.monitor.stable_frames, defaults.monitor.stable_frames);
        assert_eq!(config.sync.timeline.pre_roll, PreRollBehavior::ClampToFirst);
        assert_eq!(config.animation.frame_rate, 60);
        assert!(config.lyrics.path.is_none());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert!((config.sync.adhesion.freeze_ms - 10.0).abs() < f64::EPSILON);
        assert!(config.audio.auto_loop);
    }

    #[test]
    fn test_partial_override() {
        let config = Config::parse(
            r#"
[sync.adhesion]
hard_ms = 1500.0

[sync.timeline]
pre_roll = "hold"
"#,
        )
        .unwrap();
        assert!((config.sync.adhesion.hard_ms - 1500.0).abs() < f64::EPSILON);
        assert!((config.sync.adhesion.soft_hi_ms - 120.0).abs() < f64::EPSILON);
        assert_eq!(config.sync.timeline.pre_roll, PreRollBehavior::Hold);
    }

    #[test]
    fn test_default_sync_config_is_valid() {
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_unordered_thresholds() {
        let mut config = SyncConfig::default();
        config.adhesion.soft_lo_ms = 200.0;
        assert!(matches!(
            config.validate(),
            Err(CoreError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn test_rejects_inverted_dt_clamp() {
        let mut config = SyncConfig::default();
        config.adhesion.min_dt_ms = 40.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_friction() {
        let mut config = SyncConfig::default();
        config.scrub.inertia_friction = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_frame_rate() {
        assert!(Config::parse("[animation]\nframe_rate = 0\n").is_err());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::parse("[sync.adhesion\nhard_ms = 1"),
            Err(CoreError::ConfigParseError(_))
        ));
    }

    #[test]
    fn test_load_or_create_writes_template() {
        let dir = std::env::temp_dir().join(format!("lyricsync-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = fs::remove_file(&path);

        let first = Config::load_or_create_at(&path);
        assert!(matches!(first, Err(CoreError::ConfigNotFound { .. })));
        assert!(path.exists());

        let second = Config::load_or_create_at(&path).unwrap();
        assert_eq!(second.animation.frame_rate, 60);

        let _ = fs::remove_dir_all(&dir);
    }
}
