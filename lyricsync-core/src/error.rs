use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created with default values.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Lyric data errors
    #[error("Failed to parse LRC: {reason}")]
    LrcParseError { reason: String },

    #[error("Failed to parse lyrics JSON: {0}")]
    LyricsJson(#[from] serde_json::Error),

    #[error("Unsupported lyrics file format: {path}")]
    UnsupportedLyricsFormat { path: PathBuf },

    #[error("Timeline has no usable lyric entries")]
    EmptyTimeline,

    #[error("Invalid timeline duration: {duration}")]
    InvalidDuration { duration: f64 },

    // IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Failures reported by a media playback primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The media has not loaded enough data to play.
    #[error("media not ready")]
    NotReady,

    /// The host refused to start playback (autoplay policy, missing user gesture).
    #[error("playback rejected: {reason}")]
    PlaybackRejected { reason: String },

    /// The media source could not be loaded or decoded.
    #[error("media failed to load: {reason}")]
    LoadFailed { reason: String },
}
