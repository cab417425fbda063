pub mod adhesion;
pub mod audio;
pub mod config;
pub mod error;
pub mod frame;
pub mod lrc;
pub mod mapping;
pub mod paths;
pub mod scroll;
pub mod sync;
pub mod time;
pub mod timeline;

pub use adhesion::{Adhesion, AdhesionState, AdhesionStrategy};
pub use audio::{
    AudioEngine, AudioEngineState, LoopDetector, LoopJump, MediaAudioEngine, MediaElement,
    MediaEvent, SimulatedClock,
};
pub use config::{
    AdhesionConfig, AnimationConfig, AudioConfig, Config, LoopCoolingConfig, LyricsConfig,
    MonitorConfig, PreRollBehavior, ScrollConfig, ScrubConfig, SyncConfig, TimelineConfig,
};
pub use error::{CoreError, MediaError};
pub use frame::{FrameLoop, FrameLoopHandle};
pub use lrc::{LrcFile, LrcMetadata};
pub use mapping::{scroll_extent, scroll_to_time, time_to_scroll};
pub use paths::{config_dir, config_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME};
pub use scroll::{
    InputDelta, InputEvent, InputSource, Key, RawInput, ScrollDirection, ScrollEngine,
    ScrollFrame, ScrollSurface, VirtualScrollSurface, WheelDeltaMode,
};
pub use sync::{ScrubPhase, SyncController, SyncEvent, SyncSnapshot, SyncState};
pub use time::{circular_delta, wrap_time, DurationExt};
pub use timeline::{LoopThresholds, LyricEntry, Timeline};
