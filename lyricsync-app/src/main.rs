use anyhow::{Context, Result};
use lyricsync_core::{
    Config, CoreError, FrameLoop, FrameLoopHandle, InputEvent, Key, LyricEntry, RawInput,
    SimulatedClock, SyncController, SyncEvent, Timeline, VirtualScrollSurface,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_TARGET: &str = "lyricsync::app";
const LOG_TARGET_SYNC: &str = "lyricsync::sync::events";

/// Height of one lyric line on the virtual scroll surface
const LINE_HEIGHT_PX: f64 = 48.0;

const DEMO_LYRICS: &[(f64, &str)] = &[
    (0.0, "Lights come up over the harbour"),
    (6.0, "Every ship is coming home"),
    (12.0, "Count the lanterns on the water"),
    (18.0, "One for each of us alone"),
    (24.0, "Hold the line and hold the measure"),
    (30.0, "Let the chorus carry on"),
    (36.0, "When the tide turns back to zero"),
    (42.0, "We begin another song"),
];

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config or create template on first run
    let mut config = match Config::load_or_create() {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            info!(
                target: LOG_TARGET,
                "Created config template at {}, continuing with defaults",
                path.display()
            );
            Config::default()
        }
        Err(e) => return Err(e).context("Failed to load config"),
    };

    // A lyric file on the command line wins over the configured one
    if let Some(path) = std::env::args_os().nth(1) {
        config.lyrics.path = Some(PathBuf::from(path));
    }

    let timeline = load_timeline(&config)?;
    info!(
        target: LOG_TARGET,
        "Loaded {} lyric lines ({:.1}s loop)",
        timeline.len(),
        timeline.duration()
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let result = runtime.block_on(run(config, timeline));
    // stdin reads park a blocking thread that never returns on its own
    runtime.shutdown_timeout(Duration::from_millis(250));
    result
}

fn load_timeline(config: &Config) -> Result<Timeline> {
    if let Some(path) = &config.lyrics.path {
        return Timeline::load(path, config.lyrics.duration_secs)
            .with_context(|| format!("Failed to load lyrics from {}", path.display()));
    }

    info!(target: LOG_TARGET, "No lyric file configured, using demo lyrics");
    let entries = DEMO_LYRICS
        .iter()
        .map(|(time, text)| LyricEntry::new(*time, *text))
        .collect();
    let duration = config
        .lyrics
        .duration_secs
        .unwrap_or(config.audio.duration_secs);
    Timeline::new(entries, duration).context("Failed to build demo timeline")
}

async fn run(config: Config, timeline: Timeline) -> Result<()> {
    let timeline = Arc::new(timeline);
    let clock = SimulatedClock::from_config(&config.audio, timeline.duration());
    let surface = VirtualScrollSurface::new(LINE_HEIGHT_PX);

    let mut controller = SyncController::new(config.sync.clone(), timeline.clone(), clock, surface)
        .context("Failed to create sync controller")?;
    let events = controller.subscribe();

    if !controller.play().await {
        warn!(target: LOG_TARGET, "Playback did not start; lyrics follow scrolling only");
    }

    let (frame_loop, handle) = FrameLoop::new(controller, config.animation.frame_rate);

    // Set up Ctrl+C handler to trigger graceful shutdown
    let ctrlc_handle = handle.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!(target: LOG_TARGET, "Received Ctrl+C, shutting down gracefully...");
        ctrlc_handle.destroy();
    }) {
        error!(target: LOG_TARGET, "Failed to set Ctrl+C handler: {}", e);
    }

    let logger = tokio::spawn(log_sync_events(events, timeline.clone()));
    tokio::spawn(read_keys(handle.clone()));

    info!(
        target: LOG_TARGET,
        "Running. Type w/s (or up/down, pgup/pgdn) and Enter to scroll, q to quit"
    );
    let controller = frame_loop.run().await;

    let snapshot = controller.snapshot();
    info!(
        target: LOG_TARGET,
        "Stopped at {:.3}s in state {:?}", snapshot.display_time, snapshot.state
    );
    drop(controller);
    let _ = logger.await;

    Ok(())
}

/// Translate stdin lines into key input for the frame loop
async fn read_keys(handle: FrameLoopHandle) {
    let cancel = handle.cancellation_token();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to read stdin: {}", e);
                break;
            }
        };

        let command = line.trim();
        if command.eq_ignore_ascii_case("q") {
            handle.destroy();
            break;
        }

        let code = match command {
            "up" => "ArrowUp",
            "down" => "ArrowDown",
            "pgup" => "PageUp",
            "pgdn" => "PageDown",
            other => other,
        };
        match Key::from_code(code) {
            Some(key) => {
                let event = InputEvent::new(RawInput::Key { key }, handle.now_ms());
                if !handle.send_input(event) {
                    warn!(target: LOG_TARGET, "Dropped input: frame loop is busy or stopped");
                }
            }
            None if command.is_empty() => {}
            None => warn!(target: LOG_TARGET, "Unknown command: {}", command),
        }
    }
}

/// Log all sync events to the console
async fn log_sync_events(mut rx: broadcast::Receiver<SyncEvent>, timeline: Arc<Timeline>) {
    loop {
        match rx.recv().await {
            Ok(event) => match &event {
                SyncEvent::StateChanged { from, to } => {
                    info!(target: LOG_TARGET_SYNC, "State {:?} -> {:?}", from, to);
                }
                SyncEvent::LyricChanged { index: Some(index) } => {
                    let text = timeline.entry(*index).map_or("", |e| e.text.as_str());
                    info!(target: LOG_TARGET_SYNC, "[{}] {}", index, text);
                }
                SyncEvent::LyricChanged { index: None } => {
                    info!(target: LOG_TARGET_SYNC, "Waiting for the first lyric");
                }
                SyncEvent::LoopDetected {
                    from,
                    to,
                    cooling_ms,
                } => {
                    info!(
                        target: LOG_TARGET_SYNC,
                        "Loop {:.2}s -> {:.2}s (cooling {:.0}ms)", from, to, cooling_ms
                    );
                }
                SyncEvent::PlaybackResumed => {
                    info!(target: LOG_TARGET_SYNC, "Playback resumed");
                }
                SyncEvent::AudioError { message } => {
                    error!(target: LOG_TARGET_SYNC, "Audio error: {}", message);
                }
            },
            Err(broadcast::error::RecvError::Closed) => {
                info!(target: LOG_TARGET_SYNC, "Sync event channel closed");
                break;
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                info!(target: LOG_TARGET_SYNC, "Missed {} sync events", n);
            }
        }
    }
}
