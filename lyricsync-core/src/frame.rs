//! Fixed-rate frame driver for a [`SyncController`].

use crate::audio::AudioEngine;
use crate::scroll::{InputEvent, ScrollSurface};
use crate::sync::SyncController;
use crate::time::DurationExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const LOG_TARGET: &str = "lyricsync::frame";

/// Input events buffered between two frames
const INPUT_CAPACITY: usize = 64;

/// Cloneable handle used by input listeners and the host to stop the loop.
#[derive(Debug, Clone)]
pub struct FrameLoopHandle {
    input_tx: mpsc::Sender<InputEvent>,
    cancel: CancellationToken,
    started: Instant,
}

impl FrameLoopHandle {
    /// Hand an input event to the next frame.
    ///
    /// Returns `false` if the buffer is full or the loop has stopped; the
    /// event is dropped in both cases.
    pub fn send_input(&self, event: InputEvent) -> bool {
        self.input_tx.try_send(event).is_ok()
    }

    /// Milliseconds on the frame clock, for stamping input events.
    #[must_use]
    pub fn now_ms(&self) -> f64 {
        self.started.elapsed().as_frame_millis()
    }

    /// Stop the frame loop. The running [`FrameLoop::run`] returns after the
    /// current frame.
    pub fn destroy(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Runs `tick` once per frame until destroyed.
pub struct FrameLoop<A, S> {
    controller: SyncController<A, S>,
    input_rx: mpsc::Receiver<InputEvent>,
    cancel: CancellationToken,
    period: Duration,
    started: Instant,
}

impl<A: AudioEngine, S: ScrollSurface> FrameLoop<A, S> {
    /// Create a loop ticking `frame_rate` times per second.
    #[must_use]
    pub fn new(controller: SyncController<A, S>, frame_rate: u32) -> (Self, FrameLoopHandle) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);
        let cancel = CancellationToken::new();
        let period = Duration::from_secs(1) / frame_rate.max(1);
        let started = Instant::now();

        let frame_loop = Self {
            controller,
            input_rx,
            cancel: cancel.clone(),
            period,
            started,
        };
        let handle = FrameLoopHandle {
            input_tx,
            cancel,
            started,
        };
        (frame_loop, handle)
    }

    /// Drive the controller until the handle is destroyed, then pause audio
    /// and hand the controller back.
    ///
    /// Missed frames are skipped rather than replayed in a burst.
    pub async fn run(mut self) -> SyncController<A, S> {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frames: u64 = 0;

        info!(
            target: LOG_TARGET,
            "Frame loop started ({:.2}ms period)",
            self.period.as_frame_millis()
        );

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    while let Ok(event) = self.input_rx.try_recv() {
                        self.controller.handle_input(event);
                    }

                    let now_ms = self.started.elapsed().as_frame_millis();
                    self.controller.tick(now_ms);
                    frames += 1;

                    if self.controller.take_resume_request() {
                        debug!(target: LOG_TARGET, "Resuming playback after loop");
                        self.controller.play().await;
                    }
                }
            }
        }

        self.input_rx.close();
        self.controller.pause();
        info!(target: LOG_TARGET, "Frame loop stopped after {} frames", frames);
        self.controller
    }
}
