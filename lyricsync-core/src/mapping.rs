//! Bidirectional mapping between playback time and scroll position.
//!
//! Each lyric line occupies exactly one `line_height` of scroll distance and
//! time is interpolated linearly inside a line, so the two directions are
//! inverses of each other up to floating-point error. Both functions return
//! `0.0` instead of dividing by a missing or zero line height.

use crate::timeline::Timeline;

fn usable_line_height(line_height: f64) -> bool {
    line_height.is_finite() && line_height > 0.0
}

/// Scroll offset (pixels) at which `time` is displayed.
#[must_use]
pub fn time_to_scroll(timeline: &Timeline, time: f64, line_height: f64) -> f64 {
    if !usable_line_height(line_height) || !time.is_finite() {
        return 0.0;
    }
    let time = timeline.wrap(time);
    let index = timeline.index_for_time(time);
    let progress = timeline.progress(index, time);
    #[allow(clippy::cast_precision_loss)]
    let line = index as f64;
    (line + progress) * line_height
}

/// Playback time (seconds) shown at scroll offset `position`.
///
/// Positions above the first line resolve to the first entry's time and
/// positions past the last line resolve to the end of the last entry.
#[must_use]
pub fn scroll_to_time(timeline: &Timeline, position: f64, line_height: f64) -> f64 {
    if !usable_line_height(line_height) || !position.is_finite() {
        return 0.0;
    }
    let Some(last) = timeline.len().checked_sub(1) else {
        return 0.0;
    };

    let raw_index = (position / line_height).max(0.0);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let (index, progress) = {
        let floor = raw_index.floor();
        let index = if floor >= last as f64 { last } else { floor as usize };
        (index, (raw_index - index as f64).clamp(0.0, 1.0))
    };

    let start = timeline.entry(index).map_or(0.0, |e| e.time);
    start + progress * timeline.interpolation_span(index)
}

/// Total scroll distance covered by one loop of the timeline.
#[must_use]
pub fn scroll_extent(timeline: &Timeline, line_height: f64) -> f64 {
    if !usable_line_height(line_height) {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let lines = timeline.len() as f64;
    lines * line_height
}
