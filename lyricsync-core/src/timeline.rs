//! Ordered lyric entries over one loop of playback.
//!
//! A [`Timeline`] is built once when lyrics are loaded and never mutated
//! afterwards. Every lookup is total: times before the first entry, after
//! the last entry, or outside the loop all resolve to a valid index.

use crate::config::{LoopCoolingConfig, PreRollBehavior};
use crate::error::{CoreError, Result};
use crate::lrc::LrcFile;
use crate::time::wrap_time;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

const LOG_TARGET: &str = "lyricsync::timeline";

/// Largest value [`Timeline::progress`] returns; progress never reaches 1.
const MAX_PROGRESS: f64 = 1.0 - f64::EPSILON;

/// Trailing pause given to a single-entry timeline without an explicit duration.
const SINGLE_ENTRY_SPAN_SECS: f64 = 5.0;

/// A single timestamped lyric line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricEntry {
    /// Start time in seconds from the loop start
    pub time: f64,
    pub text: String,
    /// Optional glyph that stands in for the line in decorative layouts
    #[serde(default)]
    pub anchor: Option<char>,
}

impl LyricEntry {
    pub fn new(time: f64, text: impl Into<String>) -> Self {
        Self {
            time,
            text: text.into(),
            anchor: None,
        }
    }

    #[must_use]
    pub const fn with_anchor(mut self, anchor: char) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

/// On-disk JSON lyric set
#[derive(Debug, Clone, Deserialize)]
struct LyricSet {
    #[serde(default)]
    duration: Option<f64>,
    entries: Vec<LyricEntry>,
}

/// Thresholds used to classify backward jumps of the media clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopThresholds {
    /// Backward jumps smaller than this (seconds) are clock jitter
    pub minor: f64,
    /// Jump size (seconds) that earns the full cooling period
    pub main: f64,
}

#[derive(Debug, Clone)]
pub struct Timeline {
    entries: Vec<LyricEntry>,
    /// Per-entry span: gap to the next entry, or to the loop end for the last one
    spans: Vec<f64>,
    duration: f64,
    average_span: f64,
}

impl Timeline {
    /// Build a timeline from raw entries and a loop duration in seconds.
    ///
    /// Entries with non-finite or negative times or blank text are dropped and
    /// the rest are sorted. A duration that does not reach past the last entry
    /// is extended by one average line length.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyTimeline`] if no entry survives sanitizing and
    /// [`CoreError::InvalidDuration`] for a non-finite or non-positive duration.
    pub fn new(entries: Vec<LyricEntry>, duration: f64) -> Result<Self> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(CoreError::InvalidDuration { duration });
        }
        let entries = sanitize(entries)?;
        let average_span = average_gap(&entries).unwrap_or(SINGLE_ENTRY_SPAN_SECS);

        let last_time = entries.last().map_or(0.0, |e| e.time);
        let duration = if duration <= last_time {
            let extended = last_time + average_span;
            warn!(
                target: LOG_TARGET,
                "Timeline duration {:.3}s does not pass the last lyric at {:.3}s, extending to {:.3}s",
                duration, last_time, extended
            );
            extended
        } else {
            duration
        };

        Ok(Self::assemble(entries, duration, average_span))
    }

    /// Build a timeline whose loop ends one average line length after the last entry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyTimeline`] if no entry survives sanitizing.
    pub fn with_inferred_duration(entries: Vec<LyricEntry>) -> Result<Self> {
        let entries = sanitize(entries)?;
        let average_span = average_gap(&entries).unwrap_or(SINGLE_ENTRY_SPAN_SECS);
        let last_time = entries.last().map_or(0.0, |e| e.time);
        Ok(Self::assemble(entries, last_time + average_span, average_span))
    }

    /// Build a timeline from a parsed LRC file.
    ///
    /// `duration` wins over the file's `[length:]` tag.
    ///
    /// # Errors
    ///
    /// See [`Timeline::new`].
    pub fn from_lrc(lrc: LrcFile, duration: Option<f64>) -> Result<Self> {
        match duration.or(lrc.metadata.length) {
            Some(duration) => Self::new(lrc.entries, duration),
            None => Self::with_inferred_duration(lrc.entries),
        }
    }

    /// Build a timeline from a JSON lyric set `{ "duration": 30.0, "entries": [...] }`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LyricsJson`] for malformed JSON, otherwise see [`Timeline::new`].
    pub fn from_json(input: &str, duration: Option<f64>) -> Result<Self> {
        let set: LyricSet = serde_json::from_str(input)?;
        match duration.or(set.duration) {
            Some(duration) => Self::new(set.entries, duration),
            None => Self::with_inferred_duration(set.entries),
        }
    }

    /// Load a `.lrc` or `.json` lyric file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has an unknown extension,
    /// or does not describe a usable timeline.
    pub fn load(path: &Path, duration: Option<f64>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let timeline = match extension.as_deref() {
            Some("lrc") => Self::from_lrc(LrcFile::parse(&content)?, duration)?,
            Some("json") => Self::from_json(&content, duration)?,
            _ => {
                return Err(CoreError::UnsupportedLyricsFormat {
                    path: path.to_path_buf(),
                })
            }
        };

        debug!(
            target: LOG_TARGET,
            "Loaded {} lyric entries from {} ({:.3}s loop)",
            timeline.len(),
            path.display(),
            timeline.duration()
        );
        Ok(timeline)
    }

    fn assemble(entries: Vec<LyricEntry>, duration: f64, average_span: f64) -> Self {
        let spans = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let end = entries.get(i + 1).map_or(duration, |next| next.time);
                end - entry.time
            })
            .collect();

        Self {
            entries,
            spans,
            duration,
            average_span,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[LyricEntry] {
        &self.entries
    }

    #[must_use]
    pub fn entry(&self, index: usize) -> Option<&LyricEntry> {
        self.entries.get(index)
    }

    /// Number of entries; never zero.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loop length in seconds
    #[must_use]
    pub const fn duration(&self) -> f64 {
        self.duration
    }

    /// Wrap any time into `[0, duration)`.
    #[must_use]
    pub fn wrap(&self, time: f64) -> f64 {
        wrap_time(time, self.duration)
    }

    /// Greatest index whose entry starts at or before `time`, or 0 before the first entry.
    #[must_use]
    pub fn index_for_time(&self, time: f64) -> usize {
        if !time.is_finite() {
            return 0;
        }
        self.entries
            .partition_point(|entry| entry.time <= time)
            .saturating_sub(1)
    }

    /// Lyric index to display for `time` under the configured pre-roll policy.
    #[must_use]
    pub fn lyric_index(&self, time: f64, pre_roll: PreRollBehavior) -> Option<usize> {
        match pre_roll {
            PreRollBehavior::ClampToFirst => Some(self.index_for_time(time)),
            PreRollBehavior::Hold => {
                let first = self.entries.first()?;
                if time.is_finite() && time >= first.time {
                    Some(self.index_for_time(time))
                } else {
                    None
                }
            }
        }
    }

    /// Span of entry `index` in seconds (0 for an out-of-range index).
    #[must_use]
    pub fn entry_duration(&self, index: usize) -> f64 {
        self.spans.get(index).copied().unwrap_or(0.0)
    }

    /// Mean gap between consecutive entries
    #[must_use]
    pub const fn average_entry_duration(&self) -> f64 {
        self.average_span
    }

    /// Fraction of entry `index` elapsed at `time`, clamped to `[0, 1)`.
    #[must_use]
    pub fn progress(&self, index: usize, time: f64) -> f64 {
        let (Some(entry), Some(&span)) = (self.entries.get(index), self.spans.get(index)) else {
            return 0.0;
        };
        if span <= 0.0 || !time.is_finite() {
            return 0.0;
        }
        ((time - entry.time) / span).clamp(0.0, MAX_PROGRESS)
    }

    /// Span used when interpolating inside entry `index` from a scroll position.
    ///
    /// The last entry interpolates over the trailing pause to the loop end,
    /// falling back to the average line length when that pause is empty.
    #[must_use]
    pub fn interpolation_span(&self, index: usize) -> f64 {
        let span = self.entry_duration(index);
        if index + 1 >= self.len() && span <= 0.0 {
            self.average_span
        } else {
            span
        }
    }

    /// Backward-jump thresholds for loop detection.
    #[must_use]
    pub fn loop_thresholds(&self, config: &LoopCoolingConfig) -> LoopThresholds {
        LoopThresholds {
            minor: (self.duration * config.minor_ratio).max(config.minor_floor_secs),
            main: (self.duration * config.main_ratio).max(f64::EPSILON),
        }
    }
}

fn sanitize(entries: Vec<LyricEntry>) -> Result<Vec<LyricEntry>> {
    let before = entries.len();
    let mut entries: Vec<LyricEntry> = entries
        .into_iter()
        .filter(|e| e.time.is_finite() && e.time >= 0.0 && !e.text.trim().is_empty())
        .collect();

    if entries.len() != before {
        debug!(
            target: LOG_TARGET,
            "Dropped {} unusable lyric entries",
            before - entries.len()
        );
    }
    if entries.is_empty() {
        return Err(CoreError::EmptyTimeline);
    }

    entries.sort_by(|a, b| a.time.total_cmp(&b.time));
    Ok(entries)
}

fn average_gap(entries: &[LyricEntry]) -> Option<f64> {
    let (first, last) = (entries.first()?, entries.last()?);
    let gaps = entries.len().checked_sub(1).filter(|n| *n > 0)?;
    let span = last.time - first.time;
    if span <= 0.0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    Some(span / gaps as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(times: &[f64], duration: f64) -> Timeline {
        let entries = times
            .iter()
            .enumerate()
            .map(|(i, t)| LyricEntry::new(*t, format!("line {i}")))
            .collect();
        Timeline::new(entries, duration).unwrap()
    }

    #[test]
    fn test_index_for_time() {
        let tl = timeline(&[0.0, 10.0, 20.0], 30.0);
        assert_eq!(tl.index_for_time(5.0), 0);
        assert_eq!(tl.index_for_time(10.0), 1);
        assert_eq!(tl.index_for_time(25.0), 2);
        assert_eq!(tl.index_for_time(29.999), 2);
    }

    #[test]
    fn test_index_for_time_is_total() {
        let tl = timeline(&[2.0, 10.0], 20.0);
        assert_eq!(tl.index_for_time(-4.0), 0);
        assert_eq!(tl.index_for_time(1.0), 0);
        assert_eq!(tl.index_for_time(500.0), 1);
        assert_eq!(tl.index_for_time(f64::NAN), 0);
        assert_eq!(tl.index_for_time(f64::INFINITY), 0);
    }

    #[test]
    fn test_lyric_index_pre_roll() {
        let tl = timeline(&[2.0, 10.0], 20.0);
        assert_eq!(tl.lyric_index(1.0, PreRollBehavior::Hold), None);
        assert_eq!(tl.lyric_index(2.0, PreRollBehavior::Hold), Some(0));
        assert_eq!(tl.lyric_index(1.0, PreRollBehavior::ClampToFirst), Some(0));
        assert_eq!(tl.lyric_index(12.0, PreRollBehavior::Hold), Some(1));
    }

    #[test]
    fn test_entry_durations() {
        let tl = timeline(&[0.0, 4.0, 10.0], 30.0);
        assert!((tl.entry_duration(0) - 4.0).abs() < 1e-12);
        assert!((tl.entry_duration(1) - 6.0).abs() < 1e-12);
        assert!((tl.entry_duration(2) - 20.0).abs() < 1e-12);
        assert!(tl.entry_duration(3).abs() < f64::EPSILON);
        assert!((tl.average_entry_duration() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_progress() {
        let tl = timeline(&[0.0, 10.0], 20.0);
        assert!(tl.progress(0, 0.0).abs() < f64::EPSILON);
        assert!((tl.progress(0, 2.5) - 0.25).abs() < 1e-12);
        assert!((tl.progress(1, 15.0) - 0.5).abs() < 1e-12);
        assert!(tl.progress(0, 10.0) < 1.0);
        assert!(tl.progress(1, 5.0).abs() < f64::EPSILON);
        assert!(tl.progress(7, 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_zero_span_duplicate_timestamps() {
        let tl = timeline(&[0.0, 5.0, 5.0], 10.0);
        assert!(tl.progress(1, 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_wrap() {
        let tl = timeline(&[0.0, 10.0], 20.0);
        assert!((tl.wrap(25.0) - 5.0).abs() < 1e-12);
        assert!((tl.wrap(-5.0) - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_sanitizes_entries() {
        let entries = vec![
            LyricEntry::new(10.0, "second"),
            LyricEntry::new(0.0, "first"),
            LyricEntry::new(5.0, "   "),
            LyricEntry::new(f64::NAN, "broken"),
            LyricEntry::new(-1.0, "negative"),
        ];
        let tl = Timeline::new(entries, 20.0).unwrap();
        let texts: Vec<_> = tl.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);
    }

    #[test]
    fn test_rejects_empty_and_bad_duration() {
        assert!(matches!(
            Timeline::new(vec![LyricEntry::new(0.0, "")], 10.0),
            Err(CoreError::EmptyTimeline)
        ));
        assert!(matches!(
            Timeline::new(vec![LyricEntry::new(0.0, "a")], 0.0),
            Err(CoreError::InvalidDuration { .. })
        ));
        assert!(matches!(
            Timeline::new(vec![LyricEntry::new(0.0, "a")], f64::NAN),
            Err(CoreError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn test_short_duration_is_extended() {
        let tl = timeline(&[0.0, 10.0, 20.0], 15.0);
        assert!((tl.duration() - 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_inferred_duration() {
        let tl = Timeline::with_inferred_duration(vec![
            LyricEntry::new(0.0, "a"),
            LyricEntry::new(4.0, "b"),
        ])
        .unwrap();
        assert!((tl.duration() - 8.0).abs() < 1e-12);

        let single = Timeline::with_inferred_duration(vec![LyricEntry::new(1.0, "solo")]).unwrap();
        assert!((single.duration() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_lrc_prefers_override_then_length_tag() {
        let lrc = LrcFile::parse("[length:00:40]\n[00:00.00]a\n[00:10.00]b").unwrap();
        let tl = Timeline::from_lrc(lrc.clone(), None).unwrap();
        assert!((tl.duration() - 40.0).abs() < 1e-12);
        let tl = Timeline::from_lrc(lrc, Some(25.0)).unwrap();
        assert!((tl.duration() - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_json_with_anchor() {
        let json = r#"{
            "duration": 12.0,
            "entries": [
                { "time": 0.0, "text": "jade", "anchor": "玉" },
                { "time": 6.0, "text": "moon" }
            ]
        }"#;
        let tl = Timeline::from_json(json, None).unwrap();
        assert!((tl.duration() - 12.0).abs() < 1e-12);
        assert_eq!(tl.entry(0).and_then(|e| e.anchor), Some('玉'));
        assert_eq!(tl.entry(1).and_then(|e| e.anchor), None);
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(matches!(
            Timeline::from_json("{ not json", None),
            Err(CoreError::LyricsJson(_))
        ));
    }

    #[test]
    fn test_load_unknown_extension() {
        let path = std::env::temp_dir().join(format!("lyricsync-{}.txt", std::process::id()));
        std::fs::write(&path, "[00:01.00]x").unwrap();
        let result = Timeline::load(&path, None);
        assert!(matches!(result, Err(CoreError::UnsupportedLyricsFormat { .. })));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_lrc_file() {
        let path = std::env::temp_dir().join(format!("lyricsync-{}.lrc", std::process::id()));
        std::fs::write(&path, "[00:00.00]a\n[00:05.00]b\n").unwrap();
        let tl = Timeline::load(&path, Some(10.0)).unwrap();
        assert_eq!(tl.len(), 2);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_loop_thresholds() {
        let tl = timeline(&[0.0, 10.0, 20.0], 30.0);
        let thresholds = tl.loop_thresholds(&LoopCoolingConfig::default());
        assert!((thresholds.minor - 0.5).abs() < 1e-12);
        assert!((thresholds.main - 15.0).abs() < 1e-12);

        let long = timeline(&[0.0, 100.0], 200.0);
        assert!((long.loop_thresholds(&LoopCoolingConfig::default()).minor - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_interpolation_span() {
        let tl = timeline(&[0.0, 10.0], 20.0);
        assert!((tl.interpolation_span(0) - 10.0).abs() < 1e-12);
        assert!((tl.interpolation_span(1) - 10.0).abs() < 1e-12);
    }
}
