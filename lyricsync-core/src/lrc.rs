use crate::error::{CoreError, Result};
use crate::timeline::LyricEntry;

/// Parsed LRC file containing metadata and timestamped lyric entries
#[derive(Debug, Clone, Default)]
pub struct LrcFile {
    pub metadata: LrcMetadata,
    /// Entries sorted by time, offset already applied
    pub entries: Vec<LyricEntry>,
}

/// LRC metadata from ID tags
#[derive(Debug, Clone, Default)]
pub struct LrcMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub author: Option<String>,
    /// Track length in seconds from the `[length:]` tag
    pub length: Option<f64>,
    pub offset: i64, // milliseconds, can be negative
}

impl LrcFile {
    /// Parse an LRC string into an `LrcFile`
    ///
    /// Lines that are neither ID tags nor timestamped lyrics are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LrcParseError`] if the input contains no timestamped lines.
    pub fn parse(input: &str) -> Result<Self> {
        let mut metadata = LrcMetadata::default();
        let mut entries = Vec::new();

        for line in input.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some((tag, value)) = parse_id_tag(line) {
                match tag.to_lowercase().as_str() {
                    "ti" => metadata.title = Some(value),
                    "ar" => metadata.artist = Some(value),
                    "al" => metadata.album = Some(value),
                    "au" => metadata.author = Some(value),
                    "length" => metadata.length = parse_duration_tag(&value),
                    "offset" => {
                        if let Ok(offset) = value.parse::<i64>() {
                            metadata.offset = offset;
                        }
                    }
                    _ => {} // Ignore unknown tags
                }
                continue;
            }

            if let Some(parsed) = parse_lyric_line(line) {
                entries.extend(parsed);
            }
        }

        if entries.is_empty() {
            return Err(CoreError::LrcParseError {
                reason: "no timestamped lyric lines".to_string(),
            });
        }

        if metadata.offset != 0 {
            for entry in &mut entries {
                entry.time = apply_offset(entry.time, metadata.offset);
            }
        }

        entries.sort_by(|a, b| a.time.total_cmp(&b.time));

        Ok(Self { metadata, entries })
    }
}

/// Parse an ID tag like [ti:Title] or [ar:Artist]
fn parse_id_tag(line: &str) -> Option<(String, String)> {
    if !line.starts_with('[') || !line.contains(':') {
        return None;
    }

    let end = line.find(']')?;
    let content = &line[1..end];

    let first_colon = content.find(':')?;
    let tag = &content[..first_colon];

    // A numeric tag is a timestamp, not an ID tag
    if tag.is_empty() || tag.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let value = content[first_colon + 1..].trim().to_string();
    Some((tag.to_string(), value))
}

/// Parse a duration string like "mm:ss" or "mm:ss.xx" into seconds
fn parse_duration_tag(s: &str) -> Option<f64> {
    let (minutes, seconds) = s.split_once(':')?;
    let minutes: u32 = minutes.trim().parse().ok()?;
    let seconds: f64 = seconds.trim().parse().ok()?;
    Some(f64::from(minutes) * 60.0 + seconds)
}

/// Parse a lyric line like [00:12.34]Hello world or [00:12.34][00:15.67]Same lyrics
fn parse_lyric_line(line: &str) -> Option<Vec<LyricEntry>> {
    let mut remaining = line;
    let mut timestamps = Vec::new();

    while remaining.starts_with('[') {
        let Some(end) = remaining.find(']') else {
            break;
        };
        let Some(time) = parse_timestamp(&remaining[1..end]) else {
            break;
        };
        timestamps.push(time);
        remaining = &remaining[end + 1..];
    }

    if timestamps.is_empty() {
        return None;
    }

    let text = remaining.trim();
    Some(
        timestamps
            .into_iter()
            .map(|time| LyricEntry::new(time, text))
            .collect(),
    )
}

/// Parse a timestamp string like "00:12.34", "00:12:34" or "00:12" into seconds
fn parse_timestamp(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.trim().split(':').collect();

    match parts.as_slice() {
        [minutes, seconds] => {
            let minutes: u32 = minutes.parse().ok()?;
            let seconds: f64 = seconds.parse().ok()?;
            if !seconds.is_finite() || seconds < 0.0 {
                return None;
            }
            Some(f64::from(minutes) * 60.0 + seconds)
        }
        [minutes, seconds, hundredths] => {
            let minutes: u32 = minutes.parse().ok()?;
            let seconds: u32 = seconds.parse().ok()?;
            let hundredths: u32 = hundredths.parse().ok()?;
            Some(f64::from(minutes) * 60.0 + f64::from(seconds) + f64::from(hundredths) / 100.0)
        }
        _ => None,
    }
}

/// Apply a millisecond offset, clamping at zero
fn apply_offset(time: f64, offset_ms: i64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let offset = offset_ms as f64 / 1000.0;
    (time + offset).max(0.0)
}
