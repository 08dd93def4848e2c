//! Human-readable time formatting
//!
//! Provides the position/duration strings and progress bar shown on the
//! player display.

/// Number of cells in a progress bar
const PROGRESS_CELLS: f64 = 10.0;

/// Format milliseconds as `MM:SS`, or `HH:MM:SS` once past an hour
///
/// # Examples
///
/// ```
/// use lava_common::human_time::format_time;
///
/// assert_eq!(format_time(0), "00:00");
/// assert_eq!(format_time(65_000), "01:05");
/// assert_eq!(format_time(3_661_000), "01:01:01");
/// ```
pub fn format_time(ms: u64) -> String {
    let total_seconds = (ms as f64 / 1000.0).round() as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Glyphs used to draw a progress bar
#[derive(Debug, Clone)]
pub struct ProgressBarStyle {
    pub start: String,
    pub played: String,
    pub marker: String,
    pub remaining: String,
    pub end: String,
    /// Replaces `end` when playback reached the end of the track
    pub end_reached: String,
}

impl Default for ProgressBarStyle {
    fn default() -> Self {
        Self {
            start: "[".to_string(),
            played: "=".to_string(),
            marker: "o".to_string(),
            remaining: "-".to_string(),
            end: "]".to_string(),
            end_reached: "]".to_string(),
        }
    }
}

/// Render a ten-cell progress bar for `position_ms` within `duration_ms`
///
/// A zero duration (streams) is treated as one second so the bar stays
/// drawable.
pub fn progress_bar(position_ms: u64, duration_ms: u64, style: &ProgressBarStyle) -> String {
    let mut duration = (duration_ms as f64 / 1000.0).round();
    let position = (position_ms as f64 / 1000.0).round();

    if duration == 0.0 {
        duration = 1.0;
    }

    let fraction = (position / duration).clamp(0.0, 1.0);
    let finished = fraction >= 1.0;

    let played = (fraction * PROGRESS_CELLS).round() as usize;
    let remaining = ((1.0 - fraction) * PROGRESS_CELLS).round() as usize;

    let mut bar = String::new();
    bar.push_str(&style.start);
    bar.push_str(&style.played.repeat(played));
    bar.push_str(if finished { &style.played } else { &style.marker });
    bar.push_str(&style.remaining.repeat(remaining));
    bar.push_str(if finished { &style.end_reached } else { &style.end });
    bar
}
