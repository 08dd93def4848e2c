//! Timed lyrics
//!
//! Lines are kept sorted by timestamp; the display shows the slice that
//! falls within a window around the playback position.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const LRC_LINE_PATTERN: &str = r"^\[(\d+):(\d{1,2})(?:[.:](\d{1,3}))?\](.*)$";

fn lrc_rx() -> Option<&'static Regex> {
    static RX: OnceLock<Option<Regex>> = OnceLock::new();
    RX.get_or_init(|| Regex::new(LRC_LINE_PATTERN).ok()).as_ref()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricLine {
    pub timestamp_ms: u64,
    pub text: String,
}

/// Parse `[mm:ss.xx] text` lines; anything else is ignored
pub fn parse_lrc(content: &str) -> Vec<LyricLine> {
    let Some(rx) = lrc_rx() else {
        return Vec::new();
    };

    let mut lines: Vec<LyricLine> = content
        .lines()
        .filter_map(|line| {
            let caps = rx.captures(line.trim())?;
            let minutes: u64 = caps.get(1)?.as_str().parse().ok()?;
            let seconds: u64 = caps.get(2)?.as_str().parse().ok()?;
            let fraction_ms = caps
                .get(3)
                .map(|m| {
                    // "5" is 500ms, "05" is 50ms, "005" is 5ms
                    let digits = m.as_str();
                    let value: u64 = digits.parse().unwrap_or(0);
                    value * 10u64.pow(3 - digits.len() as u32)
                })
                .unwrap_or(0);

            Some(LyricLine {
                timestamp_ms: minutes * 60_000 + seconds * 1000 + fraction_ms,
                text: caps.get(4)?.as_str().trim().to_string(),
            })
        })
        .collect();

    lines.sort_by_key(|l| l.timestamp_ms);
    lines
}

/// Lines within `window_ms` either side of `position_ms`
pub fn lyric_window(lines: &[LyricLine], position_ms: u64, window_ms: u64) -> Vec<LyricLine> {
    let from = position_ms.saturating_sub(window_ms);
    let to = position_ms.saturating_add(window_ms);

    lines
        .iter()
        .filter(|l| l.timestamp_ms >= from && l.timestamp_ms <= to)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lrc() {
        let lines = parse_lrc("[ar: someone]\n[00:12.50] second\n[00:01.00]first\nnot a lyric\n[01:02.005] third");

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], LyricLine { timestamp_ms: 1000, text: "first".to_string() });
        assert_eq!(lines[1].timestamp_ms, 12_500);
        assert_eq!(lines[2].timestamp_ms, 62_005);
    }

    #[test]
    fn test_lyric_window() {
        let lines: Vec<LyricLine> = [0u64, 5_000, 12_000, 30_000]
            .iter()
            .map(|ts| LyricLine { timestamp_ms: *ts, text: ts.to_string() })
            .collect();

        let window = lyric_window(&lines, 8_000, 5_000);
        let stamps: Vec<u64> = window.iter().map(|l| l.timestamp_ms).collect();
        assert_eq!(stamps, vec![5_000, 12_000]);

        assert_eq!(lyric_window(&lines, 1_000, 2_000).len(), 1);
    }
}
