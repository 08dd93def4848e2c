//! Display view model
//!
//! A flattened, render-ready copy of one session, built at render time so
//! the surface always shows the latest state.

use lava_common::config::PlayerConfig;
use lava_common::human_time::{format_time, progress_bar, ProgressBarStyle};
use lava_common::{LoopMode, Track};
use serde::Serialize;
use tokio::time::Instant;

use super::lyrics::{lyric_window, LyricLine};
use crate::player::{PlaybackState, PlayerSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisplayStatus {
    Playing,
    Paused,
    Disconnected,
    Ended,
    Loading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequesterLabel {
    Autoplay,
    User(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NowPlaying {
    pub title: String,
    pub author: String,
    pub uri: String,
    pub requester: RequesterLabel,
    pub position: String,
    pub duration: String,
    pub progress_bar: String,
    pub artwork_url: Option<String>,
    pub is_stream: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueuePreview {
    /// `**[n]** title`, numbered from 1
    pub entries: Vec<String>,
    /// More entries exist beyond the preview
    pub more: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ViewOptions {
    pub queue_preview_len: usize,
    pub lyrics_window_ms: u64,
}

impl From<&PlayerConfig> for ViewOptions {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            queue_preview_len: config.queue_preview_len,
            lyrics_window_ms: config.lyrics_window_ms,
        }
    }
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self::from(&PlayerConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayView {
    pub guild_id: u64,
    pub status: DisplayStatus,
    pub now_playing: Option<NowPlaying>,
    pub loop_mode: LoopMode,
    pub shuffle: bool,
    pub autoplay: bool,
    /// Capitalized names of the active filters
    pub filters: Vec<String>,
    pub queue: QueuePreview,
    /// Empty unless lyrics are loaded and shown
    pub lyrics: Vec<LyricLine>,
    pub locale: String,
    pub controls_enabled: bool,
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn now_playing(track: &Track, position_ms: u64) -> NowPlaying {
    let requester = if track.is_autoplay() {
        RequesterLabel::Autoplay
    } else {
        RequesterLabel::User(track.requester)
    };

    NowPlaying {
        title: track.title.clone(),
        author: track.author.clone(),
        uri: track.uri.clone(),
        requester,
        position: format_time(position_ms),
        duration: format_time(track.duration_ms),
        progress_bar: progress_bar(position_ms, track.duration_ms, &ProgressBarStyle::default()),
        artwork_url: track.artwork_url.clone(),
        is_stream: track.is_stream,
    }
}

impl DisplayView {
    pub fn build(session: &PlayerSession, options: &ViewOptions, now: Instant) -> Self {
        let position_ms = session.estimated_position(now);

        let status = if !session.connected {
            DisplayStatus::Disconnected
        } else {
            match (&session.current, session.state) {
                (None, _) => DisplayStatus::Ended,
                (Some(_), PlaybackState::Idle | PlaybackState::Loading) => DisplayStatus::Loading,
                (Some(_), PlaybackState::Paused) => DisplayStatus::Paused,
                (Some(_), PlaybackState::Playing) => DisplayStatus::Playing,
            }
        };

        let entries: Vec<String> = session
            .queue
            .iter()
            .take(options.queue_preview_len)
            .enumerate()
            .map(|(i, track)| format!("**[{}]** {}", i + 1, track.title))
            .collect();

        let lyrics = match (&session.lyrics, session.show_lyrics) {
            (Some(lines), true) => lyric_window(lines, position_ms, options.lyrics_window_ms),
            _ => Vec::new(),
        };

        Self {
            guild_id: session.guild_id,
            status,
            now_playing: session.current.as_ref().map(|t| now_playing(t, position_ms)),
            loop_mode: session.loop_mode,
            shuffle: session.shuffle,
            autoplay: session.autoplay,
            filters: session.filters.keys().map(|f| capitalize(f)).collect(),
            queue: QueuePreview {
                more: session.queue.len() > entries.len(),
                entries,
            },
            lyrics,
            locale: session.locale.clone(),
            controls_enabled: session.connected && session.current.is_some(),
        }
    }
}
