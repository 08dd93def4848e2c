//! Per-tenant playback state
//!
//! [`PlayerSession`] is plain data guarded by the player's mutex. All
//! transitions live on [`crate::player::Player`]; the helpers here only
//! keep derived fields consistent.

use lava_common::{LoopMode, Track};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::queue::Queue;
use crate::backend::FilterSet;
use crate::display::LyricLine;

/// Default node volume
pub const DEFAULT_VOLUME: u16 = 100;

/// Upper bound accepted by the node
pub const MAX_VOLUME: u16 = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    #[default]
    Idle,
    /// Dispatched, waiting for the node's TrackStart
    Loading,
    Playing,
    Paused,
}

pub struct PlayerSession {
    pub guild_id: u64,
    pub queue: Queue,
    pub current: Option<Track>,
    /// Node-side identifier of the dispatched current track
    ///
    /// Differs from `current.identifier` for deferred tracks resolved by search.
    pub(crate) dispatched_id: Option<String>,
    /// Finished tracks, oldest first
    pub history: VecDeque<Track>,
    history_limit: usize,
    pub state: PlaybackState,
    /// Last position reported by the node
    pub position_ms: u64,
    position_updated_at: Option<Instant>,
    pub paused: bool,
    pub connected: bool,
    pub loop_mode: LoopMode,
    pub shuffle: bool,
    pub autoplay: bool,
    pub volume: u16,
    pub filters: FilterSet,
    pub lyrics: Option<Vec<LyricLine>>,
    pub show_lyrics: bool,
    pub locale: String,
    pub(crate) autoplay_task: Option<JoinHandle<()>>,
    pub(crate) idle_task: Option<JoinHandle<()>>,
}

/// Queue state captured before a transition that may have to be undone
pub(crate) struct Checkpoint {
    queue: Queue,
    current: Option<Track>,
    dispatched_id: Option<String>,
    history: VecDeque<Track>,
}

impl PlayerSession {
    pub fn new(guild_id: u64, history_limit: usize) -> Self {
        Self {
            guild_id,
            queue: Queue::new(),
            current: None,
            dispatched_id: None,
            history: VecDeque::new(),
            history_limit,
            state: PlaybackState::Idle,
            position_ms: 0,
            position_updated_at: None,
            paused: false,
            connected: false,
            loop_mode: LoopMode::Off,
            shuffle: false,
            autoplay: false,
            volume: DEFAULT_VOLUME,
            filters: FilterSet::new(),
            lyrics: None,
            show_lyrics: false,
            locale: "en-US".to_string(),
            autoplay_task: None,
            idle_task: None,
        }
    }

    /// True while an autoplay batch is in flight
    pub fn is_resolving_autoplay(&self) -> bool {
        self.autoplay_task.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Whether a track-scoped backend event refers to the current track
    pub fn is_current_event(&self, track_id: &str) -> bool {
        let Some(ref current) = self.current else {
            return false;
        };
        self.dispatched_id.as_deref() == Some(track_id) || current.identifier == track_id
    }

    /// A track is loaded and not paused
    pub fn is_active(&self) -> bool {
        self.current.is_some() && !self.paused
    }

    pub fn record_position(&mut self, position_ms: u64, at: Instant) {
        self.position_ms = position_ms;
        self.position_updated_at = Some(at);
    }

    /// Last reported position advanced by the time since the report
    ///
    /// Frozen while paused or loading; capped at the track duration.
    pub fn estimated_position(&self, now: Instant) -> u64 {
        let Some(ref track) = self.current else {
            return 0;
        };

        let mut position = self.position_ms;
        if self.state == PlaybackState::Playing {
            if let Some(at) = self.position_updated_at {
                position += now.saturating_duration_since(at).as_millis() as u64;
            }
        }

        if track.is_stream {
            position
        } else {
            position.min(track.duration_ms)
        }
    }

    pub fn push_history(&mut self, track: Track) {
        if self.history_limit == 0 {
            return;
        }
        while self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(track);
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            queue: self.queue.clone(),
            current: self.current.clone(),
            dispatched_id: self.dispatched_id.clone(),
            history: self.history.clone(),
        }
    }

    pub(crate) fn restore(&mut self, checkpoint: Checkpoint) {
        self.queue = checkpoint.queue;
        self.current = checkpoint.current;
        self.dispatched_id = checkpoint.dispatched_id;
        self.history = checkpoint.history;
    }

    /// Stop tracking the current track and go idle
    pub(crate) fn go_idle(&mut self) {
        self.current = None;
        self.dispatched_id = None;
        self.state = PlaybackState::Idle;
        self.position_ms = 0;
        self.position_updated_at = None;
    }

    /// Abort background tasks owned by the session
    pub(crate) fn abort_tasks(&mut self) {
        if let Some(handle) = self.autoplay_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.idle_task.take() {
            handle.abort();
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            guild_id: self.guild_id,
            current: self.current.clone(),
            queue: self.queue.iter().cloned().collect(),
            history_len: self.history.len(),
            state: self.state,
            position_ms: self.position_ms,
            paused: self.paused,
            connected: self.connected,
            loop_mode: self.loop_mode,
            shuffle: self.shuffle,
            autoplay: self.autoplay,
            volume: self.volume,
            filters: self.filters.clone(),
            locale: self.locale.clone(),
        }
    }
}

/// Owned copy of the observable session state
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub guild_id: u64,
    pub current: Option<Track>,
    pub queue: Vec<Track>,
    pub history_len: usize,
    pub state: PlaybackState,
    pub position_ms: u64,
    pub paused: bool,
    pub connected: bool,
    pub loop_mode: LoopMode,
    pub shuffle: bool,
    pub autoplay: bool,
    pub volume: u16,
    pub filters: FilterSet,
    pub locale: String,
}

impl SessionSnapshot {
    pub fn queue_ids(&self) -> Vec<String> {
        self.queue.iter().map(|t| t.identifier.clone()).collect()
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_ref().map(|t| t.identifier.as_str())
    }
}
