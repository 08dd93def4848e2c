//! Playback state machine
//!
//! One [`Player`] per tenant owns a [`PlayerSession`] behind an async mutex.
//! Command handlers and backend events both go through the player, so
//! transitions for one tenant are strictly sequential.
//!
//! State flow: Idle -> Loading -> Playing <-> Paused -> (TrackEnd) -> Idle | Loading

pub mod manager;
mod playback;
pub mod queue;
pub mod session;

use async_trait::async_trait;
use lava_common::config::PlayerConfig;
use lava_common::events::PlayerNotification;
use lava_common::{LoadResult, LoadType, LoopMode, Track};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::autoplay::AutoplayEngine;
use crate::backend::{AudioBackend, ResolutionBackend};
use crate::display::{
    DisplayError, DisplayScheduler, DisplaySurface, DisplayTarget, DisplayView, LyricLine,
    ViewOptions, ViewSource,
};
use crate::error::{Error, Result};
use crate::sources::SourceManager;

pub use manager::PlayerManager;
pub use playback::PlayOptions;
pub use queue::Queue;
pub use session::{PlaybackState, PlayerSession, SessionSnapshot, MAX_VOLUME};

/// Collaborators shared by every player in the process
pub struct PlayerContext {
    pub audio: Arc<dyn AudioBackend>,
    pub resolver: Arc<dyn ResolutionBackend>,
    pub sources: SourceManager,
    /// `None` when no recommendation provider is configured
    pub autoplay: Option<Arc<AutoplayEngine>>,
    pub surface: Arc<dyn DisplaySurface>,
    pub notifications: broadcast::Sender<PlayerNotification>,
    pub config: PlayerConfig,
}

struct SessionViewSource {
    session: Arc<Mutex<PlayerSession>>,
    options: ViewOptions,
}

#[async_trait]
impl ViewSource for SessionViewSource {
    async fn snapshot(&self) -> DisplayView {
        let session = self.session.lock().await;
        DisplayView::build(&session, &self.options, Instant::now())
    }
}

/// Handle to one tenant's player; clones share the session
#[derive(Clone)]
pub struct Player {
    guild_id: u64,
    session: Arc<Mutex<PlayerSession>>,
    context: Arc<PlayerContext>,
    display: DisplayScheduler,
}

impl Player {
    pub fn new(guild_id: u64, context: Arc<PlayerContext>) -> Self {
        let session = Arc::new(Mutex::new(PlayerSession::new(
            guild_id,
            context.config.history_limit,
        )));

        let source = Arc::new(SessionViewSource {
            session: Arc::clone(&session),
            options: ViewOptions::from(&context.config),
        });
        let display = DisplayScheduler::new(guild_id, Arc::clone(&context.surface), source);

        Self {
            guild_id,
            session,
            context,
            display,
        }
    }

    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }

    pub fn display(&self) -> &DisplayScheduler {
        &self.display
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    /// Current render-ready view of the session
    pub async fn view(&self) -> DisplayView {
        let session = self.session.lock().await;
        DisplayView::build(&session, &ViewOptions::from(&self.context.config), Instant::now())
    }

    fn action_delay(&self) -> Duration {
        Duration::from_millis(self.context.config.action_display_delay_ms)
    }

    fn notify(&self, notification: PlayerNotification) {
        // No subscribers is fine
        let _ = self.context.notifications.send(notification);
    }

    /// Schedule a render; a session without display is not an error here
    async fn request_display(&self, delay: Duration) {
        match self.display.update_display(None, delay).await {
            Ok(()) | Err(DisplayError::NothingToUpdate) => {}
            Err(e) => warn!(guild = self.guild_id, error = %e, "Display update failed"),
        }
    }

    /// Replace the display target and/or schedule a render after `delay`
    pub async fn update_display(
        &self,
        new_target: Option<DisplayTarget>,
        delay: Duration,
    ) -> std::result::Result<(), DisplayError> {
        self.display.update_display(new_target, delay).await
    }

    /// Insert a track; returns the index it landed at
    ///
    /// Without `index` the track goes right after the last user-requested
    /// track, ahead of the autoplay tail.
    pub async fn add(&self, track: Track, requester: u64, index: Option<usize>) -> usize {
        let mut session = self.session.lock().await;
        let index = index.unwrap_or_else(|| session.queue.default_insert_index());
        let index = session.queue.insert(index, track.with_requester(requester));
        debug!(guild = self.guild_id, index, requester, "Added track to queue");
        index
    }

    pub async fn set_loop(&self, mode: LoopMode) {
        self.session.lock().await.loop_mode = mode;
        info!(guild = self.guild_id, mode = %mode, "Loop mode set");
        self.request_display(Duration::ZERO).await;
    }

    /// Advance to the next loop mode (off, track, queue) and return it
    pub async fn cycle_loop(&self) -> LoopMode {
        let mode = {
            let mut session = self.session.lock().await;
            session.loop_mode = session.loop_mode.cycle();
            session.loop_mode
        };
        info!(guild = self.guild_id, mode = %mode, "Loop mode cycled");
        self.request_display(Duration::ZERO).await;
        mode
    }

    pub async fn set_shuffle(&self, shuffle: bool) {
        self.session.lock().await.shuffle = shuffle;
        info!(guild = self.guild_id, shuffle, "Shuffle set");
        self.request_display(Duration::ZERO).await;
    }

    /// Flip autoplay; returns the new state
    ///
    /// Turning it off cancels an in-flight batch and removes every
    /// autoplay-added queue entry.
    pub async fn toggle_autoplay(&self) -> Result<bool> {
        let mut session = self.session.lock().await;

        let enabled = if session.autoplay {
            session.autoplay = false;
            if let Some(handle) = session.autoplay_task.take() {
                handle.abort();
            }
            let removed = session.queue.remove_autoplay();
            info!(guild = self.guild_id, removed, "Autoplay disabled");
            false
        } else {
            if self.context.autoplay.is_none() {
                return Err(Error::InvalidState(
                    "Autoplay needs a recommendation provider".to_string(),
                ));
            }
            session.autoplay = true;
            info!(guild = self.guild_id, "Autoplay enabled");
            self.maybe_autoplay(&mut session);
            true
        };

        drop(session);
        self.request_display(Duration::ZERO).await;
        Ok(enabled)
    }

    /// Stop the node and clear the current track; the queue is kept
    ///
    /// The session goes idle and the display is refreshed even when the node
    /// rejects the stop. The node error is still returned.
    pub async fn stop(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        let stopped = self.context.audio.stop(self.guild_id).await;

        session.go_idle();
        session.paused = false;
        drop(session);

        match stopped {
            Ok(()) => info!(guild = self.guild_id, "Stopped playback"),
            Err(ref e) => warn!(guild = self.guild_id, error = %e, "Node stop failed, session cleared"),
        }

        self.request_display(Duration::ZERO).await;
        stopped.map_err(Error::from)
    }

    pub async fn set_pause(&self, paused: bool) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.current.is_none() {
            return Err(Error::InvalidState("Nothing is playing".to_string()));
        }

        self.context.audio.set_paused(self.guild_id, paused).await?;

        // Re-anchor the position so the paused span is not extrapolated
        let now = Instant::now();
        let position = session.estimated_position(now);
        session.record_position(position, now);

        session.paused = paused;
        session.state = match (session.state, paused) {
            (PlaybackState::Playing, true) => PlaybackState::Paused,
            (PlaybackState::Paused, false) => PlaybackState::Playing,
            (state, _) => state,
        };
        self.manage_idle_timer(&mut session);
        info!(guild = self.guild_id, paused, "Pause state changed");

        drop(session);
        self.request_display(Duration::ZERO).await;
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        self.set_pause(true).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.set_pause(false).await
    }

    /// Seek within the current track; returns the clamped position
    pub async fn seek(&self, position_ms: u64) -> Result<u64> {
        let mut session = self.session.lock().await;
        let Some(ref track) = session.current else {
            return Err(Error::InvalidState("Nothing is playing".to_string()));
        };
        if !track.is_seekable {
            return Err(Error::InvalidState("Current track is not seekable".to_string()));
        }

        let position = position_ms.min(track.duration_ms);
        self.context.audio.seek(self.guild_id, position).await?;
        session.record_position(position, Instant::now());
        debug!(guild = self.guild_id, position, "Seeked");

        drop(session);
        self.request_display(Duration::ZERO).await;
        Ok(position)
    }

    /// Set the node volume; returns the clamped value
    pub async fn set_volume(&self, volume: u16) -> Result<u16> {
        let volume = volume.min(MAX_VOLUME);
        let mut session = self.session.lock().await;
        self.context.audio.set_volume(self.guild_id, volume).await?;
        session.volume = volume;
        Ok(volume)
    }

    pub async fn remove(&self, index: usize) -> Result<Track> {
        let mut session = self.session.lock().await;
        let removed = session
            .queue
            .remove(index)
            .ok_or_else(|| Error::NotFound(format!("No queue entry at index {index}")))?;

        drop(session);
        self.request_display(self.action_delay()).await;
        Ok(removed)
    }

    /// Empty the queue; returns how many entries were dropped
    pub async fn clear_queue(&self) -> usize {
        let mut session = self.session.lock().await;
        let count = session.queue.len();
        session.queue.clear();
        info!(guild = self.guild_id, count, "Cleared queue");

        drop(session);
        self.request_display(Duration::ZERO).await;
        count
    }

    pub async fn set_filter(&self, name: &str, params: serde_json::Value) -> Result<()> {
        let mut session = self.session.lock().await;
        let mut filters = session.filters.clone();
        filters.insert(name.to_string(), params);

        self.context.audio.set_filters(self.guild_id, &filters).await?;
        session.filters = filters;
        info!(guild = self.guild_id, filter = name, "Filter applied");

        drop(session);
        self.request_display(Duration::ZERO).await;
        Ok(())
    }

    /// Remove one filter; returns whether it was active
    pub async fn remove_filter(&self, name: &str) -> Result<bool> {
        let mut session = self.session.lock().await;
        if !session.filters.contains_key(name) {
            return Ok(false);
        }

        let mut filters = session.filters.clone();
        filters.remove(name);
        self.context.audio.set_filters(self.guild_id, &filters).await?;
        session.filters = filters;

        drop(session);
        self.request_display(Duration::ZERO).await;
        Ok(true)
    }

    pub async fn clear_filters(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        let filters = Default::default();
        self.context.audio.set_filters(self.guild_id, &filters).await?;
        session.filters = filters;

        drop(session);
        self.request_display(Duration::ZERO).await;
        Ok(())
    }

    pub async fn set_lyrics(&self, lyrics: Option<Vec<LyricLine>>) {
        let mut session = self.session.lock().await;
        session.lyrics = lyrics.map(|mut lines| {
            lines.sort_by_key(|l| l.timestamp_ms);
            lines
        });
    }

    pub async fn set_show_lyrics(&self, show: bool) {
        self.session.lock().await.show_lyrics = show;
        self.request_display(Duration::ZERO).await;
    }

    pub async fn set_locale(&self, locale: impl Into<String>) {
        self.session.lock().await.locale = locale.into();
    }

    pub async fn set_connected(&self, connected: bool) {
        self.session.lock().await.connected = connected;
    }

    /// Resolve a query: the node first, then the source chain
    ///
    /// Every failure degrades to `None`.
    pub async fn resolve(&self, query: &str) -> Option<LoadResult> {
        match self.context.resolver.load_tracks(query).await {
            Ok(result) if !result.is_empty() => return Some(result),
            Ok(_) => debug!(query = %query, "Node found nothing, trying sources"),
            Err(e) => warn!(query = %query, error = %e, "Node lookup failed, trying sources"),
        }

        match self
            .context
            .sources
            .load_item(self.context.resolver.as_ref(), query)
            .await
        {
            Ok(Some(result)) if !result.is_empty() => Some(result),
            Ok(_) => None,
            Err(e) => {
                warn!(query = %query, error = %e, "Source lookup failed");
                None
            }
        }
    }

    /// Enqueue a load result; returns how many tracks were added
    ///
    /// Track and search results add their first track, playlists add every
    /// track at consecutive indices.
    pub async fn enqueue_result(
        &self,
        result: LoadResult,
        requester: u64,
        index: Option<usize>,
    ) -> Result<usize> {
        let tracks: Vec<Track> = match result.load_type {
            LoadType::Empty | LoadType::Error => Vec::new(),
            LoadType::Track | LoadType::Search => result.tracks.into_iter().take(1).collect(),
            LoadType::Playlist => result.tracks,
        };

        if tracks.is_empty() {
            return Err(Error::NoResults("nothing playable in result".to_string()));
        }

        let mut session = self.session.lock().await;
        let mut at = index.unwrap_or_else(|| session.queue.default_insert_index());
        let count = tracks.len();
        for track in tracks {
            at = session.queue.insert(at, track.with_requester(requester)) + 1;
        }
        info!(guild = self.guild_id, count, requester, "Enqueued tracks");
        Ok(count)
    }

    /// Resolve, enqueue, start playback if idle, and schedule a display update
    pub async fn play_query(
        &self,
        query: &str,
        requester: u64,
        index: Option<usize>,
        display_target: Option<DisplayTarget>,
    ) -> Result<LoadResult> {
        let result = self
            .resolve(query)
            .await
            .ok_or_else(|| Error::NoResults(query.to_string()))?;

        self.enqueue_result(result.clone(), requester, index).await?;

        {
            let mut session = self.session.lock().await;
            if session.current.is_none() {
                self.play_locked(&mut session, PlayOptions::default(), playback::Retire::Skipped)
                    .await?;
            }
        }

        match self.display.update_display(display_target, self.action_delay()).await {
            Ok(()) | Err(DisplayError::NothingToUpdate) => {}
            Err(e) => warn!(guild = self.guild_id, error = %e, "Display update failed"),
        }

        Ok(result)
    }

    /// Stop background work and drop the node-side player
    pub async fn teardown(&self) {
        self.session.lock().await.abort_tasks();
        self.display.shutdown().await;

        if let Err(e) = self.context.audio.destroy(self.guild_id).await {
            warn!(guild = self.guild_id, error = %e, "Failed to destroy node player");
        }
        info!(guild = self.guild_id, "Player torn down");
    }
}
