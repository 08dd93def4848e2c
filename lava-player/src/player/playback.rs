//! Transitions: track selection, backend events, autoplay and idle handling

use chrono::Utc;
use lava_common::events::{BackendEvent, PlayerNotification};
use lava_common::{LoopMode, Track};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::session::{PlaybackState, PlayerSession};
use super::Player;
use crate::autoplay::AutoplayEngine;
use crate::backend::PlayRequest;
use crate::error::{Error, Result};

/// Arguments to [`Player::play`]
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    /// Play this track instead of selecting from the queue
    pub track: Option<Track>,
    /// Start offset, must be within `[0, duration)`
    pub start_time_ms: Option<u64>,
    /// End offset, must be within `(0, duration]`
    pub end_time_ms: Option<u64>,
    /// Do nothing if a track is already active
    pub no_replace: bool,
}

/// What happens to the outgoing current track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Retire {
    /// Played to completion; loop mode applies in full
    Finished,
    /// Cut short by the user or a stuck stream; queue loop still applies,
    /// track repeat does not
    Skipped,
    /// Failed to load; discarded without touching history
    Dropped,
}

fn validate_timing(track: &Track, start: Option<u64>, end: Option<u64>) -> Result<()> {
    let duration = track.duration_ms;

    if let Some(start) = start {
        if start >= duration {
            return Err(Error::InvalidTiming(format!(
                "start time {start}ms outside [0, {duration})"
            )));
        }
    }

    if let Some(end) = end {
        if end == 0 || end > duration {
            return Err(Error::InvalidTiming(format!(
                "end time {end}ms outside (0, {duration}]"
            )));
        }
        if start.is_some_and(|start| start >= end) {
            return Err(Error::InvalidTiming(format!("end time {end}ms not after start time")));
        }
    }

    Ok(())
}

impl Player {
    /// Start playback
    ///
    /// Without an explicit track the next one is taken from the queue (at
    /// random with shuffle on). An active track is replaced unless
    /// `no_replace` is set. An empty queue sends the player idle.
    pub async fn play(&self, options: PlayOptions) -> Result<()> {
        let mut session = self.session.lock().await;
        self.play_locked(&mut session, options, Retire::Skipped).await?;
        drop(session);
        self.request_display(Duration::ZERO).await;
        Ok(())
    }

    /// End the current track early and move on
    pub async fn skip(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        info!(guild = self.guild_id, "Skipping current track");
        self.play_locked(&mut session, PlayOptions::default(), Retire::Skipped)
            .await?;
        drop(session);
        self.request_display(Duration::ZERO).await;
        Ok(())
    }

    /// Jump to the queue entry at `index`
    ///
    /// With `move_to_front` the entries before it stay queued; otherwise
    /// they are dropped.
    pub async fn skip_to(&self, index: usize, move_to_front: bool) -> Result<()> {
        let mut session = self.session.lock().await;
        if index >= session.queue.len() {
            return Err(Error::NotFound(format!("No queue entry at index {index}")));
        }

        let target = if move_to_front {
            session.queue.remove(index)
        } else {
            session.queue.drop_front(index);
            session.queue.remove(0)
        };

        let options = PlayOptions {
            track: target,
            ..Default::default()
        };
        self.play_locked(&mut session, options, Retire::Skipped).await?;
        drop(session);
        self.request_display(Duration::ZERO).await;
        Ok(())
    }

    /// Re-play the most recently finished track
    ///
    /// The current track goes back to the head of the queue. Returns `false`
    /// when there is no history. History never wraps around to the queue
    /// tail, whatever the loop mode.
    pub async fn previous(&self) -> Result<bool> {
        let mut session = self.session.lock().await;
        let Some(previous) = session.history.pop_back() else {
            debug!(guild = self.guild_id, "No previous track");
            return Ok(false);
        };

        // Queue loop appended the finished track to the tail; take it back
        if session.loop_mode == LoopMode::Queue
            && session
                .queue
                .back()
                .is_some_and(|t| t.identifier == previous.identifier)
        {
            session.queue.pop_back();
        }

        if let Some(current) = session.current.take() {
            session.dispatched_id = None;
            session.queue.push_front(current);
        }

        let options = PlayOptions {
            track: Some(previous),
            ..Default::default()
        };
        self.play_locked(&mut session, options, Retire::Dropped).await?;
        drop(session);
        self.request_display(Duration::ZERO).await;
        Ok(true)
    }

    /// Core transition; the caller holds the session lock
    pub(crate) async fn play_locked(
        &self,
        session: &mut PlayerSession,
        options: PlayOptions,
        retire: Retire,
    ) -> Result<()> {
        if options.no_replace && session.current.is_some() {
            debug!(guild = self.guild_id, "Track already active, ignoring play");
            return Ok(());
        }

        let mut checkpoint = Some(session.checkpoint());
        let mut explicit = options.track;
        let mut start_time = options.start_time_ms;
        let mut end_time = options.end_time_ms;

        let had_track = session.current.is_some();
        if let Some(outgoing) = session.current.take() {
            session.dispatched_id = None;
            self.retire(session, outgoing, retire, &mut explicit);
        }

        loop {
            let track = match explicit.take() {
                Some(track) => track,
                None => match session.queue.take_next(session.shuffle) {
                    Some(track) => track,
                    None => {
                        self.enter_idle(session, had_track).await;
                        return Ok(());
                    }
                },
            };

            if start_time.is_some() || end_time.is_some() {
                if let Err(e) = validate_timing(&track, start_time, end_time) {
                    if let Some(checkpoint) = checkpoint.take() {
                        session.restore(checkpoint);
                    }
                    return Err(e);
                }
            }
            checkpoint = None;

            let (track, encoded, node_id) = match self.prepare(&track).await {
                Ok(prepared) => prepared,
                Err(reason) => {
                    warn!(guild = self.guild_id, track = %track.identifier, reason = %reason, "Failed to load track, skipping");
                    self.notify(PlayerNotification::TrackLoadFailed {
                        guild_id: self.guild_id,
                        track,
                        error: reason,
                        timestamp: Utc::now(),
                    });
                    start_time = None;
                    end_time = None;
                    continue;
                }
            };

            let request = PlayRequest {
                encoded,
                start_time_ms: start_time,
                end_time_ms: end_time,
                volume: session.volume,
                paused: session.paused,
                no_replace: false,
            };

            match self.context.audio.play(self.guild_id, request).await {
                Ok(()) => {
                    info!(guild = self.guild_id, track = %track.identifier, title = %track.title, "Dispatched track");
                    session.current = Some(track.clone());
                    session.dispatched_id = Some(node_id);
                    session.state = PlaybackState::Loading;
                    session.record_position(start_time.unwrap_or(0), Instant::now());
                    self.cancel_idle_timer(session);
                    self.notify(PlayerNotification::TrackStarted {
                        guild_id: self.guild_id,
                        track,
                        timestamp: Utc::now(),
                    });
                    return Ok(());
                }
                Err(e) => {
                    error!(guild = self.guild_id, track = %track.identifier, error = %e, "Node rejected play request, skipping");
                    self.notify(PlayerNotification::DispatchFailed {
                        guild_id: self.guild_id,
                        track,
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    start_time = None;
                    end_time = None;
                }
            }
        }
    }

    fn retire(
        &self,
        session: &mut PlayerSession,
        outgoing: Track,
        retire: Retire,
        explicit: &mut Option<Track>,
    ) {
        match (retire, session.loop_mode) {
            (Retire::Dropped, _) => {
                debug!(guild = self.guild_id, track = %outgoing.identifier, "Dropping track");
            }
            (Retire::Finished, LoopMode::Track) => {
                if explicit.is_none() {
                    *explicit = Some(outgoing);
                } else {
                    session.queue.push_front(outgoing);
                }
            }
            (_, LoopMode::Queue) => {
                session.queue.push_back(outgoing.clone());
                session.push_history(outgoing);
            }
            _ => session.push_history(outgoing),
        }
    }

    /// Payload for dispatch plus the identifier the node will report
    ///
    /// Deferred tracks are searched on the node by title and author.
    async fn prepare(&self, track: &Track) -> std::result::Result<(Track, String, String), String> {
        if let Some(ref encoded) = track.encoded {
            return Ok((track.clone(), encoded.clone(), track.identifier.clone()));
        }

        let query = track.fallback_search_query();
        debug!(guild = self.guild_id, track = %track.identifier, query = %query, "Resolving deferred track");

        let result = self
            .context
            .resolver
            .load_tracks(&query)
            .await
            .map_err(|e| e.to_string())?;

        if result.is_empty() {
            return Err(format!("no match for {query}"));
        }
        let resolved = result
            .tracks
            .into_iter()
            .next()
            .ok_or_else(|| format!("no match for {query}"))?;
        let encoded = resolved
            .encoded
            .ok_or_else(|| format!("fallback for {query} is not playable"))?;

        let mut track = track.clone();
        track.encoded = Some(encoded.clone());
        Ok((track, encoded, resolved.identifier))
    }

    async fn enter_idle(&self, session: &mut PlayerSession, stop_backend: bool) {
        session.go_idle();
        info!(guild = self.guild_id, "Queue ended");

        if stop_backend {
            if let Err(e) = self.context.audio.stop(self.guild_id).await {
                warn!(guild = self.guild_id, error = %e, "Failed to stop node player");
            }
        }

        self.notify(PlayerNotification::QueueEnded {
            guild_id: self.guild_id,
            timestamp: Utc::now(),
        });

        self.maybe_autoplay(session);
        self.manage_idle_timer(session);
    }

    /// Feed one backend lifecycle event into the state machine
    ///
    /// Track-scoped events for anything but the current track are stale and
    /// ignored.
    pub async fn handle_event(&self, event: BackendEvent) -> Result<()> {
        let mut session = self.session.lock().await;
        debug!(guild = self.guild_id, event = event.kind(), "Handling backend event");

        match event {
            BackendEvent::TrackStart { track_id } => {
                if !session.is_current_event(&track_id) {
                    debug!(guild = self.guild_id, track = %track_id, "Ignoring stale TrackStart");
                    return Ok(());
                }
                session.state = if session.paused {
                    PlaybackState::Paused
                } else {
                    PlaybackState::Playing
                };
                self.manage_idle_timer(&mut session);
            }
            BackendEvent::TrackEnd { track_id, reason } => {
                if !session.is_current_event(&track_id) {
                    debug!(guild = self.guild_id, track = %track_id, "Ignoring stale TrackEnd");
                    return Ok(());
                }
                if !reason.advances_queue() {
                    debug!(guild = self.guild_id, reason = %reason, "Track ended without advancing");
                    return Ok(());
                }
                self.play_locked(&mut session, PlayOptions::default(), Retire::Finished)
                    .await?;
            }
            BackendEvent::TrackLoadFailed { track_id, error } => {
                if !session.is_current_event(&track_id) {
                    debug!(guild = self.guild_id, track = %track_id, "Ignoring stale TrackLoadFailed");
                    return Ok(());
                }
                if let Some(track) = session.current.clone() {
                    warn!(guild = self.guild_id, track = %track.identifier, error = %error, "Track failed to load, skipping");
                    self.notify(PlayerNotification::TrackLoadFailed {
                        guild_id: self.guild_id,
                        track,
                        error,
                        timestamp: Utc::now(),
                    });
                }
                self.play_locked(&mut session, PlayOptions::default(), Retire::Dropped)
                    .await?;
            }
            BackendEvent::TrackStuck {
                track_id,
                threshold_ms,
            } => {
                if !session.is_current_event(&track_id) {
                    return Ok(());
                }
                if let Some(track) = session.current.clone() {
                    warn!(guild = self.guild_id, track = %track.identifier, threshold_ms, "Track stuck, skipping");
                    self.notify(PlayerNotification::TrackStuck {
                        guild_id: self.guild_id,
                        track,
                        timestamp: Utc::now(),
                    });
                }
                self.play_locked(&mut session, PlayOptions::default(), Retire::Skipped)
                    .await?;
            }
            BackendEvent::QueueEnd => {
                if session.current.is_none() {
                    session.state = PlaybackState::Idle;
                }
            }
            BackendEvent::PositionUpdate {
                position_ms,
                connected,
                ..
            } => {
                session.connected = connected;
                if session.current.is_some() {
                    session.record_position(position_ms, Instant::now());
                }
                self.maybe_autoplay(&mut session);
                self.manage_idle_timer(&mut session);
            }
        }

        drop(session);
        self.request_display(Duration::ZERO).await;
        Ok(())
    }

    /// Start an autoplay batch if the session needs one and none is in flight
    pub(crate) fn maybe_autoplay(&self, session: &mut PlayerSession) {
        let Some(ref engine) = self.context.autoplay else {
            return;
        };
        if !session.autoplay || session.is_resolving_autoplay() {
            return;
        }

        let count = engine.batch_size(session.queue.len());
        if count == 0 {
            return;
        }

        let Some(seed) = session
            .current
            .clone()
            .or_else(|| session.history.back().cloned())
        else {
            debug!(guild = self.guild_id, "No seed track for autoplay");
            return;
        };

        let mut queued = session.queue.identifiers();
        if let Some(ref current) = session.current {
            queued.insert(current.identifier.clone());
        }

        info!(guild = self.guild_id, seed = %seed.identifier, count, "Queue running low, fetching recommendations");

        let player = self.clone();
        let engine = Arc::clone(engine);
        session.autoplay_task = Some(tokio::spawn(async move {
            player.run_autoplay(engine, seed, queued, count).await;
        }));
    }

    async fn run_autoplay(
        &self,
        engine: Arc<AutoplayEngine>,
        seed: Track,
        queued: HashSet<String>,
        count: usize,
    ) {
        let result = engine.fetch_batch(&seed, &queued, count).await;

        let mut session = self.session.lock().await;
        if !session.autoplay {
            debug!(guild = self.guild_id, "Autoplay turned off during fetch, discarding batch");
            return;
        }

        match result {
            Ok(tracks) => {
                let mut added = 0;
                for track in tracks {
                    if added >= count || session.queue.len() >= engine.low_water_mark() {
                        break;
                    }
                    let duplicate = session.queue.contains(&track.identifier)
                        || session
                            .current
                            .as_ref()
                            .is_some_and(|c| c.identifier == track.identifier);
                    if duplicate {
                        continue;
                    }
                    session.queue.push_back(track);
                    added += 1;
                }

                info!(guild = self.guild_id, added, "Autoplay batch enqueued");

                if added > 0 {
                    self.notify(PlayerNotification::AutoplayQueued {
                        guild_id: self.guild_id,
                        count: added,
                        timestamp: Utc::now(),
                    });

                    if session.current.is_none() {
                        if let Err(e) = self
                            .play_locked(&mut session, PlayOptions::default(), Retire::Skipped)
                            .await
                        {
                            warn!(guild = self.guild_id, error = %e, "Failed to start autoplay track");
                        }
                    }
                }
            }
            Err(e) => {
                warn!(guild = self.guild_id, error = %e, "Autoplay unavailable, disabling");
                session.autoplay = false;
                self.notify(PlayerNotification::AutoplayDisabled {
                    guild_id: self.guild_id,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }

        drop(session);
        self.request_display(Duration::ZERO).await;
    }

    /// Arm the idle timer while nothing is actively playing, disarm otherwise
    pub(crate) fn manage_idle_timer(&self, session: &mut PlayerSession) {
        let timeout = self.context.config.idle_timeout_secs;
        if timeout == 0 {
            return;
        }

        if session.is_active() {
            self.cancel_idle_timer(session);
            return;
        }

        if session.idle_task.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        debug!(guild = self.guild_id, timeout_secs = timeout, "Starting idle timer");
        let player = self.clone();
        session.idle_task = Some(tokio::spawn(async move {
            player.run_idle_timer(Duration::from_secs(timeout)).await;
        }));
    }

    fn cancel_idle_timer(&self, session: &mut PlayerSession) {
        if let Some(handle) = session.idle_task.take() {
            debug!(guild = self.guild_id, "Cancelling idle timer");
            handle.abort();
        }
    }

    async fn run_idle_timer(&self, timeout: Duration) {
        tokio::time::sleep(timeout).await;

        let mut session = self.session.lock().await;
        if session.is_active() {
            return;
        }

        info!(guild = self.guild_id, "Idle timeout reached, stopping");
        session.idle_task = None;
        if let Some(handle) = session.autoplay_task.take() {
            handle.abort();
        }
        session.go_idle();
        session.paused = false;

        if let Err(e) = self.context.audio.stop(self.guild_id).await {
            warn!(guild = self.guild_id, error = %e, "Failed to stop node player");
        }

        self.notify(PlayerNotification::IdleTimeout {
            guild_id: self.guild_id,
            timestamp: Utc::now(),
        });

        drop(session);
        self.request_display(Duration::ZERO).await;
    }
}
