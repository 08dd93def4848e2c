//! Per-tenant player registry
//!
//! Exactly one [`Player`] exists per guild. Players are created on the first
//! voice-join request and destroyed on stop/disconnect or voice eviction.

use lava_common::events::{BackendEvent, PlayerNotification};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::{Player, PlayerContext};
use crate::display::DisplayError;
use crate::error::Result;

/// Capacity of the notification channel
pub const NOTIFICATION_CAPACITY: usize = 100;

pub struct PlayerManager {
    context: Arc<PlayerContext>,
    players: RwLock<HashMap<u64, Player>>,
}

impl PlayerManager {
    pub fn new(context: PlayerContext) -> Self {
        Self {
            context: Arc::new(context),
            players: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to notifications from every session
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerNotification> {
        self.context.notifications.subscribe()
    }

    pub async fn get(&self, guild_id: u64) -> Option<Player> {
        self.players.read().await.get(&guild_id).cloned()
    }

    pub async fn get_or_create(&self, guild_id: u64) -> Player {
        if let Some(player) = self.get(guild_id).await {
            return player;
        }

        let mut players = self.players.write().await;
        players
            .entry(guild_id)
            .or_insert_with(|| {
                info!(guild = guild_id, "Creating player");
                Player::new(guild_id, Arc::clone(&self.context))
            })
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.players.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.players.read().await.is_empty()
    }

    /// Remove and tear down a session; returns whether one existed
    pub async fn destroy(&self, guild_id: u64) -> bool {
        let removed = self.players.write().await.remove(&guild_id);

        match removed {
            Some(player) => {
                player.teardown().await;
                info!(guild = guild_id, "Destroyed player");
                true
            }
            None => false,
        }
    }

    /// Route a backend event to its session; events for unknown guilds are dropped
    pub async fn dispatch_event(&self, guild_id: u64, event: BackendEvent) -> Result<()> {
        match self.get(guild_id).await {
            Some(player) => player.handle_event(event).await,
            None => {
                debug!(guild = guild_id, event = event.kind(), "Event for unknown player, ignoring");
                Ok(())
            }
        }
    }

    /// The bot was removed from the voice channel
    ///
    /// Stops playback, clears the queue, renders the final state and
    /// destroys the session.
    pub async fn on_voice_eviction(&self, guild_id: u64) {
        let Some(player) = self.get(guild_id).await else {
            return;
        };

        info!(guild = guild_id, "Evicted from voice, cleaning up");

        player.set_connected(false).await;
        if let Err(e) = player.stop().await {
            warn!(guild = guild_id, error = %e, "Failed to stop player on eviction");
        }
        player.clear_queue().await;

        match player.display().render_now().await {
            Ok(()) | Err(DisplayError::NothingToUpdate) => {}
            Err(e) => warn!(guild = guild_id, error = %e, "Final display update failed"),
        }

        self.destroy(guild_id).await;
    }

    /// Tear down every session
    pub async fn shutdown(&self) {
        let guilds: Vec<u64> = self.players.read().await.keys().copied().collect();
        info!(count = guilds.len(), "Shutting down players");

        for guild_id in guilds {
            self.destroy(guild_id).await;
        }
    }
}
