//! Audio node collaborators
//!
//! The player never decodes audio itself. It talks to a remote node through
//! two seams:
//! - [`ResolutionBackend`]: turns a query into a [`LoadResult`]
//! - [`AudioBackend`]: accepts play/pause/seek/... control requests
//!
//! Lifecycle events flow back as [`lava_common::events::BackendEvent`]s fed
//! into [`crate::player::Player::handle_event`].

pub mod node_client;

use async_trait::async_trait;
use lava_common::LoadResult;
use std::collections::BTreeMap;
use thiserror::Error;

pub use node_client::NodeClient;

/// Active audio filters keyed by filter name
pub type FilterSet = BTreeMap<String, serde_json::Value>;

/// Audio node errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Node returned {0}: {1}")]
    Status(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Node session not established")]
    NoSession,
}

/// Request to start a track on the node
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRequest {
    /// Opaque node payload
    pub encoded: String,
    pub start_time_ms: Option<u64>,
    pub end_time_ms: Option<u64>,
    pub volume: u16,
    pub paused: bool,
    /// Ignore the request if the node is already playing something
    pub no_replace: bool,
}

/// Playback control on the node, scoped by guild
#[async_trait]
pub trait AudioBackend: Send + Sync {
    async fn play(&self, guild_id: u64, request: PlayRequest) -> Result<(), BackendError>;

    async fn stop(&self, guild_id: u64) -> Result<(), BackendError>;

    async fn set_paused(&self, guild_id: u64, paused: bool) -> Result<(), BackendError>;

    async fn seek(&self, guild_id: u64, position_ms: u64) -> Result<(), BackendError>;

    async fn set_volume(&self, guild_id: u64, volume: u16) -> Result<(), BackendError>;

    async fn set_filters(&self, guild_id: u64, filters: &FilterSet) -> Result<(), BackendError>;

    /// Drop the node-side player entirely
    async fn destroy(&self, guild_id: u64) -> Result<(), BackendError>;
}

/// Query resolution on the node
#[async_trait]
pub trait ResolutionBackend: Send + Sync {
    /// Resolve a url or prefixed search (`ytsearch:...`) into tracks
    ///
    /// An unmatched query is an `Ok` empty result, not an error.
    async fn load_tracks(&self, query: &str) -> Result<LoadResult, BackendError>;
}
