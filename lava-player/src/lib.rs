//! # Lava Player Library (lava-player)
//!
//! Per-guild music playback controller sitting between a chat command
//! surface and a remote audio node.
//!
//! **Components:**
//! - `player`: queue and playback state machine, one session per guild
//! - `sources`: priority-ordered resolution chain for non-native queries
//! - `autoplay`: recommendation-driven queue top-up
//! - `display`: debounced display updates and the view model
//! - `backend`: node collaborators and their REST client
//! - `voice`: voice-join preconditions for command handlers

pub mod autoplay;
pub mod backend;
pub mod bilibili_client;
pub mod display;
pub mod error;
pub mod player;
pub mod sources;
pub mod spotify_client;
pub mod voice;

pub use error::{Error, Result};
pub use player::{Player, PlayerContext, PlayerManager};
