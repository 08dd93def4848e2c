//! Player display
//!
//! The display is an external message surface (a chat message with embed
//! and buttons) that mirrors one session. This module owns:
//! - [`DisplayView`]: the render-ready view model
//! - [`DisplayScheduler`]: debounced, last-state-wins propagation to the surface
//! - timed lyrics helpers

pub mod lyrics;
pub mod scheduler;
pub mod view;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use lyrics::LyricLine;
pub use scheduler::{DisplayScheduler, ViewSource};
pub use view::{DisplayStatus, DisplayView, NowPlaying, QueuePreview, RequesterLabel, ViewOptions};

/// Display surface errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DisplayError {
    /// No display target was ever established and none was supplied
    #[error("Nothing to update")]
    NothingToUpdate,

    /// The target message or channel is gone
    #[error("Display target not found")]
    NotFound,

    #[error("Display surface error: {0}")]
    Surface(String),
}

/// Handle to the message a session renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayTarget {
    pub channel_id: u64,
    pub message_id: u64,
}

/// The external renderer
#[async_trait]
pub trait DisplaySurface: Send + Sync {
    /// Render `view` onto `target`, replacing its previous content
    async fn render(&self, target: &DisplayTarget, view: &DisplayView) -> Result<(), DisplayError>;

    /// Delete `target`; a target that is already gone yields `NotFound`
    async fn delete(&self, target: &DisplayTarget) -> Result<(), DisplayError>;
}
