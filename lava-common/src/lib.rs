//! # Lava Common Library
//!
//! Shared code for the Lava playback services including:
//! - Track and load-result data model
//! - Backend lifecycle events and player notifications
//! - TOML configuration loading
//! - Human-readable time formatting

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod track;

pub use error::{Error, Result};
pub use track::{LoadResult, LoadType, LoopMode, PlaylistInfo, Track, AUTOPLAY_REQUESTER};
