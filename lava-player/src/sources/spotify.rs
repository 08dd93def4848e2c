//! Spotify url source
//!
//! Spotify tracks cannot be streamed by the node, so every track returned
//! here is deferred (no encoded payload) and later resolved through a
//! `ytsearch:` fallback right before dispatch.

use async_trait::async_trait;
use lava_common::{LoadResult, Track};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use super::{Source, SourceError};
use crate::backend::ResolutionBackend;

const SPOTIFY_URL_PATTERN: &str =
    r"^https?://open\.spotify\.com/(?:intl-[a-z]{2}/)?(track|album|playlist)/([a-zA-Z0-9]+)";

/// Source name carried on tracks produced from the Spotify catalog
pub const SPOTIFY_SOURCE_NAME: &str = "spotify";

fn spotify_url_rx() -> Option<&'static Regex> {
    static RX: OnceLock<Option<Regex>> = OnceLock::new();
    RX.get_or_init(|| Regex::new(SPOTIFY_URL_PATTERN).ok()).as_ref()
}

/// Kind of Spotify resource a url points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotifyResource {
    Track,
    Album,
    Playlist,
}

/// Split a Spotify url into resource kind and catalog id
pub fn parse_spotify_url(url: &str) -> Option<(SpotifyResource, String)> {
    let caps = spotify_url_rx()?.captures(url)?;
    let kind = match caps.get(1)?.as_str() {
        "track" => SpotifyResource::Track,
        "album" => SpotifyResource::Album,
        "playlist" => SpotifyResource::Playlist,
        _ => return None,
    };
    Some((kind, caps.get(2)?.as_str().to_string()))
}

/// Spotify catalog lookups
///
/// Implementations return deferred tracks (`encoded: None`) tagged with
/// [`SPOTIFY_SOURCE_NAME`]. A missing resource is `Ok(None)`.
#[async_trait]
pub trait SpotifyCatalog: Send + Sync {
    async fn track(&self, id: &str) -> Result<Option<Track>, SourceError>;

    /// Album name and its tracks
    async fn album(&self, id: &str) -> Result<Option<(String, Vec<Track>)>, SourceError>;

    /// Playlist name and its tracks
    async fn playlist(&self, id: &str) -> Result<Option<(String, Vec<Track>)>, SourceError>;
}

/// Claims `open.spotify.com` track, album and playlist urls
pub struct SpotifySource {
    catalog: Arc<dyn SpotifyCatalog>,
}

impl SpotifySource {
    pub fn new(catalog: Arc<dyn SpotifyCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Source for SpotifySource {
    fn name(&self) -> &'static str {
        "SpotifySource"
    }

    fn priority(&self) -> i32 {
        5
    }

    fn check_query(&self, query: &str) -> bool {
        parse_spotify_url(query).is_some()
    }

    async fn load_item(
        &self,
        _backend: &dyn ResolutionBackend,
        query: &str,
    ) -> Result<Option<LoadResult>, SourceError> {
        let Some((kind, id)) = parse_spotify_url(query) else {
            return Ok(None);
        };

        debug!(?kind, id = %id, "Looking up Spotify resource");

        let result = match kind {
            SpotifyResource::Track => self.catalog.track(&id).await?.map(LoadResult::track),
            SpotifyResource::Album => self
                .catalog
                .album(&id)
                .await?
                .map(|(name, tracks)| LoadResult::playlist(name, tracks)),
            SpotifyResource::Playlist => self
                .catalog
                .playlist(&id)
                .await?
                .map(|(name, tracks)| LoadResult::playlist(name, tracks)),
        };

        if let Some(ref loaded) = result {
            info!(id = %id, tracks = loaded.tracks.len(), "Loaded Spotify resource");
        }

        Ok(result)
    }
}
