//! Spotify Web API client
//!
//! Client-credentials flow only: catalog lookups for [`SpotifySource`] and
//! seed search plus recommendations for autoplay. Tracks are returned
//! deferred; the node resolves them by text search before playback.
//!
//! [`SpotifySource`]: crate::sources::SpotifySource

use async_trait::async_trait;
use lava_common::config::SpotifyConfig;
use lava_common::{Track, AUTOPLAY_REQUESTER};
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::autoplay::{AutoplayError, Candidate, RecommendationProvider};
use crate::sources::spotify::SPOTIFY_SOURCE_NAME;
use crate::sources::{SourceError, SpotifyCatalog};

const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const USER_AGENT: &str = concat!("lava-player/", env!("CARGO_PKG_VERSION"));

/// Refresh the token this long before Spotify says it expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<SpotifyError> for SourceError {
    fn from(e: SpotifyError) -> Self {
        SourceError::Catalog(e.to_string())
    }
}

impl From<SpotifyError> for AutoplayError {
    fn from(e: SpotifyError) -> Self {
        AutoplayError::Provider(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Clone, Deserialize)]
struct SpImage {
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SpArtist {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SpAlbumRef {
    #[serde(default)]
    images: Vec<SpImage>,
}

#[derive(Debug, Clone, Deserialize)]
struct SpTrack {
    id: Option<String>,
    name: String,
    duration_ms: u64,
    #[serde(default)]
    artists: Vec<SpArtist>,
    album: Option<SpAlbumRef>,
}

impl SpTrack {
    fn author(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Deferred track; `None` for local files without a catalog id
    fn into_track(self, fallback_artwork: Option<&str>) -> Option<Track> {
        let id = self.id.clone()?;
        let artwork_url = self
            .album
            .as_ref()
            .and_then(|a| a.images.first())
            .map(|i| i.url.clone())
            .or_else(|| fallback_artwork.map(str::to_string));

        Some(Track {
            uri: format!("https://open.spotify.com/track/{id}"),
            author: self.author(),
            identifier: id,
            title: self.name,
            duration_ms: self.duration_ms,
            artwork_url,
            source_name: SPOTIFY_SOURCE_NAME.to_string(),
            encoded: None,
            is_seekable: true,
            is_stream: false,
            requester: AUTOPLAY_REQUESTER,
        })
    }

    fn into_candidate(self) -> Option<Candidate> {
        let id = self.id.clone()?;
        Some(Candidate {
            uri: format!("https://open.spotify.com/track/{id}"),
            author: self.author(),
            identifier: id,
            title: self.name,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SpPage<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SpAlbum {
    name: String,
    #[serde(default)]
    images: Vec<SpImage>,
    tracks: SpPage<SpTrack>,
}

#[derive(Debug, Deserialize)]
struct SpPlaylistItem {
    track: Option<SpTrack>,
}

#[derive(Debug, Deserialize)]
struct SpPlaylist {
    name: String,
    tracks: SpPage<SpPlaylistItem>,
}

#[derive(Debug, Deserialize)]
struct SpSearch {
    tracks: SpPage<SpTrack>,
}

#[derive(Debug, Deserialize)]
struct SpRecommendations {
    tracks: Vec<SpTrack>,
}

fn album_tracks(album: SpAlbum) -> (String, Vec<Track>) {
    let artwork = album.images.first().map(|i| i.url.clone());
    let tracks = album
        .tracks
        .items
        .into_iter()
        .filter_map(|t| t.into_track(artwork.as_deref()))
        .collect();
    (album.name, tracks)
}

fn playlist_tracks(playlist: SpPlaylist) -> (String, Vec<Track>) {
    let tracks = playlist
        .tracks
        .items
        .into_iter()
        .filter_map(|item| item.track)
        .filter_map(|t| t.into_track(None))
        .collect();
    (playlist.name, tracks)
}

/// Spotify Web API client
pub struct SpotifyClient {
    http_client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(config: &SpotifyConfig) -> Result<Self, SpotifyError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| SpotifyError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, SpotifyError> {
        let mut token = self.token.lock().await;

        if let Some(ref cached) = *token {
            if Instant::now() + TOKEN_EXPIRY_MARGIN < cached.expires_at {
                return Ok(cached.value.clone());
            }
        }

        debug!("Requesting Spotify access token");

        let response = self
            .http_client
            .post(SPOTIFY_TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| SpotifyError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SpotifyError::Auth(format!("{}: {}", status.as_u16(), error_text)));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::Parse(e.to_string()))?;

        info!(expires_in = body.expires_in, "Obtained Spotify access token");

        let value = body.access_token.clone();
        *token = Some(AccessToken {
            value: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });

        Ok(value)
    }

    /// GET an API path; 404 maps to `Ok(None)`
    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, SpotifyError> {
        let token = self.access_token().await?;
        let url = format!("{}{}", SPOTIFY_API_URL, path);

        debug!(url = %url, "Querying Spotify API");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| SpotifyError::Network(e.to_string()))?;

        let status = response.status();

        if status == 404 {
            return Ok(None);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SpotifyError::Api(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| SpotifyError::Parse(e.to_string()))
    }
}

#[async_trait]
impl SpotifyCatalog for SpotifyClient {
    async fn track(&self, id: &str) -> Result<Option<Track>, SourceError> {
        let track: Option<SpTrack> = self.get(&format!("/tracks/{id}"), &[]).await?;
        Ok(track.and_then(|t| t.into_track(None)))
    }

    async fn album(&self, id: &str) -> Result<Option<(String, Vec<Track>)>, SourceError> {
        let album: Option<SpAlbum> = self.get(&format!("/albums/{id}"), &[]).await?;
        Ok(album.map(album_tracks))
    }

    async fn playlist(&self, id: &str) -> Result<Option<(String, Vec<Track>)>, SourceError> {
        let playlist: Option<SpPlaylist> = self.get(&format!("/playlists/{id}"), &[]).await?;
        Ok(playlist.map(playlist_tracks))
    }
}

#[async_trait]
impl RecommendationProvider for SpotifyClient {
    fn catalog_name(&self) -> &str {
        SPOTIFY_SOURCE_NAME
    }

    async fn search_seed(&self, title: &str, author: &str) -> Result<Option<String>, AutoplayError> {
        let query = [
            ("q", format!("{title} by {author}")),
            ("type", "track".to_string()),
            ("limit", "1".to_string()),
        ];
        let search: Option<SpSearch> = self.get("/search", &query).await?;

        Ok(search
            .and_then(|s| s.tracks.items.into_iter().next())
            .and_then(|t| t.id))
    }

    async fn recommend(&self, seed_ids: &[String], limit: usize) -> Result<Vec<Candidate>, AutoplayError> {
        let query = [
            ("seed_tracks", seed_ids.join(",")),
            ("limit", limit.to_string()),
        ];
        let recommendations: Option<SpRecommendations> = self.get("/recommendations", &query).await?;

        Ok(recommendations
            .map(|r| r.tracks.into_iter().filter_map(SpTrack::into_candidate).collect())
            .unwrap_or_default())
    }
}
