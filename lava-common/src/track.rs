//! Track and load-result data model
//!
//! Every component of the player operates on these types: the queue holds
//! [`Track`]s, every resolution attempt (node, source chain, saved playlist)
//! produces a [`LoadResult`].

use serde::{Deserialize, Serialize};

/// Requester id recorded for tracks added by autoplay
pub const AUTOPLAY_REQUESTER: u64 = 0;

/// A playable audio item
///
/// Identity fields are fixed once resolved; only `requester` is reassigned
/// when the track is enqueued. Two tracks are equal when their identifiers
/// match, which is what queue deduplication relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Source-specific identifier (video id, catalog id, ...)
    pub identifier: String,
    pub title: String,
    pub author: String,
    /// Total length in milliseconds
    pub duration_ms: u64,
    pub uri: String,
    pub artwork_url: Option<String>,
    /// Name of the source that produced this track ("youtube", "spotify", ...)
    pub source_name: String,
    /// Opaque payload understood by the audio node
    ///
    /// `None` marks a deferred track that still has to be looked up on the
    /// node before it can be dispatched.
    pub encoded: Option<String>,
    #[serde(default = "default_true")]
    pub is_seekable: bool,
    #[serde(default)]
    pub is_stream: bool,
    /// User id of whoever queued the track, [`AUTOPLAY_REQUESTER`] for autoplay
    #[serde(default)]
    pub requester: u64,
}

fn default_true() -> bool {
    true
}

impl Track {
    /// True when the track was queued by autoplay rather than a user
    pub fn is_autoplay(&self) -> bool {
        self.requester == AUTOPLAY_REQUESTER
    }

    /// True when the node payload still has to be looked up
    pub fn is_deferred(&self) -> bool {
        self.encoded.is_none()
    }

    /// Same track with the given requester
    pub fn with_requester(mut self, requester: u64) -> Self {
        self.requester = requester;
        self
    }

    /// Search query used to find a playable version of a deferred track
    pub fn fallback_search_query(&self) -> String {
        format!("ytsearch:{} {}", self.title, self.author)
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for Track {}

/// Repeat policy applied when a track finishes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Finished tracks are discarded
    #[default]
    Off,
    /// The finished track is played again
    Track,
    /// The finished track goes to the back of the queue
    Queue,
}

impl LoopMode {
    /// Next mode in the off → track → queue cycle used by the repeat button
    pub fn cycle(self) -> Self {
        match self {
            LoopMode::Off => LoopMode::Track,
            LoopMode::Track => LoopMode::Queue,
            LoopMode::Queue => LoopMode::Off,
        }
    }
}

impl std::fmt::Display for LoopMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopMode::Off => write!(f, "off"),
            LoopMode::Track => write!(f, "track"),
            LoopMode::Queue => write!(f, "queue"),
        }
    }
}

/// Kind of outcome produced by a resolution attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoadType {
    Track,
    Playlist,
    Search,
    Empty,
    Error,
}

/// Playlist metadata attached to [`LoadType::Playlist`] results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistInfo {
    pub name: String,
    /// Index of the track the link pointed at, if any
    pub selected_index: Option<usize>,
}

/// Normalized outcome of any resolution attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResult {
    pub load_type: LoadType,
    pub tracks: Vec<Track>,
    pub playlist_info: Option<PlaylistInfo>,
}

impl LoadResult {
    pub fn track(track: Track) -> Self {
        Self {
            load_type: LoadType::Track,
            tracks: vec![track],
            playlist_info: None,
        }
    }

    pub fn playlist(name: impl Into<String>, tracks: Vec<Track>) -> Self {
        Self {
            load_type: LoadType::Playlist,
            tracks,
            playlist_info: Some(PlaylistInfo {
                name: name.into(),
                selected_index: None,
            }),
        }
    }

    pub fn search(tracks: Vec<Track>) -> Self {
        Self {
            load_type: LoadType::Search,
            tracks,
            playlist_info: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            load_type: LoadType::Empty,
            tracks: Vec::new(),
            playlist_info: None,
        }
    }

    /// True when the result carries no playable track
    pub fn is_empty(&self) -> bool {
        matches!(self.load_type, LoadType::Empty | LoadType::Error) || self.tracks.is_empty()
    }
}
