//! Audio node REST client
//!
//! Speaks the node's v4 REST API for track resolution and player control,
//! and decodes the JSON events the node pushes over its event socket.

use async_trait::async_trait;
use lava_common::config::NodeConfig;
use lava_common::events::{BackendEvent, TrackEndReason};
use lava_common::{LoadResult, LoadType, PlaylistInfo, Track};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};

use super::{AudioBackend, BackendError, FilterSet, PlayRequest, ResolutionBackend};

const API_VERSION: &str = "v4";
const USER_AGENT: &str = "lava-player/0.1.0";

/// Track object as encoded by the node
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeTrack {
    encoded: String,
    info: NodeTrackInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeTrackInfo {
    identifier: String,
    #[serde(default = "default_true")]
    is_seekable: bool,
    author: String,
    length: u64,
    #[serde(default)]
    is_stream: bool,
    title: String,
    uri: Option<String>,
    artwork_url: Option<String>,
    source_name: String,
}

fn default_true() -> bool {
    true
}

impl NodeTrack {
    fn into_track(self) -> Track {
        Track {
            identifier: self.info.identifier,
            title: self.info.title,
            author: self.info.author,
            duration_ms: self.info.length,
            uri: self.info.uri.unwrap_or_default(),
            artwork_url: self.info.artwork_url,
            source_name: self.info.source_name,
            encoded: Some(self.encoded),
            is_seekable: self.info.is_seekable,
            is_stream: self.info.is_stream,
            requester: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLoadResult {
    load_type: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodePlaylist {
    info: NodePlaylistInfo,
    tracks: Vec<NodeTrack>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodePlaylistInfo {
    name: String,
    selected_track: i64,
}

#[derive(Debug, Deserialize)]
struct NodeException {
    message: Option<String>,
    severity: Option<String>,
}

fn parse_value<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, BackendError> {
    serde_json::from_value(value).map_err(|e| BackendError::Parse(e.to_string()))
}

/// Decode a `loadtracks` response body
pub fn parse_load_result(body: Value) -> Result<LoadResult, BackendError> {
    let raw: RawLoadResult = parse_value(body)?;

    match raw.load_type.as_str() {
        "track" => {
            let track: NodeTrack = parse_value(raw.data)?;
            Ok(LoadResult::track(track.into_track()))
        }
        "playlist" => {
            let playlist: NodePlaylist = parse_value(raw.data)?;
            Ok(LoadResult {
                load_type: LoadType::Playlist,
                tracks: playlist.tracks.into_iter().map(NodeTrack::into_track).collect(),
                playlist_info: Some(PlaylistInfo {
                    name: playlist.info.name,
                    selected_index: usize::try_from(playlist.info.selected_track).ok(),
                }),
            })
        }
        "search" => {
            let tracks: Vec<NodeTrack> = parse_value(raw.data)?;
            Ok(LoadResult::search(
                tracks.into_iter().map(NodeTrack::into_track).collect(),
            ))
        }
        "empty" => Ok(LoadResult::empty()),
        "error" => {
            let exception: NodeException = parse_value(raw.data)?;
            debug!(
                message = exception.message.as_deref().unwrap_or("unknown"),
                severity = exception.severity.as_deref().unwrap_or("unknown"),
                "Node failed to load tracks"
            );
            Ok(LoadResult {
                load_type: LoadType::Error,
                tracks: Vec::new(),
                playlist_info: None,
            })
        }
        other => Err(BackendError::Parse(format!("Unknown load type: {}", other))),
    }
}

fn guild_of(message: &Value) -> Result<u64, BackendError> {
    message
        .get("guildId")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| BackendError::Parse("Missing guildId".to_string()))
}

fn track_id_of(message: &Value) -> Result<String, BackendError> {
    message
        .pointer("/track/info/identifier")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BackendError::Parse("Missing track identifier".to_string()))
}

/// Decode one message from the node event socket
///
/// Returns `Ok(None)` for messages the player does not act on (ready, stats,
/// websocket-closed, ...).
pub fn parse_event(message: &Value) -> Result<Option<(u64, BackendEvent)>, BackendError> {
    let op = message.get("op").and_then(Value::as_str).unwrap_or_default();

    match op {
        "playerUpdate" => {
            let guild_id = guild_of(message)?;
            let state = message
                .get("state")
                .ok_or_else(|| BackendError::Parse("Missing player state".to_string()))?;
            Ok(Some((
                guild_id,
                BackendEvent::PositionUpdate {
                    position_ms: state.get("position").and_then(Value::as_u64).unwrap_or(0),
                    timestamp_ms: state.get("time").and_then(Value::as_i64).unwrap_or(0),
                    connected: state.get("connected").and_then(Value::as_bool).unwrap_or(false),
                },
            )))
        }
        "event" => {
            let guild_id = guild_of(message)?;
            let event_type = message.get("type").and_then(Value::as_str).unwrap_or_default();

            let event = match event_type {
                "TrackStartEvent" => BackendEvent::TrackStart {
                    track_id: track_id_of(message)?,
                },
                "TrackEndEvent" => {
                    let reason: TrackEndReason = parse_value(
                        message.get("reason").cloned().unwrap_or(Value::Null),
                    )?;
                    BackendEvent::TrackEnd {
                        track_id: track_id_of(message)?,
                        reason,
                    }
                }
                "TrackExceptionEvent" => BackendEvent::TrackLoadFailed {
                    track_id: track_id_of(message)?,
                    error: message
                        .pointer("/exception/message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                },
                "TrackStuckEvent" => BackendEvent::TrackStuck {
                    track_id: track_id_of(message)?,
                    threshold_ms: message.get("thresholdMs").and_then(Value::as_u64).unwrap_or(0),
                },
                _ => return Ok(None),
            };

            Ok(Some((guild_id, event)))
        }
        _ => Ok(None),
    }
}

/// REST client for one audio node
pub struct NodeClient {
    http_client: reqwest::Client,
    base_url: String,
    password: String,
    session_id: RwLock<Option<String>>,
}

impl NodeClient {
    pub fn new(config: &NodeConfig) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            password: config.password.clone(),
            session_id: RwLock::new(config.session_id.clone()),
        })
    }

    /// Record the session id the node assigned on its ready message
    pub fn set_session_id(&self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        info!(session = %session_id, "Node session established");
        if let Ok(mut slot) = self.session_id.write() {
            *slot = Some(session_id);
        }
    }

    fn player_url(&self, guild_id: u64) -> Result<String, BackendError> {
        let session_id = self
            .session_id
            .read()
            .ok()
            .and_then(|s| s.clone())
            .ok_or(BackendError::NoSession)?;

        Ok(format!(
            "{}/{}/sessions/{}/players/{}",
            self.base_url, API_VERSION, session_id, guild_id
        ))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response.text().await.unwrap_or_default();
        Err(BackendError::Status(status.as_u16(), error_text))
    }

    async fn update_player(
        &self,
        guild_id: u64,
        body: Value,
        no_replace: bool,
    ) -> Result<(), BackendError> {
        let url = self.player_url(guild_id)?;

        debug!(guild = guild_id, body = %body, "Updating node player");

        let response = self
            .http_client
            .patch(&url)
            .query(&[("noReplace", no_replace)])
            .header("Authorization", &self.password)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ResolutionBackend for NodeClient {
    async fn load_tracks(&self, query: &str) -> Result<LoadResult, BackendError> {
        let url = format!("{}/{}/loadtracks", self.base_url, API_VERSION);

        debug!(query = %query, "Loading tracks from node");

        let response = self
            .http_client
            .get(&url)
            .query(&[("identifier", query)])
            .header("Authorization", &self.password)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let body: Value = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        parse_load_result(body)
    }
}

#[async_trait]
impl AudioBackend for NodeClient {
    async fn play(&self, guild_id: u64, request: PlayRequest) -> Result<(), BackendError> {
        let mut body = json!({
            "track": { "encoded": request.encoded },
            "volume": request.volume,
            "paused": request.paused,
        });
        if let Some(start) = request.start_time_ms {
            body["position"] = json!(start);
        }
        if let Some(end) = request.end_time_ms {
            body["endTime"] = json!(end);
        }

        self.update_player(guild_id, body, request.no_replace).await
    }

    async fn stop(&self, guild_id: u64) -> Result<(), BackendError> {
        self.update_player(guild_id, json!({ "track": { "encoded": null } }), false)
            .await
    }

    async fn set_paused(&self, guild_id: u64, paused: bool) -> Result<(), BackendError> {
        self.update_player(guild_id, json!({ "paused": paused }), false).await
    }

    async fn seek(&self, guild_id: u64, position_ms: u64) -> Result<(), BackendError> {
        self.update_player(guild_id, json!({ "position": position_ms }), false)
            .await
    }

    async fn set_volume(&self, guild_id: u64, volume: u16) -> Result<(), BackendError> {
        self.update_player(guild_id, json!({ "volume": volume }), false).await
    }

    async fn set_filters(&self, guild_id: u64, filters: &FilterSet) -> Result<(), BackendError> {
        self.update_player(guild_id, json!({ "filters": filters }), false)
            .await
    }

    async fn destroy(&self, guild_id: u64) -> Result<(), BackendError> {
        let url = self.player_url(guild_id)?;

        let response = self
            .http_client
            .delete(&url)
            .header("Authorization", &self.password)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_track(id: &str) -> Value {
        json!({
            "encoded": format!("QAAA{}", id),
            "info": {
                "identifier": id,
                "isSeekable": true,
                "author": "Artist",
                "length": 212000,
                "isStream": false,
                "position": 0,
                "title": "Song",
                "uri": format!("https://www.youtube.com/watch?v={}", id),
                "artworkUrl": null,
                "isrc": null,
                "sourceName": "youtube"
            },
            "pluginInfo": {}
        })
    }

    #[test]
    fn test_parse_track_result() {
        let result = parse_load_result(json!({ "loadType": "track", "data": node_track("abc") })).unwrap();
        assert_eq!(result.load_type, LoadType::Track);
        assert_eq!(result.tracks.len(), 1);
        let track = &result.tracks[0];
        assert_eq!(track.identifier, "abc");
        assert_eq!(track.duration_ms, 212000);
        assert_eq!(track.encoded.as_deref(), Some("QAAAabc"));
        assert_eq!(track.source_name, "youtube");
    }

    #[test]
    fn test_parse_playlist_result() {
        let result = parse_load_result(json!({
            "loadType": "playlist",
            "data": {
                "info": { "name": "Mix", "selectedTrack": -1 },
                "pluginInfo": {},
                "tracks": [node_track("a"), node_track("b")]
            }
        }))
        .unwrap();

        assert_eq!(result.load_type, LoadType::Playlist);
        assert_eq!(result.tracks.len(), 2);
        let info = result.playlist_info.unwrap();
        assert_eq!(info.name, "Mix");
        assert_eq!(info.selected_index, None);
    }

    #[test]
    fn test_parse_empty_and_error_results() {
        let empty = parse_load_result(json!({ "loadType": "empty", "data": {} })).unwrap();
        assert!(empty.is_empty());

        let error = parse_load_result(json!({
            "loadType": "error",
            "data": { "message": "boom", "severity": "common", "cause": "x" }
        }))
        .unwrap();
        assert_eq!(error.load_type, LoadType::Error);
        assert!(error.is_empty());
    }

    #[test]
    fn test_parse_unknown_load_type() {
        let result = parse_load_result(json!({ "loadType": "mystery", "data": {} }));
        assert!(matches!(result, Err(BackendError::Parse(_))));
    }

    #[test]
    fn test_parse_player_update() {
        let (guild, event) = parse_event(&json!({
            "op": "playerUpdate",
            "guildId": "123",
            "state": { "time": 1500, "position": 6000, "connected": true, "ping": 20 }
        }))
        .unwrap()
        .unwrap();

        assert_eq!(guild, 123);
        assert_eq!(
            event,
            BackendEvent::PositionUpdate {
                position_ms: 6000,
                timestamp_ms: 1500,
                connected: true
            }
        );
    }

    #[test]
    fn test_parse_track_events() {
        let (_, end) = parse_event(&json!({
            "op": "event",
            "type": "TrackEndEvent",
            "guildId": "1",
            "track": node_track("a"),
            "reason": "finished"
        }))
        .unwrap()
        .unwrap();
        assert_eq!(
            end,
            BackendEvent::TrackEnd {
                track_id: "a".to_string(),
                reason: TrackEndReason::Finished
            }
        );

        let (_, failed) = parse_event(&json!({
            "op": "event",
            "type": "TrackExceptionEvent",
            "guildId": "1",
            "track": node_track("a"),
            "exception": { "message": "Video unavailable", "severity": "common", "cause": "" }
        }))
        .unwrap()
        .unwrap();
        assert_eq!(
            failed,
            BackendEvent::TrackLoadFailed {
                track_id: "a".to_string(),
                error: "Video unavailable".to_string()
            }
        );
    }

    #[test]
    fn test_parse_ignores_other_ops() {
        assert!(parse_event(&json!({ "op": "ready", "sessionId": "s" })).unwrap().is_none());
        assert!(parse_event(&json!({
            "op": "event",
            "type": "WebSocketClosedEvent",
            "guildId": "1"
        }))
        .unwrap()
        .is_none());
    }

    #[test]
    fn test_player_url_requires_session() {
        let client = NodeClient::new(&NodeConfig::default()).unwrap();
        assert_eq!(client.player_url(1), Err(BackendError::NoSession));

        client.set_session_id("sess");
        assert_eq!(
            client.player_url(7).unwrap(),
            "http://localhost:2333/v4/sessions/sess/players/7"
        );
    }
}
