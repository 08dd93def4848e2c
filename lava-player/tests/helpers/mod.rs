//! Test helpers for lava-player integration tests
//!
//! Provides in-memory collaborators for the player stack:
//! - FakeNode: audio + resolution backend that records every request
//! - RecordingSurface: display surface that keeps every render
//! - ScriptedProvider: recommendation provider with canned answers
//! - Harness: a PlayerManager wired to the fakes

#![allow(dead_code)]

use async_trait::async_trait;
use lava_common::config::PlayerConfig;
use lava_common::events::PlayerNotification;
use lava_common::{LoadResult, Track};
use lava_player::autoplay::{AutoplayEngine, AutoplayError, Candidate, RecommendationProvider};
use lava_player::backend::{AudioBackend, BackendError, FilterSet, PlayRequest, ResolutionBackend};
use lava_player::display::{DisplayError, DisplaySurface, DisplayTarget, DisplayView};
use lava_player::sources::{Source, SourceManager};
use lava_player::{Player, PlayerContext, PlayerManager};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

pub const GUILD: u64 = 1000;
pub const USER: u64 = 42;

/// Playable test track; `encoded` is `enc-<id>`
pub fn track(id: &str) -> Track {
    Track {
        identifier: id.to_string(),
        title: format!("Song {id}"),
        author: "Artist".to_string(),
        duration_ms: 200_000,
        uri: format!("https://media.test/{id}"),
        artwork_url: None,
        source_name: "test".to_string(),
        encoded: Some(format!("enc-{id}")),
        is_seekable: true,
        is_stream: false,
        requester: USER,
    }
}

/// Catalog track without a node payload
pub fn deferred_track(id: &str, title: &str, author: &str) -> Track {
    Track {
        title: title.to_string(),
        author: author.to_string(),
        source_name: "catalog".to_string(),
        encoded: None,
        ..track(id)
    }
}

pub fn autoplay_track(id: &str) -> Track {
    track(id).with_requester(0)
}

/// Node-side calls, in order
#[derive(Debug, Clone, PartialEq)]
pub enum NodeCall {
    Play(PlayRequest),
    Stop,
    Pause(bool),
    Seek(u64),
    Volume(u16),
    Filters(FilterSet),
    Destroy,
}

#[derive(Default)]
pub struct FakeNode {
    calls: Mutex<Vec<NodeCall>>,
    failing: Mutex<HashSet<String>>,
    results: Mutex<HashMap<String, LoadResult>>,
    queries: Mutex<Vec<String>>,
    stop_fails: Mutex<bool>,
}

impl FakeNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject play requests carrying this payload
    pub fn fail_encoding(&self, encoded: &str) {
        self.failing.lock().unwrap().insert(encoded.to_string());
    }

    /// Make stop requests fail until switched back
    pub fn fail_stop(&self, fails: bool) {
        *self.stop_fails.lock().unwrap() = fails;
    }

    pub fn add_result(&self, query: &str, result: LoadResult) {
        self.results.lock().unwrap().insert(query.to_string(), result);
    }

    pub fn calls(&self) -> Vec<NodeCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Payloads of accepted and rejected play requests
    pub fn played(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                NodeCall::Play(request) => Some(request.encoded),
                _ => None,
            })
            .collect()
    }

    pub fn last_play(&self) -> Option<PlayRequest> {
        self.calls().into_iter().rev().find_map(|call| match call {
            NodeCall::Play(request) => Some(request),
            _ => None,
        })
    }

    pub fn stop_count(&self) -> usize {
        self.calls().iter().filter(|c| **c == NodeCall::Stop).count()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    fn record(&self, call: NodeCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AudioBackend for FakeNode {
    async fn play(&self, _guild_id: u64, request: PlayRequest) -> Result<(), BackendError> {
        let rejected = self.failing.lock().unwrap().contains(&request.encoded);
        self.record(NodeCall::Play(request));
        if rejected {
            return Err(BackendError::Status(400, "cannot decode track".to_string()));
        }
        Ok(())
    }

    async fn stop(&self, _guild_id: u64) -> Result<(), BackendError> {
        self.record(NodeCall::Stop);
        if *self.stop_fails.lock().unwrap() {
            return Err(BackendError::Network("connection reset".to_string()));
        }
        Ok(())
    }

    async fn set_paused(&self, _guild_id: u64, paused: bool) -> Result<(), BackendError> {
        self.record(NodeCall::Pause(paused));
        Ok(())
    }

    async fn seek(&self, _guild_id: u64, position_ms: u64) -> Result<(), BackendError> {
        self.record(NodeCall::Seek(position_ms));
        Ok(())
    }

    async fn set_volume(&self, _guild_id: u64, volume: u16) -> Result<(), BackendError> {
        self.record(NodeCall::Volume(volume));
        Ok(())
    }

    async fn set_filters(&self, _guild_id: u64, filters: &FilterSet) -> Result<(), BackendError> {
        self.record(NodeCall::Filters(filters.clone()));
        Ok(())
    }

    async fn destroy(&self, _guild_id: u64) -> Result<(), BackendError> {
        self.record(NodeCall::Destroy);
        Ok(())
    }
}

#[async_trait]
impl ResolutionBackend for FakeNode {
    async fn load_tracks(&self, query: &str) -> Result<LoadResult, BackendError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self
            .results
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_else(LoadResult::empty))
    }
}

/// Surface that records renders and deletions
#[derive(Default)]
pub struct RecordingSurface {
    renders: Mutex<Vec<(DisplayTarget, DisplayView)>>,
    deleted: Mutex<Vec<DisplayTarget>>,
    gone: Mutex<HashSet<DisplayTarget>>,
}

impl RecordingSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Renders into this target fail with NotFound from now on
    pub fn mark_gone(&self, target: DisplayTarget) {
        self.gone.lock().unwrap().insert(target);
    }

    pub fn renders(&self) -> Vec<(DisplayTarget, DisplayView)> {
        self.renders.lock().unwrap().clone()
    }

    pub fn render_count(&self) -> usize {
        self.renders.lock().unwrap().len()
    }

    pub fn last_view(&self) -> Option<DisplayView> {
        self.renders.lock().unwrap().last().map(|(_, view)| view.clone())
    }

    pub fn deleted(&self) -> Vec<DisplayTarget> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl DisplaySurface for RecordingSurface {
    async fn render(&self, target: &DisplayTarget, view: &DisplayView) -> Result<(), DisplayError> {
        if self.gone.lock().unwrap().contains(target) {
            return Err(DisplayError::NotFound);
        }
        self.renders.lock().unwrap().push((*target, view.clone()));
        Ok(())
    }

    async fn delete(&self, target: &DisplayTarget) -> Result<(), DisplayError> {
        self.deleted.lock().unwrap().push(*target);
        Ok(())
    }
}

/// Recommendation provider returning a fixed answer
///
/// Tracks with `source_name == "test"` are treated as catalog tracks.
pub struct ScriptedProvider {
    answer: Mutex<Result<Vec<Candidate>, AutoplayError>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl ScriptedProvider {
    pub fn new(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Ok(ids.iter().map(|id| candidate(id)).collect())),
            calls: AtomicUsize::new(0),
            gate: None,
        })
    }

    pub fn failing(error: AutoplayError) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Err(error)),
            calls: AtomicUsize::new(0),
            gate: None,
        })
    }

    /// Each `recommend` call waits for one permit on `gate`
    pub fn gated(ids: &[&str], gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Ok(ids.iter().map(|id| candidate(id)).collect())),
            calls: AtomicUsize::new(0),
            gate: Some(gate),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Candidate whose uri the harness node resolves to `track(id)`
pub fn candidate(id: &str) -> Candidate {
    Candidate {
        identifier: id.to_string(),
        title: format!("Song {id}"),
        author: "Artist".to_string(),
        uri: candidate_uri(id),
    }
}

pub fn candidate_uri(id: &str) -> String {
    format!("https://recs.test/{id}")
}

#[async_trait]
impl RecommendationProvider for ScriptedProvider {
    fn catalog_name(&self) -> &str {
        "test"
    }

    async fn search_seed(&self, title: &str, _author: &str) -> Result<Option<String>, AutoplayError> {
        Ok(Some(format!("seed-{title}")))
    }

    async fn recommend(&self, _seed_ids: &[String], limit: usize) -> Result<Vec<Candidate>, AutoplayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref gate) = self.gate {
            gate.notified().await;
        }
        self.answer
            .lock()
            .unwrap()
            .clone()
            .map(|candidates| candidates.into_iter().take(limit).collect())
    }
}

/// A manager wired to in-memory collaborators
pub struct Harness {
    pub node: Arc<FakeNode>,
    pub surface: Arc<RecordingSurface>,
    pub manager: PlayerManager,
    pub notifications: broadcast::Receiver<PlayerNotification>,
}

pub struct HarnessBuilder {
    config: PlayerConfig,
    provider: Option<Arc<dyn RecommendationProvider>>,
    sources: Vec<Arc<dyn Source>>,
    node: Arc<FakeNode>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: PlayerConfig {
                idle_timeout_secs: 0,
                ..Default::default()
            },
            provider: None,
            sources: Vec::new(),
            node: FakeNode::new(),
        }
    }

    pub fn config(mut self, f: impl FnOnce(&mut PlayerConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn RecommendationProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn source(mut self, source: Arc<dyn Source>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn build(self) -> Harness {
        let node = self.node;
        let surface = RecordingSurface::new();
        let sources = SourceManager::new(self.sources);

        let autoplay = self.provider.map(|provider| {
            Arc::new(AutoplayEngine::new(
                provider,
                node.clone(),
                sources.clone(),
                self.config.autoplay_low_water_mark,
            ))
        });

        let (notifications, receiver) = broadcast::channel(256);
        let manager = PlayerManager::new(PlayerContext {
            audio: node.clone(),
            resolver: node.clone(),
            sources,
            autoplay,
            surface: surface.clone(),
            notifications,
            config: self.config,
        });

        Harness {
            node,
            surface,
            manager,
            notifications: receiver,
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        HarnessBuilder::new().build()
    }

    pub async fn player(&self) -> Player {
        self.manager.get_or_create(GUILD).await
    }

    /// Make `ids` resolvable as autoplay candidates
    pub fn serve_candidates(&self, ids: &[&str]) {
        for id in ids {
            self.node.add_result(&candidate_uri(id), LoadResult::track(track(id)));
        }
    }

    /// Notifications received so far
    pub fn drain(&mut self) -> Vec<PlayerNotification> {
        let mut received = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            received.push(notification);
        }
        received
    }
}

pub fn ids(tracks: &[Track]) -> Vec<String> {
    tracks.iter().map(|t| t.identifier.clone()).collect()
}

/// Poll `check` until it holds, yielding to background tasks in between
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
