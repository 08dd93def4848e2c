//! Autoplay recommendation engine
//!
//! Keeps a session's queue topped up with recommended tracks. The engine is
//! stateless per call: the player decides when a batch is due, hands over a
//! seed track plus the identifiers already queued, and enqueues whatever
//! comes back with `requester = 0`.
//!
//! Steps for one batch:
//! 1. Map the seed to a provider catalog id (direct for catalog tracks,
//!    text search otherwise)
//! 2. Ask the provider for up to `count` candidates
//! 3. Drop candidates already queued
//! 4. Resolve each survivor through the node, then the source chain;
//!    unresolvable candidates are skipped

use async_trait::async_trait;
use lava_common::{Track, AUTOPLAY_REQUESTER};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::ResolutionBackend;
use crate::sources::SourceManager;

/// Autoplay failures; all of them turn autoplay off for the session
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AutoplayError {
    #[error("Recommendation provider error: {0}")]
    Provider(String),

    #[error("No catalog match for seed track {0}")]
    NoSeed(String),

    #[error("No recommendations available")]
    NoRecommendations,
}

/// Recommended track descriptor, not yet playable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub identifier: String,
    pub title: String,
    pub author: String,
    /// Url the node or a source can resolve
    pub uri: String,
}

/// External recommendation service
#[async_trait]
pub trait RecommendationProvider: Send + Sync {
    /// `source_name` of tracks whose identifier is already a catalog id
    fn catalog_name(&self) -> &str;

    /// Map a non-catalog track onto a catalog id by text search
    async fn search_seed(&self, title: &str, author: &str) -> Result<Option<String>, AutoplayError>;

    async fn recommend(&self, seed_ids: &[String], limit: usize) -> Result<Vec<Candidate>, AutoplayError>;
}

pub struct AutoplayEngine {
    provider: Arc<dyn RecommendationProvider>,
    resolver: Arc<dyn ResolutionBackend>,
    sources: SourceManager,
    low_water_mark: usize,
}

impl AutoplayEngine {
    pub fn new(
        provider: Arc<dyn RecommendationProvider>,
        resolver: Arc<dyn ResolutionBackend>,
        sources: SourceManager,
        low_water_mark: usize,
    ) -> Self {
        Self {
            provider,
            resolver,
            sources,
            low_water_mark: low_water_mark.max(1),
        }
    }

    pub fn low_water_mark(&self) -> usize {
        self.low_water_mark
    }

    /// Number of tracks a batch may add to a queue of `queue_len`
    pub fn batch_size(&self, queue_len: usize) -> usize {
        self.low_water_mark.saturating_sub(queue_len)
    }

    async fn seed_id(&self, seed: &Track) -> Result<String, AutoplayError> {
        if seed.source_name == self.provider.catalog_name() {
            return Ok(seed.identifier.clone());
        }

        debug!(track = %seed.identifier, "Searching provider catalog for seed");
        self.provider
            .search_seed(&seed.title, &seed.author)
            .await?
            .ok_or_else(|| AutoplayError::NoSeed(seed.identifier.clone()))
    }

    async fn resolve_candidate(&self, candidate: &Candidate) -> Option<Track> {
        match self.resolver.load_tracks(&candidate.uri).await {
            Ok(result) if !result.is_empty() => return result.tracks.into_iter().next(),
            Ok(_) => debug!(uri = %candidate.uri, "Node has no match for candidate, trying sources"),
            Err(e) => debug!(uri = %candidate.uri, error = %e, "Node lookup failed for candidate, trying sources"),
        }

        match self.sources.load_item(self.resolver.as_ref(), &candidate.uri).await {
            Ok(Some(result)) if !result.is_empty() => result.tracks.into_iter().next(),
            Ok(_) => None,
            Err(e) => {
                debug!(uri = %candidate.uri, error = %e, "Source lookup failed for candidate");
                None
            }
        }
    }

    /// Fetch and resolve up to `count` tracks not already in `queued`
    ///
    /// `queued` holds identifiers of everything in the queue plus the
    /// current track. Returned tracks carry `requester = 0`. A provider that
    /// yields nothing is an error; candidates lost to dedup or resolution
    /// failures are not.
    pub async fn fetch_batch(
        &self,
        seed: &Track,
        queued: &HashSet<String>,
        count: usize,
    ) -> Result<Vec<Track>, AutoplayError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let seed_id = self.seed_id(seed).await?;
        let candidates = self.provider.recommend(&[seed_id], count).await?;

        if candidates.is_empty() {
            return Err(AutoplayError::NoRecommendations);
        }

        let mut seen = queued.clone();
        let mut tracks = Vec::with_capacity(count);

        for candidate in candidates {
            if tracks.len() >= count {
                break;
            }
            if seen.contains(&candidate.identifier) {
                debug!(candidate = %candidate.identifier, "Candidate already queued, skipping");
                continue;
            }

            let Some(track) = self.resolve_candidate(&candidate).await else {
                warn!(candidate = %candidate.identifier, title = %candidate.title, "Failed to resolve recommendation, skipping");
                continue;
            };

            if seen.contains(&track.identifier) {
                debug!(track = %track.identifier, "Resolved recommendation already queued, skipping");
                continue;
            }

            seen.insert(candidate.identifier);
            seen.insert(track.identifier.clone());
            tracks.push(track.with_requester(AUTOPLAY_REQUESTER));
        }

        info!(requested = count, resolved = tracks.len(), "Autoplay batch resolved");
        Ok(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use lava_common::LoadResult;

    fn track(id: &str, source: &str) -> Track {
        Track {
            identifier: id.to_string(),
            title: format!("title-{id}"),
            author: "artist".to_string(),
            duration_ms: 180_000,
            uri: format!("https://example.org/{id}"),
            artwork_url: None,
            source_name: source.to_string(),
            encoded: Some(format!("enc-{id}")),
            is_seekable: true,
            is_stream: false,
            requester: 7,
        }
    }

    /// Resolves `https://example.org/<id>` to a track with identifier `<id>`
    struct EchoBackend;

    #[async_trait]
    impl ResolutionBackend for EchoBackend {
        async fn load_tracks(&self, query: &str) -> Result<LoadResult, BackendError> {
            match query.strip_prefix("https://example.org/") {
                Some(id) if !id.starts_with("broken") => Ok(LoadResult::track(track(id, "youtube"))),
                _ => Ok(LoadResult::empty()),
            }
        }
    }

    struct ListProvider {
        ids: Vec<&'static str>,
    }

    #[async_trait]
    impl RecommendationProvider for ListProvider {
        fn catalog_name(&self) -> &str {
            "spotify"
        }

        async fn search_seed(&self, _title: &str, _author: &str) -> Result<Option<String>, AutoplayError> {
            Ok(Some("seed".to_string()))
        }

        async fn recommend(&self, _seed_ids: &[String], limit: usize) -> Result<Vec<Candidate>, AutoplayError> {
            Ok(self
                .ids
                .iter()
                .take(limit)
                .map(|id| Candidate {
                    identifier: id.to_string(),
                    title: id.to_string(),
                    author: "artist".to_string(),
                    uri: format!("https://example.org/{id}"),
                })
                .collect())
        }
    }

    fn engine(ids: Vec<&'static str>) -> AutoplayEngine {
        AutoplayEngine::new(
            Arc::new(ListProvider { ids }),
            Arc::new(EchoBackend),
            SourceManager::default(),
            5,
        )
    }

    #[test]
    fn test_batch_size() {
        let engine = engine(vec![]);
        assert_eq!(engine.batch_size(0), 5);
        assert_eq!(engine.batch_size(3), 2);
        assert_eq!(engine.batch_size(9), 0);
    }

    #[tokio::test]
    async fn test_batch_tracks_are_autoplay() {
        let engine = engine(vec!["r1", "r2"]);
        let tracks = engine
            .fetch_batch(&track("seed", "youtube"), &HashSet::new(), 2)
            .await
            .unwrap();

        assert_eq!(tracks.len(), 2);
        assert!(tracks.iter().all(|t| t.requester == AUTOPLAY_REQUESTER));
    }

    #[tokio::test]
    async fn test_resolution_failure_skips_candidate() {
        let engine = engine(vec!["broken1", "r2", "r3"]);
        let tracks = engine
            .fetch_batch(&track("seed", "youtube"), &HashSet::new(), 3)
            .await
            .unwrap();

        let ids: Vec<_> = tracks.iter().map(|t| t.identifier.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r3"]);
    }

    #[tokio::test]
    async fn test_empty_provider_is_error() {
        let engine = engine(vec![]);
        let err = engine
            .fetch_batch(&track("seed", "youtube"), &HashSet::new(), 3)
            .await
            .unwrap_err();
        assert_eq!(err, AutoplayError::NoRecommendations);
    }

    #[tokio::test]
    async fn test_zero_count_skips_provider() {
        let engine = engine(vec![]);
        let tracks = engine
            .fetch_batch(&track("seed", "youtube"), &HashSet::new(), 0)
            .await
            .unwrap();
        assert!(tracks.is_empty());
    }
}
