//! Source Resolution Chain
//!
//! Resolves queries the primary node could not (non-native platforms,
//! arbitrary urls) through a priority-ordered list of [`Source`]s.
//!
//! This is a chain of responsibility, not a fan-out: the first source whose
//! [`Source::check_query`] accepts the query is the only one asked to load it,
//! and its answer is final even when empty.

pub mod bilibili;
pub mod direct_url;
pub mod spotify;

use async_trait::async_trait;
use lava_common::LoadResult;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::backend::{BackendError, ResolutionBackend};

pub use bilibili::{BilibiliCatalog, BilibiliSource};
pub use direct_url::{DirectUrlSource, MediaExtractor, YtDlpExtractor};
pub use spotify::{SpotifyCatalog, SpotifySource};

/// Source lookup errors
///
/// Only transient failures are errors; "nothing matched" is `Ok(None)`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SourceError {
    #[error("Node lookup failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Catalog request failed: {0}")]
    Catalog(String),
}

/// A pluggable query-resolution strategy outside the primary node
#[async_trait]
pub trait Source: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Static priority; higher runs first
    fn priority(&self) -> i32;

    /// Cheap pattern match deciding whether this source claims the query
    ///
    /// Must not perform I/O.
    fn check_query(&self, query: &str) -> bool;

    /// Look the query up
    ///
    /// `backend` is the primary node, for sources that end up resolving a
    /// derived url or search there.
    async fn load_item(
        &self,
        backend: &dyn ResolutionBackend,
        query: &str,
    ) -> Result<Option<LoadResult>, SourceError>;
}

/// Process-wide, read-only list of sources sorted by descending priority
#[derive(Clone, Default)]
pub struct SourceManager {
    sources: Vec<Arc<dyn Source>>,
}

impl SourceManager {
    /// Build the chain from sources in registration order
    ///
    /// Equal priorities keep their registration order (stable sort), so the
    /// first registered wins ties.
    pub fn new(mut sources: Vec<Arc<dyn Source>>) -> Self {
        info!("Initializing {} sources", sources.len());
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));

        for source in &sources {
            debug!(source = source.name(), priority = source.priority(), "Registered source");
        }

        Self { sources }
    }

    /// Source names in chain order
    pub fn names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Resolve `query` through the first source that claims it
    ///
    /// Returns `Ok(None)` when no source claims the query or the claiming
    /// source found nothing.
    pub async fn load_item(
        &self,
        backend: &dyn ResolutionBackend,
        query: &str,
    ) -> Result<Option<LoadResult>, SourceError> {
        info!(query = %query, "Received query, checking in sources");

        for source in &self.sources {
            if !source.check_query(query) {
                debug!(source = source.name(), query = %query, "Source does not match query, skipping");
                continue;
            }

            info!(source = source.name(), query = %query, "Source matched query, loading");
            return source.load_item(backend, query).await;
        }

        info!(query = %query, "No sources matched query");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lava_common::Track;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullBackend;

    #[async_trait]
    impl ResolutionBackend for NullBackend {
        async fn load_tracks(&self, _query: &str) -> Result<LoadResult, BackendError> {
            Ok(LoadResult::empty())
        }
    }

    /// Source matching a fixed prefix and counting load calls
    struct PrefixSource {
        name: &'static str,
        priority: i32,
        prefix: &'static str,
        result: Option<LoadResult>,
        loads: AtomicUsize,
    }

    impl PrefixSource {
        fn new(name: &'static str, priority: i32, prefix: &'static str, result: Option<LoadResult>) -> Arc<Self> {
            Arc::new(Self {
                name,
                priority,
                prefix,
                result,
                loads: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Source for PrefixSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn check_query(&self, query: &str) -> bool {
            query.starts_with(self.prefix)
        }

        async fn load_item(
            &self,
            _backend: &dyn ResolutionBackend,
            _query: &str,
        ) -> Result<Option<LoadResult>, SourceError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    fn track(id: &str) -> Track {
        Track {
            identifier: id.to_string(),
            title: id.to_string(),
            author: "a".to_string(),
            duration_ms: 1000,
            uri: String::new(),
            artwork_url: None,
            source_name: "test".to_string(),
            encoded: Some(id.to_string()),
            is_seekable: true,
            is_stream: false,
            requester: 0,
        }
    }

    #[tokio::test]
    async fn test_highest_priority_claim_wins() {
        let specific = PrefixSource::new("specific", 10, "http://a/", Some(LoadResult::track(track("s1"))));
        let catch_all = PrefixSource::new("catch_all", 1, "", Some(LoadResult::track(track("s2"))));

        // Registered low priority first to prove sorting
        let manager = SourceManager::new(vec![catch_all.clone(), specific.clone()]);
        assert_eq!(manager.names(), vec!["specific", "catch_all"]);

        let result = manager.load_item(&NullBackend, "http://a/song").await.unwrap().unwrap();
        assert_eq!(result.tracks[0].identifier, "s1");
        assert_eq!(specific.loads.load(Ordering::SeqCst), 1);
        assert_eq!(catch_all.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_claim_does_not_fall_through() {
        let specific = PrefixSource::new("specific", 10, "http://a/", None);
        let catch_all = PrefixSource::new("catch_all", 1, "", Some(LoadResult::track(track("s2"))));
        let manager = SourceManager::new(vec![specific.clone(), catch_all.clone()]);

        let result = manager.load_item(&NullBackend, "http://a/missing").await.unwrap();
        assert!(result.is_none());
        assert_eq!(catch_all.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_equal_priority_first_registered_wins() {
        let first = PrefixSource::new("first", 5, "x", Some(LoadResult::track(track("first"))));
        let second = PrefixSource::new("second", 5, "x", Some(LoadResult::track(track("second"))));
        let manager = SourceManager::new(vec![first.clone(), second.clone()]);

        let result = manager.load_item(&NullBackend, "xyz").await.unwrap().unwrap();
        assert_eq!(result.tracks[0].identifier, "first");
        assert_eq!(second.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unclaimed_query_returns_none() {
        let only = PrefixSource::new("only", 1, "http://", None);
        let manager = SourceManager::new(vec![only.clone()]);

        assert!(manager.load_item(&NullBackend, "plain words").await.unwrap().is_none());
        assert_eq!(only.loads.load(Ordering::SeqCst), 0);
    }
}
