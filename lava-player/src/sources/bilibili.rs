//! Bilibili video source
//!
//! The node cannot read Bilibili pages, so the video's audio stream url is
//! looked up through a [`BilibiliCatalog`] and only that url is sent to the
//! node. The resulting track is relabelled with the video's title and
//! uploader.

use async_trait::async_trait;
use lava_common::LoadResult;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use super::{Source, SourceError};
use crate::backend::ResolutionBackend;

const VIDEO_URL_PREFIX: &str = "https://www.bilibili.com/video/";
const SHORT_URL_PREFIX: &str = "https://b23.tv/";

const VIDEO_ID_PATTERN: &str = r"/video/([^/?#]+)";

fn video_id_rx() -> Option<&'static Regex> {
    static RX: OnceLock<Option<Regex>> = OnceLock::new();
    RX.get_or_init(|| Regex::new(VIDEO_ID_PATTERN).ok()).as_ref()
}

/// Video id (`BV...`) of a full video url; short links have none
pub fn video_id(url: &str) -> Option<&str> {
    video_id_rx()?.captures(url)?.get(1).map(|m| m.as_str())
}

/// Audio stream and labels for one video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BilibiliMedia {
    pub audio_url: String,
    pub title: String,
    pub author: String,
}

/// Bilibili video lookups
///
/// `url` is either a full video url or a `b23.tv` short link. A video
/// without a playable audio stream is `Ok(None)`.
#[async_trait]
pub trait BilibiliCatalog: Send + Sync {
    async fn media(&self, url: &str) -> Result<Option<BilibiliMedia>, SourceError>;
}

/// Claims `www.bilibili.com/video/` and `b23.tv` urls
pub struct BilibiliSource {
    catalog: Arc<dyn BilibiliCatalog>,
}

impl BilibiliSource {
    pub fn new(catalog: Arc<dyn BilibiliCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Source for BilibiliSource {
    fn name(&self) -> &'static str {
        "BilibiliSource"
    }

    fn priority(&self) -> i32 {
        5
    }

    fn check_query(&self, query: &str) -> bool {
        query.starts_with(VIDEO_URL_PREFIX) || query.starts_with(SHORT_URL_PREFIX)
    }

    async fn load_item(
        &self,
        backend: &dyn ResolutionBackend,
        query: &str,
    ) -> Result<Option<LoadResult>, SourceError> {
        let Some(media) = self.catalog.media(query).await? else {
            debug!(url = %query, "No audio stream for Bilibili video");
            return Ok(None);
        };

        let result = backend.load_tracks(&media.audio_url).await?;
        let Some(mut track) = result.tracks.into_iter().next() else {
            debug!(url = %query, "Node could not load Bilibili audio stream");
            return Ok(None);
        };

        track.title = media.title;
        track.author = format!("{} / [Bilibili]({query})", media.author);

        info!(url = %query, title = %track.title, "Loaded Bilibili video");
        Ok(Some(LoadResult::track(track)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use lava_common::{LoadType, Track};

    const AUDIO_URL: &str = "https://upos-hz-mirrorakam.akamaized.net/30280.m4s";

    struct AudioOnlyBackend;

    #[async_trait]
    impl ResolutionBackend for AudioOnlyBackend {
        async fn load_tracks(&self, query: &str) -> Result<LoadResult, BackendError> {
            if query != AUDIO_URL {
                return Ok(LoadResult::empty());
            }
            Ok(LoadResult::track(Track {
                identifier: "30280".to_string(),
                title: "30280.m4s".to_string(),
                author: "Unknown artist".to_string(),
                duration_ms: 180_000,
                uri: query.to_string(),
                artwork_url: None,
                source_name: "http".to_string(),
                encoded: Some("enc-bili".to_string()),
                is_seekable: true,
                is_stream: false,
                requester: 0,
            }))
        }
    }

    struct FixedCatalog;

    #[async_trait]
    impl BilibiliCatalog for FixedCatalog {
        async fn media(&self, url: &str) -> Result<Option<BilibiliMedia>, SourceError> {
            if url.contains("BVgone") {
                return Ok(None);
            }
            if url.contains("BVbroken") {
                return Err(SourceError::Catalog("playurl returned -404".to_string()));
            }
            Ok(Some(BilibiliMedia {
                audio_url: AUDIO_URL.to_string(),
                title: "Night City".to_string(),
                author: "uploader".to_string(),
            }))
        }
    }

    fn source() -> BilibiliSource {
        BilibiliSource::new(Arc::new(FixedCatalog))
    }

    #[test]
    fn test_check_query() {
        let source = source();
        assert!(source.check_query("https://www.bilibili.com/video/BV1xx411c7mD"));
        assert!(source.check_query("https://b23.tv/abc123"));
        assert!(!source.check_query("https://bilibili.com/video/BV1xx411c7mD"));
        assert!(!source.check_query("https://www.bilibili.com/bangumi/play/ep1"));
        assert!(!source.check_query("bilibili night city"));
    }

    #[test]
    fn test_video_id() {
        assert_eq!(video_id("https://www.bilibili.com/video/BV1xx411c7mD?p=2"), Some("BV1xx411c7mD"));
        assert_eq!(video_id("https://www.bilibili.com/video/BV1xx411c7mD/"), Some("BV1xx411c7mD"));
        assert_eq!(video_id("https://b23.tv/abc123"), None);
    }

    #[tokio::test]
    async fn test_load_relabels_track() {
        let url = "https://www.bilibili.com/video/BV1xx411c7mD";
        let result = source().load_item(&AudioOnlyBackend, url).await.unwrap().unwrap();

        assert_eq!(result.load_type, LoadType::Track);
        let track = &result.tracks[0];
        assert_eq!(track.encoded.as_deref(), Some("enc-bili"));
        assert_eq!(track.title, "Night City");
        assert_eq!(
            track.author,
            "uploader / [Bilibili](https://www.bilibili.com/video/BV1xx411c7mD)"
        );
    }

    #[tokio::test]
    async fn test_video_without_audio_is_none() {
        let result = source()
            .load_item(&AudioOnlyBackend, "https://www.bilibili.com/video/BVgone")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_catalog_error_propagates() {
        let err = source()
            .load_item(&AudioOnlyBackend, "https://www.bilibili.com/video/BVbroken")
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Catalog(_)));
    }
}
