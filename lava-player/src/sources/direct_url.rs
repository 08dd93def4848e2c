//! Catch-all source for plain http(s) urls
//!
//! Pages are run through a [`MediaExtractor`] first; the direct media url it
//! finds is what the node is asked to load. The track keeps the page title
//! and its author is relabelled with the host the page came from. YouTube
//! watch/playlist urls are left to the node's own handling.

use async_trait::async_trait;
use lava_common::LoadResult;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{Source, SourceError};
use crate::backend::ResolutionBackend;

const YOUTUBE_URL_PATTERN: &str =
    r"^https?://(?:www\.)?(?:youtube\.com|music\.youtube\.com)/(?:watch\?v=|playlist\?list=)[a-zA-Z0-9_-]+";

const HOST_PATTERN: &str = r"^(?:https?://)?(?:[^@\n]+@)?(?:www\.)?([^:/\n]+)";

fn youtube_url_rx() -> Option<&'static Regex> {
    static RX: OnceLock<Option<Regex>> = OnceLock::new();
    RX.get_or_init(|| Regex::new(YOUTUBE_URL_PATTERN).ok()).as_ref()
}

fn host_rx() -> Option<&'static Regex> {
    static RX: OnceLock<Option<Regex>> = OnceLock::new();
    RX.get_or_init(|| Regex::new(HOST_PATTERN).ok()).as_ref()
}

/// Host part of a url, without `www.` or credentials
pub fn url_host(url: &str) -> Option<&str> {
    host_rx()?.captures(url)?.get(1).map(|m| m.as_str())
}

/// Playable media behind a web page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    /// Direct media url handed to the node
    pub media_url: String,
    pub title: String,
    /// Canonical page url, used for the author label
    pub webpage_url: String,
}

/// Pulls the direct media url out of a web page
///
/// `Ok(None)` means the page holds nothing playable.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<Option<MediaInfo>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    webpage_url: Option<String>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
    /// Present when the url is a playlist; the first entry is played
    entries: Option<Vec<YtDlpInfo>>,
}

/// Map `yt-dlp -J` output onto [`MediaInfo`]
///
/// The last listed format is the preferred one. `page_url` fills in a
/// missing `webpage_url`.
pub fn parse_ytdlp_json(json: &str, page_url: &str) -> Result<Option<MediaInfo>, SourceError> {
    let mut info: YtDlpInfo =
        serde_json::from_str(json).map_err(|e| SourceError::Catalog(format!("yt-dlp output: {e}")))?;

    if let Some(entries) = info.entries.take() {
        match entries.into_iter().next() {
            Some(first) => info = first,
            None => return Ok(None),
        }
    }

    let Some(media_url) = info.formats.into_iter().filter_map(|f| f.url).last() else {
        return Ok(None);
    };

    Ok(Some(MediaInfo {
        media_url,
        title: info.title.unwrap_or_else(|| page_url.to_string()),
        webpage_url: info.webpage_url.unwrap_or_else(|| page_url.to_string()),
    }))
}

/// Runs `yt-dlp -J` and reads its JSON dump
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    program: String,
}

impl YtDlpExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn extract(&self, url: &str) -> Result<Option<MediaInfo>, SourceError> {
        debug!(program = %self.program, url = %url, "Extracting media url");

        let output = Command::new(&self.program)
            .args(["-J", "--no-warnings", "-f", "bestaudio/best", url])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SourceError::Catalog(format!("failed to run {}: {e}", self.program)))?;

        // Unsupported pages and download errors exit non-zero
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(url = %url, status = ?output.status.code(), stderr = %stderr.trim(), "yt-dlp could not extract url");
            return Ok(None);
        }

        parse_ytdlp_json(&String::from_utf8_lossy(&output.stdout), url)
    }
}

pub struct DirectUrlSource {
    extractor: Arc<dyn MediaExtractor>,
}

impl DirectUrlSource {
    pub fn new(extractor: Arc<dyn MediaExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Source for DirectUrlSource {
    fn name(&self) -> &'static str {
        "DirectUrlSource"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn check_query(&self, query: &str) -> bool {
        if !(query.starts_with("http://") || query.starts_with("https://")) {
            return false;
        }
        !youtube_url_rx().is_some_and(|rx| rx.is_match(query))
    }

    async fn load_item(
        &self,
        backend: &dyn ResolutionBackend,
        query: &str,
    ) -> Result<Option<LoadResult>, SourceError> {
        let Some(media) = self.extractor.extract(query).await? else {
            debug!(url = %query, "No playable media on page");
            return Ok(None);
        };

        let result = backend.load_tracks(&media.media_url).await?;

        let Some(mut track) = result.tracks.into_iter().next() else {
            debug!(url = %query, media = %media.media_url, "Node returned nothing for extracted media");
            return Ok(None);
        };

        track.title = media.title;
        if let Some(host) = url_host(&media.webpage_url) {
            track.author = format!("Unknown / [{host}]({})", media.webpage_url);
        }

        Ok(Some(LoadResult::track(track)))
    }
}
