//! Bilibili web client
//!
//! Scrapes the video page for the `cid`, play session, title and uploader,
//! then asks the `x/player/playurl` API for the DASH audio streams.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::sources::bilibili::{video_id, BilibiliCatalog, BilibiliMedia};
use crate::sources::SourceError;

const PLAY_URL_API: &str = "https://api.bilibili.com/x/player/playurl";
const REFERER: &str = "https://www.bilibili.com/";
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:99.0) Gecko/20100101 Firefox/99.0";

/// Audio mirror that the node can fetch without Bilibili cookies
const PREFERRED_MIRROR: &str = "https://upos-hz-mirrorakam.akamaized.net/";

const TITLE_SUFFIX: &str = "_哔哩哔哩_bilibili";

#[derive(Debug, Error)]
pub enum BilibiliError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(i64, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<BilibiliError> for SourceError {
    fn from(e: BilibiliError) -> Self {
        SourceError::Catalog(e.to_string())
    }
}

fn rx(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn capture<'a>(cell: &'static OnceLock<Option<Regex>>, pattern: &str, text: &'a str) -> Option<&'a str> {
    rx(cell, pattern)?.captures(text)?.get(1).map(|m| m.as_str())
}

fn unescape_html(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Values scraped from a video page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPage {
    pub cid: String,
    pub session: Option<String>,
    pub title: String,
    pub author: String,
}

/// Scrape a video page; `None` when it carries no `cid`
pub fn parse_video_page(html: &str) -> Option<VideoPage> {
    static CID: OnceLock<Option<Regex>> = OnceLock::new();
    static SESSION: OnceLock<Option<Regex>> = OnceLock::new();
    static TITLE: OnceLock<Option<Regex>> = OnceLock::new();
    static AUTHOR: OnceLock<Option<Regex>> = OnceLock::new();

    let cid = capture(&CID, r#""cid":(\d+),"#, html)?.to_string();
    let session = capture(&SESSION, r#""session":"(.*?)""#, html).map(str::to_string);

    let title = capture(&TITLE, r"<title[^>]*>([^<]*)</title>", html)
        .map(|t| unescape_html(t.trim()))
        .map(|t| t.trim_end_matches(TITLE_SUFFIX).to_string())
        .unwrap_or_default();
    let author = capture(&AUTHOR, r#"<meta\s+name="author"\s+content="([^"]*)""#, html)
        .map(|a| unescape_html(a.trim()))
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    Some(VideoPage {
        cid,
        session,
        title,
        author,
    })
}

#[derive(Debug, Deserialize)]
pub struct PlayUrlResponse {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<PlayUrlData>,
}

#[derive(Debug, Deserialize)]
struct PlayUrlData {
    dash: Option<DashInfo>,
}

#[derive(Debug, Deserialize)]
struct DashInfo {
    #[serde(default)]
    audio: Vec<DashStream>,
}

#[derive(Debug, Deserialize)]
struct DashStream {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "backupUrl", default)]
    backup_url: Vec<String>,
}

/// Pick the audio url from a playurl response
///
/// Streams on [`PREFERRED_MIRROR`] win; otherwise the first stream's base
/// url is used.
pub fn pick_audio_url(response: PlayUrlResponse) -> Result<Option<String>, BilibiliError> {
    if response.code != 0 {
        return Err(BilibiliError::Api(response.code, response.message));
    }

    let streams = response
        .data
        .and_then(|d| d.dash)
        .map(|d| d.audio)
        .unwrap_or_default();

    let preferred = streams
        .iter()
        .flat_map(|s| std::iter::once(&s.base_url).chain(s.backup_url.iter()))
        .find(|url| url.starts_with(PREFERRED_MIRROR))
        .cloned();

    Ok(preferred.or_else(|| streams.into_iter().next().map(|s| s.base_url)))
}

/// Bilibili web client
pub struct BilibiliClient {
    http_client: reqwest::Client,
}

impl BilibiliClient {
    pub fn new() -> Result<Self, BilibiliError> {
        let http_client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| BilibiliError::Network(e.to_string()))?;

        Ok(Self { http_client })
    }

    /// Fetch a video page, following short-link redirects
    ///
    /// Returns the final url with the page body.
    async fn fetch_page(&self, url: &str) -> Result<(String, String), BilibiliError> {
        let response = self
            .http_client
            .get(url)
            .header(reqwest::header::REFERER, REFERER)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.8,zh-Hans-CN;q=0.5")
            .send()
            .await
            .map_err(|e| BilibiliError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BilibiliError::Api(status.as_u16().into(), format!("video page {url}")));
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| BilibiliError::Network(e.to_string()))?;
        Ok((final_url, body))
    }

    async fn audio_url(&self, bvid: &str, page: &VideoPage) -> Result<Option<String>, BilibiliError> {
        let mut query = vec![
            ("bvid", bvid.to_string()),
            ("cid", page.cid.clone()),
            ("qn", "2".to_string()),
            ("otype", "json".to_string()),
            ("fourk", "1".to_string()),
            ("fnver", "0".to_string()),
            ("fnval", "976".to_string()),
        ];
        if let Some(ref session) = page.session {
            query.push(("session", session.clone()));
        }

        debug!(bvid = %bvid, cid = %page.cid, "Querying Bilibili playurl");

        let response: PlayUrlResponse = self
            .http_client
            .get(PLAY_URL_API)
            .header(reqwest::header::REFERER, REFERER)
            .query(&query)
            .send()
            .await
            .map_err(|e| BilibiliError::Network(e.to_string()))?
            .json()
            .await
            .map_err(|e| BilibiliError::Parse(e.to_string()))?;

        pick_audio_url(response)
    }
}

#[async_trait]
impl BilibiliCatalog for BilibiliClient {
    async fn media(&self, url: &str) -> Result<Option<BilibiliMedia>, SourceError> {
        let (final_url, html) = self.fetch_page(url).await?;

        let Some(bvid) = video_id(&final_url) else {
            warn!(url = %url, resolved = %final_url, "Bilibili link does not point at a video");
            return Ok(None);
        };

        let Some(page) = parse_video_page(&html) else {
            return Err(BilibiliError::Parse(format!("no cid on page {final_url}")).into());
        };

        let Some(audio_url) = self.audio_url(bvid, &page).await? else {
            return Ok(None);
        };

        Ok(Some(BilibiliMedia {
            audio_url,
            title: page.title,
            author: page.author,
        }))
    }
}
