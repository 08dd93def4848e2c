//! Configuration loading and config file resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "LAVA_CONFIG";

/// Complete TOML configuration
///
/// Every section and field is optional in the file; missing values fall
/// back to the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub node: NodeConfig,
    pub spotify: Option<SpotifyConfig>,
    pub player: PlayerConfig,
    pub sources: SourcesConfig,
    pub logging: LoggingConfig,
}

/// Remote audio node connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    /// Base REST url, e.g. `http://localhost:2333`
    pub url: String,
    pub password: String,
    /// Session id assigned by the node on websocket ready
    pub session_id: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:2333".to_string(),
            password: "youshallnotpass".to_string(),
            session_id: None,
            request_timeout_secs: 10,
        }
    }
}

/// Spotify catalog credentials (client-credentials flow)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Player policy knobs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Autoplay tops the queue up to this many tracks
    pub autoplay_low_water_mark: usize,
    /// Delay before rendering the display after a user action
    pub action_display_delay_ms: u64,
    /// Number of queue entries shown on the display
    pub queue_preview_len: usize,
    /// Idle time before the player stops on its own, 0 disables
    pub idle_timeout_secs: u64,
    /// Finished tracks remembered for `previous`
    pub history_limit: usize,
    /// Lyric lines shown around the position, in milliseconds either side
    pub lyrics_window_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            autoplay_low_water_mark: 5,
            action_display_delay_ms: 5000,
            queue_preview_len: 5,
            idle_timeout_secs: 180,
            history_limit: 50,
            lyrics_window_ms: 10_000,
        }
    }
}

/// Source chain settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesConfig {
    /// Program run to pull media urls out of generic web pages
    pub ytdlp_program: String,
    /// Register the Bilibili video source
    pub bilibili: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            ytdlp_program: "yt-dlp".to_string(),
            bilibili: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Reject values the player cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.player.autoplay_low_water_mark == 0 {
            return Err(Error::Config(
                "player.autoplay_low_water_mark must be at least 1".to_string(),
            ));
        }
        if self.node.url.trim().is_empty() {
            return Err(Error::Config("node.url must not be empty".to_string()));
        }
        if self.sources.ytdlp_program.trim().is_empty() {
            return Err(Error::Config(
                "sources.ytdlp_program must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Overlay credentials supplied through the environment
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("LAVA_NODE_URL") {
            self.node.url = url;
        }
        if let Ok(password) = std::env::var("LAVA_NODE_PASSWORD") {
            self.node.password = password;
        }

        let client_id = std::env::var("SPOTIFY_CLIENT_ID").ok();
        let client_secret = std::env::var("SPOTIFY_CLIENT_SECRET").ok();
        if let (Some(client_id), Some(client_secret)) = (client_id, client_secret) {
            self.spotify = Some(SpotifyConfig {
                client_id,
                client_secret,
            });
        }
    }
}

/// Config file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. `LAVA_CONFIG` environment variable
/// 3. `<config_dir>/lava/config.toml`
///
/// Returns `None` when no candidate exists, in which case defaults apply.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir()
        .map(|d| d.join("lava").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load configuration with graceful degradation
///
/// A missing file yields defaults plus a warning; a file that exists but
/// does not parse is an error. Environment overrides are applied last.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let mut config = match resolve_config_path(cli_arg) {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            TomlConfig::from_file(&path)?
        }
        Some(path) => {
            warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            TomlConfig::default()
        }
        None => {
            warn!("No config file found, using defaults");
            TomlConfig::default()
        }
    };

    config.apply_env_overrides();
    Ok(config)
}
