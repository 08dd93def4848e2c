//! Lava Player (lava-player) - Main entry point
//!
//! Boots the player stack against one audio node. Node websocket messages
//! are read as JSON lines on stdin (typically piped from a relay) and routed
//! to the owning session; display renders and notifications go to the log.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lava_common::config::load_config;
use lava_player::autoplay::AutoplayEngine;
use lava_player::backend::node_client::parse_event;
use lava_player::backend::NodeClient;
use lava_player::bilibili_client::BilibiliClient;
use lava_player::display::{DisplayError, DisplaySurface, DisplayTarget, DisplayView};
use lava_player::player::manager::NOTIFICATION_CAPACITY;
use lava_player::sources::{
    BilibiliSource, DirectUrlSource, Source, SourceManager, SpotifySource, YtDlpExtractor,
};
use lava_player::spotify_client::SpotifyClient;
use lava_player::{PlayerContext, PlayerManager};

/// Command-line arguments for lava-player
#[derive(Parser, Debug)]
#[command(name = "lava-player")]
#[command(about = "Per-guild music playback controller")]
#[command(version)]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (overrides the config file)
    #[arg(long, env = "LAVA_LOG_LEVEL")]
    log_level: Option<String>,
}

/// Surface that writes every render to the log
struct LogSurface;

#[async_trait]
impl DisplaySurface for LogSurface {
    async fn render(&self, target: &DisplayTarget, view: &DisplayView) -> Result<(), DisplayError> {
        let body = serde_json::to_string(view).map_err(|e| DisplayError::Surface(e.to_string()))?;
        info!(channel = target.channel_id, message = target.message_id, view = %body, "Display render");
        Ok(())
    }

    async fn delete(&self, target: &DisplayTarget) -> Result<(), DisplayError> {
        debug!(channel = target.channel_id, message = target.message_id, "Display delete");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    let default_filter = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting lava-player against node {}", config.node.url);

    let node = Arc::new(NodeClient::new(&config.node).context("Failed to create node client")?);

    let spotify = match config.spotify {
        Some(ref spotify_config) => Some(Arc::new(
            SpotifyClient::new(spotify_config).context("Failed to create Spotify client")?,
        )),
        None => {
            warn!("Spotify credentials not configured; Spotify urls and autoplay are disabled");
            None
        }
    };

    let mut sources: Vec<Arc<dyn Source>> = Vec::new();
    if let Some(ref client) = spotify {
        sources.push(Arc::new(SpotifySource::new(client.clone())));
    }
    if config.sources.bilibili {
        let client = BilibiliClient::new().context("Failed to create Bilibili client")?;
        sources.push(Arc::new(BilibiliSource::new(Arc::new(client))));
    }
    sources.push(Arc::new(DirectUrlSource::new(Arc::new(YtDlpExtractor::new(
        config.sources.ytdlp_program.clone(),
    )))));
    let sources = SourceManager::new(sources);

    let autoplay = spotify.map(|client| {
        Arc::new(AutoplayEngine::new(
            client,
            node.clone(),
            sources.clone(),
            config.player.autoplay_low_water_mark,
        ))
    });

    let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

    let manager = Arc::new(PlayerManager::new(PlayerContext {
        audio: node.clone(),
        resolver: node.clone(),
        sources,
        autoplay,
        surface: Arc::new(LogSurface),
        notifications,
        config: config.player.clone(),
    }));
    info!("Player manager initialized");

    let mut notification_rx = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match notification_rx.recv().await {
                Ok(notification) => info!(guild = notification.guild_id(), ?notification, "Player notification"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification log lagging")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::select! {
        result = relay_node_events(manager.clone(), node.clone()) => {
            result.context("Node event relay failed")?;
            info!("Node event stream closed");
        }
        _ = shutdown_signal() => {}
    }

    manager.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Read node messages from stdin and route them to sessions
async fn relay_node_events(manager: Arc<PlayerManager>, node: Arc<NodeClient>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read node event")? {
        let message: serde_json::Value = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Skipping malformed node message");
                continue;
            }
        };

        if message.get("op").and_then(|op| op.as_str()) == Some("ready") {
            if let Some(session_id) = message.get("sessionId").and_then(|s| s.as_str()) {
                node.set_session_id(session_id);
            }
            continue;
        }

        match parse_event(&message) {
            Ok(Some((guild_id, event))) => {
                if let Err(e) = manager.dispatch_event(guild_id, event).await {
                    warn!(guild = guild_id, error = %e, "Failed to handle node event");
                }
            }
            Ok(None) => debug!("Ignoring node message"),
            Err(e) => warn!(error = %e, "Failed to parse node event"),
        }
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
