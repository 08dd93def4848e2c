//! Event types
//!
//! Two event families cross component boundaries:
//! - [`BackendEvent`]: lifecycle events delivered by the audio node for one
//!   tenant, consumed by the player state machine.
//! - [`PlayerNotification`]: recoverable conditions and transitions the player
//!   surfaces to the command layer, broadcast to all listeners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::track::Track;

/// Why the node stopped playing a track
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    /// Played to the end
    Finished,
    /// Could not be loaded (followed by, or preceded by, a load-failed event)
    LoadFailed,
    /// Stopped on request
    Stopped,
    /// Replaced by a new dispatch
    Replaced,
    /// Player torn down on the node
    Cleanup,
}

impl TrackEndReason {
    /// True when the player should advance to the next queue entry
    ///
    /// `LoadFailed` is excluded: the matching `TrackLoadFailed` event drives
    /// the skip so a failure never advances twice.
    pub fn advances_queue(self) -> bool {
        matches!(self, TrackEndReason::Finished)
    }
}

impl std::fmt::Display for TrackEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackEndReason::Finished => write!(f, "finished"),
            TrackEndReason::LoadFailed => write!(f, "loadFailed"),
            TrackEndReason::Stopped => write!(f, "stopped"),
            TrackEndReason::Replaced => write!(f, "replaced"),
            TrackEndReason::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Lifecycle events emitted by the audio node for one tenant
///
/// Track-scoped variants carry the identifier of the track they refer to so
/// the player can drop events that arrive after that track was replaced.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    TrackStart {
        track_id: String,
    },
    TrackEnd {
        track_id: String,
        reason: TrackEndReason,
    },
    TrackStuck {
        track_id: String,
        threshold_ms: u64,
    },
    TrackLoadFailed {
        track_id: String,
        error: String,
    },
    QueueEnd,
    PositionUpdate {
        position_ms: u64,
        /// Node wall-clock time of the sample, unix milliseconds
        timestamp_ms: i64,
        connected: bool,
    },
}

impl BackendEvent {
    /// Short name used in log output
    pub fn kind(&self) -> &'static str {
        match self {
            BackendEvent::TrackStart { .. } => "TrackStart",
            BackendEvent::TrackEnd { .. } => "TrackEnd",
            BackendEvent::TrackStuck { .. } => "TrackStuck",
            BackendEvent::TrackLoadFailed { .. } => "TrackLoadFailed",
            BackendEvent::QueueEnd => "QueueEnd",
            BackendEvent::PositionUpdate { .. } => "PositionUpdate",
        }
    }
}

/// Notification surfaced by a player session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerNotification {
    /// A track was dispatched to the node
    TrackStarted {
        guild_id: u64,
        track: Track,
        timestamp: DateTime<Utc>,
    },

    /// The queue ran dry and the player went idle
    QueueEnded {
        guild_id: u64,
        timestamp: DateTime<Utc>,
    },

    /// A track could not be loaded and was skipped
    TrackLoadFailed {
        guild_id: u64,
        track: Track,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The node rejected a play request
    DispatchFailed {
        guild_id: u64,
        track: Track,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The node reported a stuck track, which was skipped
    TrackStuck {
        guild_id: u64,
        track: Track,
        timestamp: DateTime<Utc>,
    },

    /// Autoplay appended tracks to the queue
    AutoplayQueued {
        guild_id: u64,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Autoplay could not obtain recommendations and switched itself off
    AutoplayDisabled {
        guild_id: u64,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The player was inactive for too long and stopped
    IdleTimeout {
        guild_id: u64,
        timestamp: DateTime<Utc>,
    },
}

impl PlayerNotification {
    /// Tenant the notification belongs to
    pub fn guild_id(&self) -> u64 {
        match self {
            PlayerNotification::TrackStarted { guild_id, .. }
            | PlayerNotification::QueueEnded { guild_id, .. }
            | PlayerNotification::TrackLoadFailed { guild_id, .. }
            | PlayerNotification::DispatchFailed { guild_id, .. }
            | PlayerNotification::TrackStuck { guild_id, .. }
            | PlayerNotification::AutoplayQueued { guild_id, .. }
            | PlayerNotification::AutoplayDisabled { guild_id, .. }
            | PlayerNotification::IdleTimeout { guild_id, .. } => *guild_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_finished_advances_queue() {
        assert!(TrackEndReason::Finished.advances_queue());
        assert!(!TrackEndReason::LoadFailed.advances_queue());
        assert!(!TrackEndReason::Stopped.advances_queue());
        assert!(!TrackEndReason::Replaced.advances_queue());
        assert!(!TrackEndReason::Cleanup.advances_queue());
    }

    #[test]
    fn test_end_reason_wire_names() {
        let reason: TrackEndReason = serde_json::from_str("\"loadFailed\"").unwrap();
        assert_eq!(reason, TrackEndReason::LoadFailed);
        assert_eq!(serde_json::to_string(&TrackEndReason::Replaced).unwrap(), "\"replaced\"");
    }

    #[test]
    fn test_notification_serializes_with_type_tag() {
        let notification = PlayerNotification::QueueEnded {
            guild_id: 42,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["type"], "QueueEnded");
        assert_eq!(json["guild_id"], 42);
        assert_eq!(notification.guild_id(), 42);
    }
}
