//! Error types for lava-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

use crate::backend::BackendError;
use crate::display::DisplayError;
use crate::sources::SourceError;
use crate::voice::VoiceError;

/// Main error type for lava-player
#[derive(Error, Debug)]
pub enum Error {
    /// Voice-join precondition failed; surfaced verbatim to the user
    #[error(transparent)]
    Voice(#[from] VoiceError),

    /// Audio node request failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Display surface failure
    #[error("Display error: {0}")]
    Display(#[from] DisplayError),

    /// Source resolution failure
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Start/end time outside the track
    #[error("Invalid timing: {0}")]
    InvalidTiming(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Query resolved to nothing playable
    #[error("No results for query: {0}")]
    NoResults(String),

    /// Queue index or session not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration and other shared errors
    #[error(transparent)]
    Common(#[from] lava_common::Error),
}

/// Convenience Result type using lava-player Error
pub type Result<T> = std::result::Result<T, Error>;
