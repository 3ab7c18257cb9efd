//! Error types for the interaction engine.
//!
//! Only configuration errors ever leave [`crate::InteractionEngine::new`].
//! Audio and tracking failures are absorbed where they happen and logged.

use thiserror::Error;

use crate::hand::{Side, UserId};

/// Failures reported by an [`crate::AudioBackend`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    /// The sound resource could not be found or fetched
    #[error("Sound resource not found: {0}")]
    NotFound(String),

    /// The backend itself failed (device gone, connection closed, ...)
    #[error("Audio backend error: {0}")]
    Backend(String),
}

/// Failures reported by a [`crate::HandTracker`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error("Could not attach {side} hand for user {user}: {reason}")]
    AttachFailed { user: UserId, side: Side, reason: String },
}

/// Rejected engine configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Fret count must be between 2 and 128, got {0}")]
    InvalidFretCount(usize),

    #[error("Fret spacing must be positive, got {0}")]
    InvalidSpacing(f32),

    #[error("Fretboard bounds must be non-negative, got half_height={half_height} half_depth={half_depth}")]
    InvalidBounds { half_height: f32, half_depth: f32 },

    #[error("Timer period `{0}` must be non-zero")]
    ZeroPeriod(&'static str),

    #[error("At least one string must be configured")]
    NoStrings,

    #[error("String `{0}` is configured twice")]
    DuplicateString(String),

    #[error("String `{name}` has an invalid {axis} capture band [{min}, {max}]")]
    InvalidCaptureBand { name: String, axis: char, min: f32, max: f32 },
}

/// Errors constructing an [`crate::InteractionEngine`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for engine construction
pub type EngineResult<T> = Result<T, EngineError>;
