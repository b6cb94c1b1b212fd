//! Error types for the tracking engine

use crate::track::TrackId;
use thiserror::Error;

/// Result type alias for the tracking engine
pub type Result<T> = std::result::Result<T, TrackingError>;

/// Errors that can occur while configuring or querying a tracker
///
/// Dropped observations (capacity, malformed input) are not errors; they are
/// reported through [`FrameMetrics`](crate::manager::FrameMetrics).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error("Invalid configuration for `{field}`: {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },

    #[error("Track {0} not found")]
    TrackNotFound(TrackId),

    #[error("Tracking operator has stopped")]
    OperatorStopped,
}

impl TrackingError {
    pub fn invalid_config<S: Into<String>>(field: &'static str, reason: S) -> Self {
        Self::InvalidConfiguration {
            field,
            reason: reason.into(),
        }
    }
}
