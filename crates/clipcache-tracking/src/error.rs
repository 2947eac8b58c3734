//! Tracking subsystem errors.

use clipcache_core::ClipCacheError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("invalid camera: {0}")]
    InvalidCamera(String),
    #[error("invalid marker at frame {frame}: {reason}")]
    InvalidMarker { frame: i32, reason: String },
}

impl From<TrackingError> for ClipCacheError {
    fn from(err: TrackingError) -> Self {
        ClipCacheError::InvalidParameter(err.to_string())
    }
}
