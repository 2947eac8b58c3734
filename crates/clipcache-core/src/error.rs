//! Error types for ClipCache.

use thiserror::Error;

/// Main error type for ClipCache operations.
#[derive(Error, Debug)]
pub enum ClipCacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for ClipCache operations.
pub type Result<T> = std::result::Result<T, ClipCacheError>;
