//! Cache limits and configuration.

use crate::memory_budget;
use clipcache_core::{ClipCacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// When a cache starts evicting.
///
/// Both bounds are optional; an unset bound never triggers eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheLimit {
    /// Maximum memory held by cached values, in bytes.
    pub max_bytes: Option<usize>,
    /// Maximum number of entries.
    pub max_entries: Option<usize>,
}

impl CacheLimit {
    pub const fn unbounded() -> Self {
        Self {
            max_bytes: None,
            max_entries: None,
        }
    }

    pub const fn bytes(max_bytes: usize) -> Self {
        Self {
            max_bytes: Some(max_bytes),
            max_entries: None,
        }
    }

    pub const fn entries(max_entries: usize) -> Self {
        Self {
            max_bytes: None,
            max_entries: Some(max_entries),
        }
    }

    /// Whether the given usage exceeds this limit.
    pub fn is_exceeded(&self, bytes: usize, entries: usize) -> bool {
        self.max_bytes.is_some_and(|max| bytes > max)
            || self.max_entries.is_some_and(|max| entries > max)
    }
}

/// Configuration for clip and image caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Limit for decoded movie clip frames.
    pub frame_cache: CacheLimit,
    /// Limit for image datablock buffers.
    pub image_cache: CacheLimit,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            frame_cache: CacheLimit::bytes(memory_budget::FRAME_CACHE_SIZE),
            image_cache: CacheLimit::bytes(memory_budget::IMAGE_CACHE_SIZE),
        }
    }
}

impl CacheConfig {
    /// Parse a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ClipCacheError::Config(format!("Failed to parse cache config: {e}")))
    }

    /// Load a configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ClipCacheError::Config(format!("Failed to serialize cache config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_limit_exceeded() {
        let limit = CacheLimit {
            max_bytes: Some(100),
            max_entries: Some(2),
        };
        assert!(!limit.is_exceeded(100, 2));
        assert!(limit.is_exceeded(101, 1));
        assert!(limit.is_exceeded(10, 3));
        assert!(!CacheLimit::unbounded().is_exceeded(usize::MAX, usize::MAX));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            CacheConfig::from_json_str(r#"{ "frame_cache": { "max_entries": 24 } }"#).unwrap();
        assert_eq!(config.frame_cache, CacheLimit::entries(24));
        assert_eq!(config.image_cache, CacheConfig::default().image_cache);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = CacheConfig::from_json_str("{ frame_cache: 3 ").unwrap_err();
        assert!(matches!(err, ClipCacheError::Config(_)));
    }

    #[test]
    fn test_from_path_round_trip() {
        let config = CacheConfig {
            frame_cache: CacheLimit::entries(8),
            image_cache: CacheLimit::unbounded(),
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_json_string().unwrap().as_bytes())
            .unwrap();

        assert_eq!(CacheConfig::from_path(file.path()).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = CacheConfig::from_path("/nonexistent/clipcache.json").unwrap_err();
        assert!(matches!(err, ClipCacheError::Io(_)));
    }
}
