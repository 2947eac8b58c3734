//! ClipCache Cache - keyed storage for decoded frames
//!
//! This crate provides:
//! - [`KeyedCache`], a key to value map with memory/entry limits
//! - Pluggable eviction ranking through [`PriorityPolicy`]
//! - Cache configuration loaded from JSON

pub mod config;
pub mod keyed;
pub mod priority;

pub use config::{CacheConfig, CacheLimit};
pub use keyed::{CacheStats, CacheValue, KeyedCache};
pub use priority::{FrameDistance, FrameIndexed, NoPriority, PriorityPolicy};

/// Memory budget defaults for desktop machines
pub mod memory_budget {
    /// Decoded movie clip frames
    pub const FRAME_CACHE_SIZE: usize = 512 * 1024 * 1024; // 512 MB

    /// Image datablock buffers
    pub const IMAGE_CACHE_SIZE: usize = 256 * 1024 * 1024; // 256 MB
}
