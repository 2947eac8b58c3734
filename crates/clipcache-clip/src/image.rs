//! Buffer cache for image datablocks.
//!
//! Single images, sequences and multi-view images share one cache per
//! image. Buffers edited in place are marked dirty and survive every
//! cleanup until they are saved or the cache is cleared.

use clipcache_cache::{CacheLimit, CacheValue, KeyedCache};
use clipcache_core::Buffer;
use parking_lot::Mutex;
use tracing::debug;

/// Where a buffer sits inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKey {
    /// The image's only buffer, not tied to a frame.
    Single,
    Frame { frame: i32, view: u16 },
}

impl ImageKey {
    pub fn frame(frame: i32) -> Self {
        Self::Frame { frame, view: 0 }
    }

    fn frame_number(self) -> Option<i32> {
        match self {
            Self::Single => None,
            Self::Frame { frame, .. } => Some(frame),
        }
    }
}

#[derive(Clone)]
struct ImageEntry {
    buffer: Buffer,
    dirty: bool,
}

impl CacheValue for ImageEntry {
    fn memory_size(&self) -> usize {
        self.buffer.memory_size()
    }
}

pub struct ImageCache {
    cache: Mutex<KeyedCache<ImageKey, ImageEntry>>,
}

impl ImageCache {
    pub fn new(name: impl Into<String>, limit: CacheLimit) -> Self {
        Self {
            cache: Mutex::new(KeyedCache::new(name, limit)),
        }
    }

    pub fn get(&self, key: ImageKey) -> Option<Buffer> {
        self.cache.lock().get(&key).map(|entry| entry.buffer)
    }

    /// Store a freshly loaded, clean buffer.
    pub fn put(&self, key: ImageKey, buffer: Buffer) {
        self.cache.lock().put(
            key,
            ImageEntry {
                buffer,
                dirty: false,
            },
        );
    }

    /// Flag a buffer as edited. Returns false when it is not cached.
    pub fn mark_dirty(&self, key: ImageKey) -> bool {
        self.set_dirty(key, true)
    }

    /// Flag a buffer as saved.
    pub fn mark_clean(&self, key: ImageKey) -> bool {
        self.set_dirty(key, false)
    }

    fn set_dirty(&self, key: ImageKey, dirty: bool) -> bool {
        self.cache
            .lock()
            .modify(&key, |entry| entry.dirty = dirty)
            .is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.cache.lock().iter().any(|(_, entry)| entry.dirty)
    }

    pub fn has_loaded_buffer(&self) -> bool {
        !self.cache.lock().is_empty()
    }

    /// Drop clean frame buffers, keeping `except_frame` for playback.
    pub fn free_anim_buffers(&self, except_frame: i32) -> usize {
        let removed = self.cache.lock().cleanup(|key, entry| {
            !entry.dirty && key.frame_number().is_some_and(|f| f != except_frame)
        });
        debug!(removed, except_frame, "freed animation buffers");
        removed
    }

    /// Drop every buffer that has no unsaved edits.
    pub fn free_clean_buffers(&self) -> usize {
        self.cache.lock().cleanup(|_, entry| !entry.dirty)
    }

    /// Drop everything, dirty buffers included.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.cache.lock().memory_usage()
    }
}
