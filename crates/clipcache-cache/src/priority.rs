//! Eviction ranking policies.

/// Ranks cache entries for eviction.
///
/// Priority data is extracted from a key when ranking is needed and dropped
/// afterwards. `compare` ranks an entry against the most recently accessed
/// key: the lower the rank, the sooner the entry is evicted.
pub trait PriorityPolicy<K> {
    type Priority;

    fn extract(&self, key: &K) -> Self::Priority;

    fn compare(&self, last_key: &K, priority: &Self::Priority) -> i64;
}

/// No ranking: entries are evicted least recently used first.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPriority;

impl<K> PriorityPolicy<K> for NoPriority {
    type Priority = ();

    fn extract(&self, _key: &K) {}

    fn compare(&self, _last_key: &K, _priority: &()) -> i64 {
        0
    }
}

/// Keys that belong to a frame.
pub trait FrameIndexed {
    fn frame(&self) -> i32;
}

/// Evict frames furthest from the last accessed frame first.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDistance;

impl<K: FrameIndexed> PriorityPolicy<K> for FrameDistance {
    type Priority = i32;

    fn extract(&self, key: &K) -> i32 {
        key.frame()
    }

    fn compare(&self, last_key: &K, frame: &i32) -> i64 {
        -(i64::from(last_key.frame()) - i64::from(*frame)).abs()
    }
}
