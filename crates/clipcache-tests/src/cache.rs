//! Integration tests for the keyed cache holding real buffers.

use clipcache_cache::{CacheConfig, CacheLimit, FrameDistance, KeyedCache};
use clipcache_clip::{MovieCacheKey, RenderFlags};
use clipcache_core::{Buffer, ChannelLayout};
use clipcache_media::ProxySize;

// ── Helpers ────────────────────────────────────────────────────

fn key(frame: i32, proxy: ProxySize) -> MovieCacheKey {
    MovieCacheKey {
        frame,
        proxy,
        render_flags: RenderFlags::empty(),
    }
}

fn frame(value: f32) -> Buffer {
    Buffer::filled(8, 8, ChannelLayout::Rgba, &[value, value, value, 1.0])
}

fn red(buffer: &Buffer) -> f32 {
    buffer.pixel(0, 0).unwrap()[0]
}

// ── Key semantics ──────────────────────────────────────────────

#[test]
fn get_returns_latest_value_for_exact_key() {
    let mut cache = KeyedCache::new("frames", CacheLimit::unbounded());
    let variants = [ProxySize::None, ProxySize::P25, ProxySize::P50];
    for (i, proxy) in variants.into_iter().enumerate() {
        cache.put(key(10, proxy), frame(i as f32));
    }
    cache.put(key(10, ProxySize::P25), frame(7.0));

    assert_eq!(red(&cache.get(&key(10, ProxySize::None)).unwrap()), 0.0);
    assert_eq!(red(&cache.get(&key(10, ProxySize::P25)).unwrap()), 7.0);
    assert_eq!(red(&cache.get(&key(10, ProxySize::P50)).unwrap()), 2.0);
    assert!(cache.get(&key(10, ProxySize::P75)).is_none());
    assert_eq!(cache.len(), 3);
}

#[test]
fn put_if_possible_keeps_first_buffer() {
    let mut cache = KeyedCache::new("frames", CacheLimit::unbounded());
    let first = frame(1.0);
    assert!(cache.put_if_possible(key(1, ProxySize::None), first.pass_on()));
    assert!(!cache.put_if_possible(key(1, ProxySize::None), frame(2.0)));

    let stored = cache.get(&key(1, ProxySize::None)).unwrap();
    assert!(stored.shares_storage(&first));
}

#[test]
fn cleanup_removes_exactly_matching_entries() {
    let mut cache = KeyedCache::new("frames", CacheLimit::unbounded());
    for f in 1..=10 {
        cache.put(key(f, ProxySize::None), frame(f as f32));
        cache.put(key(f, ProxySize::P50), frame(-f as f32));
    }

    let removed = cache.cleanup(|k, _| k.proxy != ProxySize::None && k.frame % 2 == 0);
    assert_eq!(removed, 5);
    assert_eq!(cache.len(), 15);

    for f in 1..=10 {
        assert_eq!(red(&cache.get(&key(f, ProxySize::None)).unwrap()), f as f32);
        let proxy = cache.get(&key(f, ProxySize::P50));
        if f % 2 == 0 {
            assert!(proxy.is_none());
        } else {
            assert_eq!(red(&proxy.unwrap()), -f as f32);
        }
    }
}

// ── Eviction ───────────────────────────────────────────────────

#[test]
fn memory_limit_evicts_frames_far_from_playhead() {
    let one = frame(0.0).memory_size();
    let mut cache =
        KeyedCache::new("frames", CacheLimit::bytes(one * 4)).with_priority(FrameDistance);
    for f in [1, 2, 3, 40] {
        cache.put(key(f, ProxySize::None), frame(f as f32));
    }
    cache.get(&key(2, ProxySize::None));
    cache.put(key(4, ProxySize::None), frame(4.0));

    assert!(!cache.has(&key(40, ProxySize::None)));
    for f in 1..=4 {
        assert!(cache.has(&key(f, ProxySize::None)));
    }
    assert!(cache.memory_usage() <= one * 4);
}

#[test]
fn evicted_buffer_stays_alive_for_holders() {
    let mut cache = KeyedCache::new("frames", CacheLimit::entries(1));
    cache.put(key(1, ProxySize::None), frame(1.0));
    let held = cache.get(&key(1, ProxySize::None)).unwrap();
    cache.put(key(2, ProxySize::None), frame(2.0));

    assert!(!cache.has(&key(1, ProxySize::None)));
    assert_eq!(held.owner_count(), 1);
    assert_eq!(red(&held), 1.0);
}

#[test]
fn config_limits_apply_to_cache() {
    let config = CacheConfig::from_json_str(r#"{"frame_cache": {"max_entries": 2}}"#).unwrap();
    let mut cache = KeyedCache::new("frames", config.frame_cache);
    for f in 1..=3 {
        cache.put(key(f, ProxySize::None), frame(f as f32));
    }
    assert_eq!(cache.len(), 2);
    assert!(cache.has(&key(3, ProxySize::None)));
}
