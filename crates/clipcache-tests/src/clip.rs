//! Integration tests for movie clips reading image sequences from disk.
//!
//! Exercises clipcache-clip on top of the clipcache-media sequence decoder,
//! clipcache-cache eviction and clipcache-tracking stabilization.

use clipcache_cache::CacheLimit;
use clipcache_clip::{
    ClipFlags, ClipSettings, ClipUser, ImageCache, ImageKey, MovieClip, PostprocessFlags,
    RenderFlags, RenderSize,
};
use clipcache_core::{Buffer, Result};
use clipcache_media::{DecodeRequest, FrameDecoder, ImageSequenceDecoder};
use clipcache_tracking::Track;
use glam::Vec2;
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;
use tempfile::TempDir;

// ── Helpers ────────────────────────────────────────────────────

/// Write `count` 8x8 frames whose red channel encodes the frame number.
fn write_sequence(dir: &Path, first: i32, count: i32) -> PathBuf {
    for frame in first..first + count {
        let image = RgbaImage::from_pixel(8, 8, Rgba([frame as u8 * 10, 128, 0, 255]));
        image.save(dir.join(format!("plate_{frame:04}.png"))).unwrap();
    }
    dir.join(format!("plate_{first:04}.png"))
}

fn open_clip(path: &Path, settings: ClipSettings, limit: CacheLimit) -> MovieClip {
    let decoder = ImageSequenceDecoder::open(path)
        .unwrap()
        .with_proxy_dir(path.parent().unwrap().join("proxies"));
    let settings = ClipSettings {
        path: path.to_path_buf(),
        ..settings
    };
    MovieClip::new(settings, Box::new(decoder), limit)
}

/// Sequence decoder that counts calls and takes a while per frame.
struct SlowDecoder {
    inner: ImageSequenceDecoder,
    calls: Arc<AtomicUsize>,
}

impl FrameDecoder for SlowDecoder {
    fn decode_frame(&mut self, request: &DecodeRequest) -> Result<Buffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        self.inner.decode_frame(request)
    }
}

fn red(buffer: &Buffer) -> f32 {
    buffer.pixel(0, 0).unwrap()[0]
}

fn same_frame(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

// ── Raw frames ─────────────────────────────────────────────────

#[test]
fn still_image_serves_one_buffer_for_every_frame() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("background.png");
    RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]))
        .save(&path)
        .unwrap();

    let clip = open_clip(&path, ClipSettings::default(), CacheLimit::unbounded());
    let first = clip.get_frame(&ClipUser::at(1)).unwrap();
    for frame in 2..=10 {
        let buffer = clip.get_frame(&ClipUser::at(frame)).unwrap();
        assert!(buffer.shares_storage(&first));
    }
    assert_eq!(clip.cached_segments(&ClipUser::at(1)), vec![(0, 0)]);
    assert_eq!(clip.cache_stats().misses, 1);
}

#[test]
fn sequence_frames_follow_file_numbers() {
    let dir = TempDir::new().unwrap();
    let path = write_sequence(dir.path(), 11, 5);
    let settings = ClipSettings {
        start_frame: 101,
        ..Default::default()
    };
    let clip = open_clip(&path, settings, CacheLimit::unbounded());

    assert_eq!(clip.length(), Some(5));
    let buffer = clip.get_frame(&ClipUser::at(103)).unwrap();
    assert!(same_frame(red(&buffer), 130.0 / 255.0));
    assert!(clip.get_frame(&ClipUser::at(120)).is_none());
    assert_eq!(clip.cached_segments(&ClipUser::at(101)), vec![(13, 13)]);
}

#[test]
fn proxy_variant_is_cached_beside_original() {
    let dir = TempDir::new().unwrap();
    let path = write_sequence(dir.path(), 1, 3);
    let proxy_dir = dir.path().join("proxies/proxy_50");
    std::fs::create_dir_all(&proxy_dir).unwrap();
    RgbImage::from_pixel(4, 4, Rgb([20, 128, 0]))
        .save(proxy_dir.join("00000002.jpg"))
        .unwrap();

    let settings = ClipSettings {
        flags: ClipFlags::USE_PROXY,
        ..Default::default()
    };
    let clip = open_clip(&path, settings, CacheLimit::unbounded());
    let full = ClipUser::at(2);
    let half = full.with_render_size(RenderSize::P50);

    let original = clip.get_frame(&full).unwrap();
    let proxy = clip.get_frame(&half).unwrap();
    assert_eq!(original.width(), 8);
    assert_eq!(proxy.width(), 4);
    assert!(clip.has_cached_frame(&full));
    assert!(clip.has_cached_frame(&half));
    assert_eq!(clip.last_frame_size(), Some((8, 8)));

    assert_eq!(clip.clear_proxy_cache(), 1);
    assert!(clip.has_cached_frame(&full));
    assert!(!clip.has_cached_frame(&half));
}

#[test]
fn missing_proxy_falls_back_to_full_size() {
    let dir = TempDir::new().unwrap();
    let path = write_sequence(dir.path(), 1, 2);
    let settings = ClipSettings {
        flags: ClipFlags::USE_PROXY,
        ..Default::default()
    };
    let clip = open_clip(&path, settings, CacheLimit::unbounded());

    let user = ClipUser::at(1).with_render_size(RenderSize::P25);
    assert!(clip.get_frame(&user).is_none());
    let user = user.with_render_flags(RenderFlags::USE_FALLBACK);
    assert_eq!(clip.get_frame(&user).unwrap().width(), 8);
}

#[test]
fn playback_under_entry_limit_keeps_frames_near_playhead() {
    let dir = TempDir::new().unwrap();
    let path = write_sequence(dir.path(), 1, 12);
    let clip = open_clip(&path, ClipSettings::default(), CacheLimit::entries(4));

    for frame in 1..=12 {
        assert!(clip.get_frame(&ClipUser::at(frame)).is_some());
    }
    assert_eq!(clip.cached_segments(&ClipUser::at(1)), vec![(9, 12)]);
    assert_eq!(clip.cache_stats().evictions, 8);
}

#[test]
fn clips_are_independent_across_threads() {
    let dir = TempDir::new().unwrap();
    let path = write_sequence(dir.path(), 1, 6);
    let clips: Vec<Arc<MovieClip>> = (0..2)
        .map(|_| Arc::new(open_clip(&path, ClipSettings::default(), CacheLimit::unbounded())))
        .collect();

    let handles: Vec<_> = clips
        .iter()
        .map(|clip| {
            let clip = Arc::clone(clip);
            std::thread::spawn(move || {
                for frame in 1..=6 {
                    clip.get_frame(&ClipUser::at(frame)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for clip in &clips {
        assert_eq!(clip.cached_segments(&ClipUser::at(1)), vec![(1, 6)]);
    }
    assert_ne!(clips[0].id(), clips[1].id());
}

#[test]
fn concurrent_requests_for_one_frame_decode_once() {
    let dir = TempDir::new().unwrap();
    let path = write_sequence(dir.path(), 1, 3);
    let calls = Arc::new(AtomicUsize::new(0));
    let decoder = SlowDecoder {
        inner: ImageSequenceDecoder::open(&path).unwrap(),
        calls: Arc::clone(&calls),
    };
    let settings = ClipSettings {
        path: path.clone(),
        ..Default::default()
    };
    let clip = Arc::new(MovieClip::new(settings, Box::new(decoder), CacheLimit::unbounded()));

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let clip = Arc::clone(&clip);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                clip.get_frame(&ClipUser::at(2)).unwrap()
            })
        })
        .collect();
    let buffers: Vec<Buffer> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for buffer in &buffers[1..] {
        assert!(buffer.shares_storage(&buffers[0]));
    }
    assert!(same_frame(red(&buffers[0]), 20.0 / 255.0));
    assert_eq!(clip.cache_stats().hits, threads as u64 - 1);
}

// ── Postprocessed and stabilized slots ─────────────────────────

#[test]
fn postprocessed_slot_misses_on_proxy_change() {
    let dir = TempDir::new().unwrap();
    let path = write_sequence(dir.path(), 1, 6);
    let proxy_dir = dir.path().join("proxies/proxy_25");
    std::fs::create_dir_all(&proxy_dir).unwrap();
    RgbImage::from_pixel(2, 2, Rgb([50, 128, 0]))
        .save(proxy_dir.join("00000005.jpg"))
        .unwrap();

    let settings = ClipSettings {
        flags: ClipFlags::USE_PROXY,
        ..Default::default()
    };
    let clip = open_clip(&path, settings, CacheLimit::unbounded());
    let full = ClipUser::at(5);
    let quarter = full.with_render_size(RenderSize::P25);

    let primed = clip
        .get_postprocessed_frame(&full, PostprocessFlags::PREVIEW_GRAYSCALE)
        .unwrap();
    let other = clip
        .get_postprocessed_frame(&quarter, PostprocessFlags::PREVIEW_GRAYSCALE)
        .unwrap();
    assert!(!other.shares_storage(&primed));
    assert_eq!(other.width(), 2);

    let again = clip
        .get_postprocessed_frame(&quarter, PostprocessFlags::PREVIEW_GRAYSCALE)
        .unwrap();
    assert!(again.shares_storage(&other));
}

#[test]
fn stabilized_slot_reused_until_tracks_change() {
    let dir = TempDir::new().unwrap();
    let path = write_sequence(dir.path(), 1, 3);
    let mut track = Track::new("feature");
    track.add_marker(1, Vec2::new(0.5, 0.5)).unwrap();
    track.add_marker(3, Vec2::new(0.75, 0.5)).unwrap();
    let mut settings = ClipSettings::default();
    settings.stabilization.enabled = true;
    settings.tracks.push(track);
    let clip = open_clip(&path, settings, CacheLimit::unbounded());
    let user = ClipUser::at(2);

    let first = clip.get_stable_frame(&user, PostprocessFlags::empty()).unwrap();
    assert_eq!(first.data.translation, Vec2::new(-1.0, 0.0));
    let second = clip.get_stable_frame(&user, PostprocessFlags::empty()).unwrap();
    assert!(second.buffer.shares_storage(&first.buffer));
    assert_eq!(second.data, first.data);

    clip.edit_settings(|s| s.stabilization.influence_location = 0.5);
    let third = clip.get_stable_frame(&user, PostprocessFlags::empty()).unwrap();
    assert!(!third.buffer.shares_storage(&first.buffer));
    assert_eq!(third.data.translation, Vec2::new(-0.5, 0.0));
}

#[test]
fn stabilized_slot_misses_when_upstream_frame_is_rebuilt() {
    let dir = TempDir::new().unwrap();
    let path = write_sequence(dir.path(), 1, 2);
    let mut settings = ClipSettings::default();
    settings.stabilization.enabled = true;
    let clip = open_clip(&path, settings, CacheLimit::entries(1));
    let user = ClipUser::at(1);

    let first = clip.get_stable_frame(&user, PostprocessFlags::empty()).unwrap();
    let second = clip.get_stable_frame(&user, PostprocessFlags::empty()).unwrap();
    assert!(second.buffer.shares_storage(&first.buffer));

    // Frame 2 evicts the raw frame the slot was built from.
    clip.get_frame(&ClipUser::at(2)).unwrap();
    assert!(!clip.has_cached_frame(&user));
    let third = clip.get_stable_frame(&user, PostprocessFlags::empty()).unwrap();
    assert!(!third.buffer.shares_storage(&first.buffer));
    assert_eq!(third.data, first.data);
}

// ── Image datablock cache ──────────────────────────────────────

#[test]
fn image_cache_frees_animation_frames_around_current() {
    let dir = TempDir::new().unwrap();
    let path = write_sequence(dir.path(), 1, 4);
    let clip = open_clip(&path, ClipSettings::default(), CacheLimit::unbounded());
    let images = ImageCache::new("plate", CacheLimit::unbounded());

    for frame in 1..=4 {
        let buffer = clip.get_frame(&ClipUser::at(frame)).unwrap();
        images.put(ImageKey::frame(frame), buffer);
    }
    images.mark_dirty(ImageKey::frame(1));

    assert_eq!(images.free_anim_buffers(3), 2);
    assert!(images.get(ImageKey::frame(1)).is_some());
    assert!(images.get(ImageKey::frame(3)).is_some());
    assert_eq!(images.len(), 2);
}
