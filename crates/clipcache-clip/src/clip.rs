//! Movie clip frame access.
//!
//! Frames are served from three layers, cheapest first: the postprocessed
//! slot, the raw frame cache, and the decoder. A stabilized slot sits on top
//! of the postprocessed result. Each slot holds one frame together with the
//! request it was built for and is only served when the current request
//! matches it exactly.

use crate::flags::{ClipFlags, PostprocessFlags, RenderFlags, RenderSize};
use crate::postprocess::{
    need_postprocessed_frame, need_undistortion_postprocess, postprocess_frame,
    DistortionSnapshot, PostprocessedSlot, SlotRequest, StabilizedSlot,
};
use crate::settings::{ClipSettings, ClipUser, FrameBase, MovieCacheKey};
use clipcache_cache::{CacheLimit, CacheStats, FrameDistance, KeyedCache};
use clipcache_core::Buffer;
use clipcache_media::{DecodeRequest, FrameDecoder, ProxySize};
use clipcache_tracking::{apply_stabilization, compute_stabilization, StabilizationData};
use parking_lot::Mutex;
use tracing::{debug, debug_span, info, trace, warn, Span};
use uuid::Uuid;

/// Whether a freshly decoded frame is stored in the raw cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    #[default]
    Store,
    Skip,
}

/// Stabilized frame and the correction that produced it.
#[derive(Debug, Clone)]
pub struct StableFrame {
    pub buffer: Buffer,
    pub data: StabilizationData,
}

struct ClipState {
    settings: ClipSettings,
    decoder: Box<dyn FrameDecoder>,
    frames: KeyedCache<MovieCacheKey, Buffer, FrameDistance>,
    frame_base: Option<FrameBase>,
    postprocessed: Option<PostprocessedSlot>,
    stabilized: Option<StabilizedSlot>,
    last_frame: i32,
    last_size: Option<(u32, u32)>,
    length: Option<usize>,
}

/// A footage source with its frame caches.
///
/// All access to one clip is serialized by its own lock; separate clips are
/// independent.
pub struct MovieClip {
    id: Uuid,
    state: Mutex<ClipState>,
}

impl MovieClip {
    pub fn new(settings: ClipSettings, decoder: Box<dyn FrameDecoder>, limit: CacheLimit) -> Self {
        let id = Uuid::new_v4();
        info!(%id, name = %settings.name, "created movie clip");
        let frames = KeyedCache::new(format!("movie clip {}", settings.name), limit)
            .with_priority(FrameDistance);
        Self {
            id,
            state: Mutex::new(ClipState {
                settings,
                decoder,
                frames,
                frame_base: None,
                postprocessed: None,
                stabilized: None,
                last_frame: 0,
                last_size: None,
                length: None,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn span(&self) -> Span {
        debug_span!("movie_clip", id = %self.id)
    }

    pub fn settings(&self) -> ClipSettings {
        self.state.lock().settings.clone()
    }

    /// Change settings in place.
    ///
    /// Slots revalidate themselves against the new settings, frame mapping
    /// included. Changing the source drops every cached frame.
    pub fn edit_settings<R>(&self, edit: impl FnOnce(&mut ClipSettings) -> R) -> R {
        let _span = self.span().entered();
        let mut state = self.state.lock();
        let source = (state.settings.source, state.settings.path.clone());
        let result = edit(&mut state.settings);
        if state.settings.source != source.0 || state.settings.path != source.1 {
            debug!("clip source changed");
            state.reset();
        }
        result
    }

    /// Raw frame for `user`, undistorted when the user asks for it.
    pub fn get_frame(&self, user: &ClipUser) -> Option<Buffer> {
        self.get_frame_with(user, CachePolicy::Store)
    }

    pub fn get_frame_with(&self, user: &ClipUser, policy: CachePolicy) -> Option<Buffer> {
        self.get_postprocessed_frame_with(user, PostprocessFlags::empty(), policy)
    }

    pub fn get_postprocessed_frame(
        &self,
        user: &ClipUser,
        postprocess: PostprocessFlags,
    ) -> Option<Buffer> {
        self.get_postprocessed_frame_with(user, postprocess, CachePolicy::Store)
    }

    fn get_postprocessed_frame_with(
        &self,
        user: &ClipUser,
        postprocess: PostprocessFlags,
        policy: CachePolicy,
    ) -> Option<Buffer> {
        let _span = self.span().entered();
        let mut state = self.state.lock();
        state.postprocessed_frame(user, postprocess, policy).or_else(|| {
            let full = fallback_user(user, state.settings.flags)?;
            debug!(frame = user.frame, "falling back to full size");
            state.postprocessed_frame(&full, postprocess, policy)
        })
    }

    /// Postprocessed frame with 2D stabilization applied.
    ///
    /// With stabilization disabled this is the postprocessed frame and an
    /// identity correction.
    pub fn get_stable_frame(
        &self,
        user: &ClipUser,
        postprocess: PostprocessFlags,
    ) -> Option<StableFrame> {
        let _span = self.span().entered();
        let mut state = self.state.lock();
        state.stable_frame(user, postprocess).or_else(|| {
            let full = fallback_user(user, state.settings.flags)?;
            debug!(frame = user.frame, "falling back to full size");
            state.stable_frame(&full, postprocess)
        })
    }

    /// Whether the raw frame for `user` is cached.
    pub fn has_cached_frame(&self, user: &ClipUser) -> bool {
        let mut state = self.state.lock();
        let key = state.cache_key(user);
        state.frames.has(&key)
    }

    /// Cache a frame produced elsewhere, unless one is already cached or
    /// storing it would evict others.
    pub fn put_frame_if_possible(&self, user: &ClipUser, buffer: &Buffer) -> bool {
        let _span = self.span().entered();
        let mut state = self.state.lock();
        let key = state.cache_key(user);
        let stored = state.frames.put_if_possible(key, buffer.pass_on());
        trace!(frame = key.frame, stored, "put frame if possible");
        stored
    }

    /// Drop all cached frames and slots and close the decoder.
    pub fn clear_cache(&self) {
        let _span = self.span().entered();
        self.state.lock().reset();
    }

    /// Drop cached proxy and undistorted variants, keep original frames.
    pub fn clear_proxy_cache(&self) -> usize {
        let _span = self.span().entered();
        self.state
            .lock()
            .frames
            .cleanup(|key, _| !key.is_original())
    }

    /// Forget everything and re-probe the source.
    pub fn reload(&self) {
        let _span = self.span().entered();
        let mut state = self.state.lock();
        state.reset();
        state.length = state.decoder.frame_count();
        info!(name = %state.settings.name, length = ?state.length, "reloaded clip");
    }

    /// Number of frames in the source, when the decoder knows it.
    pub fn length(&self) -> Option<usize> {
        let mut state = self.state.lock();
        if state.length.is_none() {
            state.length = state.decoder.frame_count();
        }
        state.length
    }

    /// Contiguous runs of cached frames for the variant `user` reads, as
    /// inclusive `(first, last)` source frame numbers.
    pub fn cached_segments(&self, user: &ClipUser) -> Vec<(i32, i32)> {
        let state = self.state.lock();
        let (proxy, render_flags) = user.variant(state.settings.flags);
        let mut frames: Vec<i32> = state
            .frames
            .keys()
            .filter(|key| key.proxy == proxy && key.render_flags == render_flags)
            .map(|key| key.frame)
            .collect();
        frames.sort_unstable();

        let mut segments: Vec<(i32, i32)> = Vec::new();
        for frame in frames {
            match segments.last_mut() {
                Some((_, last)) if *last + 1 == frame => *last = frame,
                _ => segments.push((frame, frame)),
            }
        }
        segments
    }

    /// Scene frame of the most recently served frame.
    pub fn last_frame(&self) -> i32 {
        self.state.lock().last_frame
    }

    /// Full resolution size of the most recently served frame.
    pub fn last_frame_size(&self) -> Option<(u32, u32)> {
        self.state.lock().last_size
    }

    /// Full resolution size of the frame at `user`, decoding it if needed.
    /// Falls back to the last known size when the frame is unavailable.
    pub fn frame_size(&self, user: &ClipUser) -> Option<(u32, u32)> {
        {
            let state = self.state.lock();
            if state.last_frame == user.frame && state.last_size.is_some() {
                return state.last_size;
            }
        }
        match self.get_frame(user) {
            Some(buffer) => {
                let flags = self.state.lock().settings.flags;
                Some(full_resolution_size(&buffer, user, flags))
            }
            None => self.last_frame_size(),
        }
    }

    /// Bytes held by the raw frame cache.
    pub fn memory_usage(&self) -> usize {
        self.state.lock().frames.memory_usage()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.state.lock().frames.stats()
    }
}

/// The full size retry for `user`, if it opted into one and the failed
/// request read a proxy.
fn fallback_user(user: &ClipUser, clip_flags: ClipFlags) -> Option<ClipUser> {
    (clip_flags.contains(ClipFlags::USE_PROXY)
        && user.render_flags.contains(RenderFlags::USE_FALLBACK)
        && user.render_size != RenderSize::Full)
        .then(|| user.with_render_size(RenderSize::Full))
}

/// Size `buffer` would have at full resolution.
fn full_resolution_size(buffer: &Buffer, user: &ClipUser, clip_flags: ClipFlags) -> (u32, u32) {
    let (w, h) = (buffer.width(), buffer.height());
    if !clip_flags.contains(ClipFlags::USE_PROXY) {
        return (w, h);
    }
    match user.render_size {
        RenderSize::P25 => (w * 4, h * 4),
        RenderSize::P50 => (w * 2, h * 2),
        RenderSize::P75 => (
            (w as f32 * 4.0 / 3.0) as u32,
            (h as f32 * 4.0 / 3.0) as u32,
        ),
        RenderSize::Full | RenderSize::P100 => (w, h),
    }
}

impl ClipState {
    fn reset(&mut self) {
        self.frames.clear();
        self.postprocessed = None;
        self.stabilized = None;
        self.frame_base = None;
        self.length = None;
        self.decoder.reset();
    }

    fn cache_key(&mut self, user: &ClipUser) -> MovieCacheKey {
        let clip_frame = self.settings.scene_to_clip_frame(user.frame);
        let base = *self
            .frame_base
            .get_or_insert_with(|| self.settings.frame_base());
        let (proxy, render_flags) = user.variant(self.settings.flags);
        MovieCacheKey {
            frame: base.cache_frame(clip_frame),
            proxy,
            render_flags,
        }
    }

    fn slot_request(&mut self, user: &ClipUser, postprocess: PostprocessFlags) -> SlotRequest {
        let key = self.cache_key(user);
        SlotRequest {
            frame: key.frame,
            proxy: key.proxy,
            render_flags: key.render_flags,
            postprocess,
        }
    }

    fn decode(&mut self, key: &MovieCacheKey) -> Option<Buffer> {
        let request = DecodeRequest {
            frame: key.frame,
            proxy: key.proxy,
            undistorted: key.proxy != ProxySize::None
                && key.render_flags.contains(RenderFlags::UNDISTORTED),
        };
        match self.decoder.decode_frame(&request) {
            Ok(buffer) => {
                debug!(frame = key.frame, proxy = ?key.proxy, "decoded frame");
                Some(buffer)
            }
            Err(err) => {
                warn!(frame = key.frame, proxy = ?key.proxy, "failed to decode frame: {err}");
                None
            }
        }
    }

    fn note_served(&mut self, user: &ClipUser, buffer: &Buffer) {
        self.last_frame = user.frame;
        self.last_size = Some(full_resolution_size(buffer, user, self.settings.flags));
    }

    fn postprocessed_frame(
        &mut self,
        user: &ClipUser,
        postprocess: PostprocessFlags,
        policy: CachePolicy,
    ) -> Option<Buffer> {
        let clip_flags = self.settings.flags;
        let needs_postprocess = need_postprocessed_frame(user, clip_flags, postprocess);
        let camera = need_undistortion_postprocess(user, clip_flags)
            .then(|| self.settings.camera.clone());
        let request = self.slot_request(user, postprocess);

        if needs_postprocess {
            let hit = self
                .postprocessed
                .as_ref()
                .filter(|slot| slot.matches(&request, camera.as_ref()))
                .map(|slot| slot.buffer.pass_on());
            if let Some(buffer) = hit {
                trace!(frame = user.frame, "postprocessed slot hit");
                self.note_served(user, &buffer);
                return Some(buffer);
            }
        }

        let key = self.cache_key(user);
        let raw = match self.frames.get(&key) {
            Some(buffer) => {
                trace!(frame = key.frame, "frame cache hit");
                buffer
            }
            None => {
                let buffer = self.decode(&key)?;
                if policy == CachePolicy::Store {
                    self.frames.put(key, buffer.pass_on());
                }
                buffer
            }
        };
        self.note_served(user, &raw);

        if !needs_postprocess {
            return Some(raw);
        }
        let buffer = postprocess_frame(&raw, camera.as_ref(), postprocess);
        self.postprocessed = Some(PostprocessedSlot {
            buffer: buffer.pass_on(),
            request,
            distortion: camera.as_ref().map(DistortionSnapshot::of),
        });
        Some(buffer)
    }

    fn stable_frame(&mut self, user: &ClipUser, postprocess: PostprocessFlags) -> Option<StableFrame> {
        let reference = self.postprocessed_frame(user, postprocess, CachePolicy::Store)?;
        if !self.settings.stabilization.enabled {
            return Some(StableFrame {
                buffer: reference,
                data: StabilizationData::IDENTITY,
            });
        }

        let request = self.slot_request(user, postprocess);
        let aspect = self.settings.camera.pixel_aspect;
        let filter = self.settings.stabilization.filter;
        let clip_frame = self.settings.scene_to_clip_frame(user.frame);
        let settings = &self.settings;
        let compute = |buffer: &Buffer| {
            compute_stabilization(
                &settings.stabilization,
                &settings.tracks,
                clip_frame,
                buffer.width(),
                buffer.height(),
                aspect,
            )
        };

        if let Some(slot) = &self.stabilized {
            if slot.matches(&request, &reference, aspect, filter) && compute(&slot.buffer) == slot.data {
                trace!(frame = user.frame, "stabilized slot hit");
                return Some(StableFrame {
                    buffer: slot.buffer.pass_on(),
                    data: slot.data,
                });
            }
        }

        let data = compute(&reference);
        let buffer = apply_stabilization(&reference, &data, aspect, filter);
        trace!(frame = user.frame, ?data, "stabilized frame");
        self.stabilized = Some(StabilizedSlot {
            buffer: buffer.pass_on(),
            request,
            reference: reference.identity(),
            data,
            aspect,
            filter,
        });
        Some(StableFrame { buffer, data })
    }
}
