//! Postprocessing decisions and the single-frame slots that memoize them.

use crate::flags::{ClipFlags, PostprocessFlags, RenderFlags, RenderSize};
use crate::settings::ClipUser;
use clipcache_core::{Buffer, BufferIdentity};
use clipcache_media::ProxySize;
use clipcache_tracking::{undistort, CameraIntrinsics, DistortionModel, FilterKind, StabilizationData};
use glam::Vec2;

const LUMA_WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Whether frames for `user` are undistorted on the fly.
///
/// Only full frames can be undistorted here, proxies carry their own
/// pre-undistorted variant.
pub fn need_undistortion_postprocess(user: &ClipUser, clip_flags: ClipFlags) -> bool {
    let uses_full_frame =
        !clip_flags.contains(ClipFlags::USE_PROXY) || user.render_size == RenderSize::Full;
    uses_full_frame && user.render_flags.contains(RenderFlags::UNDISTORTED)
}

pub fn need_postprocessed_frame(
    user: &ClipUser,
    clip_flags: ClipFlags,
    postprocess: PostprocessFlags,
) -> bool {
    !postprocess.is_empty() || need_undistortion_postprocess(user, clip_flags)
}

/// Zero disabled color channels and optionally collapse to luma.
///
/// Gray is renormalized by the weights of the channels still enabled so a
/// single remaining channel keeps its brightness. Buffers with fewer than
/// three channels are left alone.
pub fn disable_channels(buffer: &mut Buffer, flags: PostprocessFlags) {
    let disable = [
        flags.contains(PostprocessFlags::DISABLE_RED),
        flags.contains(PostprocessFlags::DISABLE_GREEN),
        flags.contains(PostprocessFlags::DISABLE_BLUE),
    ];
    let grayscale = flags.contains(PostprocessFlags::PREVIEW_GRAYSCALE);
    if !grayscale && !disable.iter().any(|d| *d) {
        return;
    }
    let n = buffer.channels();
    if n < 3 {
        return;
    }
    let scale: f32 = LUMA_WEIGHTS
        .iter()
        .zip(disable)
        .filter(|(_, off)| !off)
        .map(|(w, _)| w)
        .sum();

    let Some(samples) = buffer.samples_mut() else {
        return;
    };
    for px in samples.chunks_exact_mut(n) {
        for (c, off) in disable.iter().enumerate() {
            if *off {
                px[c] = 0.0;
            }
        }
        if grayscale {
            let luma: f32 = px[..3].iter().zip(LUMA_WEIGHTS).map(|(v, w)| v * w).sum();
            let gray = if scale > 0.0 { luma / scale } else { 0.0 };
            px[..3].fill(gray);
        }
    }
}

/// Undistort when requested, otherwise copy, then mask channels.
pub fn postprocess_frame(
    buffer: &Buffer,
    camera: Option<&CameraIntrinsics>,
    flags: PostprocessFlags,
) -> Buffer {
    let mut out = match camera {
        Some(camera) => undistort(buffer, camera),
        None => buffer.duplicate(),
    };
    if !flags.is_empty() {
        disable_channels(&mut out, flags);
    }
    out
}

/// Camera values an undistorted frame depends on.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DistortionSnapshot {
    principal: Vec2,
    model: DistortionModel,
    polynomial_k: [f32; 3],
    division_k: [f32; 2],
}

impl DistortionSnapshot {
    pub(crate) fn of(camera: &CameraIntrinsics) -> Self {
        Self {
            principal: camera.principal,
            model: camera.distortion_model,
            polynomial_k: camera.polynomial_k,
            division_k: camera.division_k,
        }
    }
}

/// Request parameters a slot was filled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotRequest {
    /// Cache frame, so edits to the frame mapping miss.
    pub frame: i32,
    pub proxy: ProxySize,
    pub render_flags: RenderFlags,
    pub postprocess: PostprocessFlags,
}

pub(crate) struct PostprocessedSlot {
    pub buffer: Buffer,
    pub request: SlotRequest,
    /// Camera snapshot when undistortion ran.
    pub distortion: Option<DistortionSnapshot>,
}

impl PostprocessedSlot {
    /// Whether the slot can serve `request`. `camera` is present when the
    /// request needs undistortion.
    pub(crate) fn matches(&self, request: &SlotRequest, camera: Option<&CameraIntrinsics>) -> bool {
        if self.request != *request {
            return false;
        }
        match (camera, &self.distortion) {
            (Some(camera), Some(snapshot)) => *snapshot == DistortionSnapshot::of(camera),
            (Some(_), None) => false,
            (None, used) => used.is_none(),
        }
    }
}

pub(crate) struct StabilizedSlot {
    pub buffer: Buffer,
    pub request: SlotRequest,
    /// Upstream frame the warp read from.
    pub reference: BufferIdentity,
    pub data: StabilizationData,
    pub aspect: f32,
    pub filter: FilterKind,
}

impl StabilizedSlot {
    /// Cheap checks, everything except the recomputed transform.
    pub(crate) fn matches(
        &self,
        request: &SlotRequest,
        reference: &Buffer,
        aspect: f32,
        filter: FilterKind,
    ) -> bool {
        self.request.frame == request.frame
            && self.reference.is(reference)
            && self.request.proxy == request.proxy
            && self.request.render_flags == request.render_flags
            && self.request.postprocess == request.postprocess
            && self.aspect == aspect
            && self.filter == filter
    }
}
