//! Conversion between channel layouts.
//!
//! Coercion never rewrites the source buffer. When the layout already matches
//! the caller gets the same handle back, otherwise a new buffer is filled with
//! the fixed per-pair rules in [`convert_pixel`].

use crate::buffer::{Buffer, ChannelLayout};
use std::borrow::Cow;

/// Luma-like weights used when collapsing color to a single value.
pub const VALUE_WEIGHTS: [f32; 3] = [0.35, 0.45, 0.20];

/// Convert one sample tuple between layouts.
///
/// `src.len()` and `dst.len()` are the channel counts of the two layouts.
pub fn convert_pixel(src: &[f32], dst: &mut [f32]) {
    match (dst.len(), src.len()) {
        (d, s) if d == s => dst.copy_from_slice(src),
        (_, 0) => dst.fill(0.0),
        (1, 2) => dst[0] = (src[0] + src[1]) * 0.5,
        (1, _) => {
            dst[0] = VALUE_WEIGHTS[0] * src[0] + VALUE_WEIGHTS[1] * src[1] + VALUE_WEIGHTS[2] * src[2];
        }
        (_, 1) => dst.fill(src[0]),
        (2, _) => dst.copy_from_slice(&src[..2]),
        (3, 2) => {
            dst[0] = src[0];
            dst[1] = src[1];
            dst[2] = 0.0;
        }
        (3, 4) => dst.copy_from_slice(&src[..3]),
        (4, 2) => {
            dst[0] = src[0];
            dst[1] = src[1];
            dst[2] = 0.0;
            dst[3] = 1.0;
        }
        (4, 3) => {
            dst[..3].copy_from_slice(src);
            dst[3] = 1.0;
        }
        _ => dst.fill(0.0),
    }
}

impl Buffer {
    /// Return this buffer in `layout`.
    ///
    /// Borrows `self` when nothing needs converting, which includes procedural
    /// buffers: their generator decides what it produces.
    pub fn coerce(&self, layout: ChannelLayout) -> Cow<'_, Buffer> {
        if self.layout() == layout || self.is_procedural() {
            return Cow::Borrowed(self);
        }

        let mut out = Buffer::allocate(self.width(), self.height(), layout, false);
        let src_n = self.channels();
        let dst_n = layout.channels();
        if let (Some(src), Some(dst)) = (self.samples(), out.samples_mut()) {
            for (s, d) in src.chunks_exact(src_n).zip(dst.chunks_exact_mut(dst_n)) {
                convert_pixel(s, d);
            }
        }
        let (x, y) = self.offset();
        out.set_offset(x, y);
        out.set_crop_rect(self.crop_rect());
        Cow::Owned(out)
    }
}
