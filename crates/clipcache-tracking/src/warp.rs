//! Inverse-mapped image warping with selectable reconstruction filter.

use clipcache_core::Buffer;
use glam::Vec2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Reconstruction filter used when sampling between pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterKind {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
}

/// Warp `buffer` by mapping every output pixel center to a source position.
///
/// `map` receives output pixel-space coordinates (pixel centers at `i + 0.5`)
/// and returns the source position to read. Samples outside the source are
/// transparent zeros.
pub fn warp<F>(buffer: &Buffer, filter: FilterKind, map: F) -> Buffer
where
    F: Fn(Vec2) -> Vec2 + Sync,
{
    let source = buffer.materialize();
    let width = buffer.width();
    let height = buffer.height();
    let n = buffer.channels();
    let mut out = Buffer::allocate(width, height, buffer.layout(), false);
    let (xof, yof) = buffer.offset();
    out.set_offset(xof, yof);
    out.set_crop_rect(buffer.crop_rect());

    let (Some(src), Some(dst)) = (source.samples(), out.samples_mut()) else {
        return out;
    };
    if width == 0 || height == 0 {
        return out;
    }
    let image = Image {
        samples: src,
        width: width as i32,
        height: height as i32,
        channels: n,
    };

    dst.par_chunks_mut(width as usize * n)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(n).enumerate() {
                let pos = map(Vec2::new(x as f32 + 0.5, y as f32 + 0.5));
                image.sample(pos, filter, px);
            }
        });
    out
}

struct Image<'a> {
    samples: &'a [f32],
    width: i32,
    height: i32,
    channels: usize,
}

impl Image<'_> {
    #[inline]
    fn texel(&self, x: i32, y: i32) -> Option<&[f32]> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * self.channels;
        Some(&self.samples[start..start + self.channels])
    }

    fn accumulate(&self, x: i32, y: i32, weight: f32, out: &mut [f32]) {
        if let Some(texel) = self.texel(x, y) {
            for (o, t) in out.iter_mut().zip(texel) {
                *o += t * weight;
            }
        }
    }

    fn sample(&self, pos: Vec2, filter: FilterKind, out: &mut [f32]) {
        out.fill(0.0);
        if !pos.is_finite() {
            return;
        }
        match filter {
            FilterKind::Nearest => {
                if let Some(texel) = self.texel(pos.x.floor() as i32, pos.y.floor() as i32) {
                    out.copy_from_slice(texel);
                }
            }
            FilterKind::Bilinear => {
                let p = pos - Vec2::splat(0.5);
                let x0 = p.x.floor();
                let y0 = p.y.floor();
                let fx = p.x - x0;
                let fy = p.y - y0;
                let (x0, y0) = (x0 as i32, y0 as i32);
                self.accumulate(x0, y0, (1.0 - fx) * (1.0 - fy), out);
                self.accumulate(x0 + 1, y0, fx * (1.0 - fy), out);
                self.accumulate(x0, y0 + 1, (1.0 - fx) * fy, out);
                self.accumulate(x0 + 1, y0 + 1, fx * fy, out);
            }
            FilterKind::Bicubic => {
                let p = pos - Vec2::splat(0.5);
                let x0 = p.x.floor();
                let y0 = p.y.floor();
                let wx = catmull_rom_weights(p.x - x0);
                let wy = catmull_rom_weights(p.y - y0);
                let (x0, y0) = (x0 as i32, y0 as i32);
                for (j, wyj) in wy.iter().enumerate() {
                    for (i, wxi) in wx.iter().enumerate() {
                        self.accumulate(x0 + i as i32 - 1, y0 + j as i32 - 1, wxi * wyj, out);
                    }
                }
            }
        }
    }
}

fn catmull_rom_weights(t: f32) -> [f32; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        0.5 * (-t3 + 2.0 * t2 - t),
        0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
        0.5 * (-3.0 * t3 + 4.0 * t2 + t),
        0.5 * (t3 - t2),
    ]
}
