//! Pixel buffers for compositing and frame caching.
//!
//! A [`Buffer`] is a logical view (size, channel layout, offset, crop) over
//! sample storage that can be shared between many views. Cloning a buffer is
//! the "pass-on" operation: the new handle aliases the same samples and no
//! allocation happens. Samples are freed once the last handle is released.
//!
//! Writes go through [`Buffer::samples_mut`], which detaches shared storage
//! before handing out a mutable slice, so a published buffer is never changed
//! behind the back of another handle.

use crate::error::{ClipCacheError, Result};
use crate::rect::CropRect;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::fmt;
use std::sync::{Arc, Weak};

/// One sample tuple, up to four channels without heap allocation.
pub type Pixel = SmallVec<[f32; 4]>;

/// Generator for procedural buffers.
///
/// Receives coordinates normalized by the buffer half extents and writes one
/// sample tuple of the buffer's channel count.
pub type PixelGenerator = Arc<dyn Fn(f32, f32, &mut [f32]) + Send + Sync>;

/// Channel layout of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChannelLayout {
    /// Single value
    Value,
    /// Two-component vector
    Vector2,
    /// Three-component vector or RGB
    Vector3,
    /// RGBA color
    #[default]
    Rgba,
}

impl ChannelLayout {
    /// Number of samples per pixel.
    #[inline]
    pub const fn channels(self) -> usize {
        match self {
            Self::Value => 1,
            Self::Vector2 => 2,
            Self::Vector3 => 3,
            Self::Rgba => 4,
        }
    }

    /// Layout for a channel count, if one exists.
    pub const fn from_channels(channels: usize) -> Option<Self> {
        match channels {
            1 => Some(Self::Value),
            2 => Some(Self::Vector2),
            3 => Some(Self::Vector3),
            4 => Some(Self::Rgba),
            _ => None,
        }
    }
}

#[derive(Clone)]
enum Storage {
    Samples(Arc<Vec<f32>>),
    Procedural(PixelGenerator),
}

/// A typed 2D pixel buffer.
#[derive(Clone)]
pub struct Buffer {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    storage: Storage,
    offset: (i32, i32),
    crop: Option<CropRect>,
}

fn sample_count(width: u32, height: u32, layout: ChannelLayout) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(layout.channels())
}

impl Buffer {
    /// Allocate a new buffer that owns its samples.
    ///
    /// Allocation failure is fatal: callers rely on getting a complete buffer
    /// back. Use [`Buffer::try_allocate`] to handle it instead.
    pub fn allocate(width: u32, height: u32, layout: ChannelLayout, fill_zero: bool) -> Self {
        match Self::try_allocate(width, height, layout, fill_zero) {
            Ok(buffer) => buffer,
            Err(err) => panic!("buffer allocation failed: {err}"),
        }
    }

    /// Allocate a new buffer, reporting failure instead of aborting.
    ///
    /// Samples are always initialized; `fill_zero` states that the caller
    /// relies on them being zero.
    pub fn try_allocate(
        width: u32,
        height: u32,
        layout: ChannelLayout,
        fill_zero: bool,
    ) -> Result<Self> {
        let len = sample_count(width, height, layout).ok_or_else(|| {
            ClipCacheError::OutOfMemory(format!(
                "{width}x{height}x{} samples overflow",
                layout.channels()
            ))
        })?;

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            ClipCacheError::OutOfMemory(format!("{width}x{height} buffer: {e}"))
        })?;
        data.resize(len, 0.0);
        debug_assert!(!fill_zero || data.iter().all(|v| *v == 0.0));

        Ok(Self::with_storage(
            width,
            height,
            layout,
            Storage::Samples(Arc::new(data)),
        ))
    }

    /// Wrap existing samples in a new buffer.
    pub fn from_samples(
        width: u32,
        height: u32,
        layout: ChannelLayout,
        samples: Vec<f32>,
    ) -> Result<Self> {
        let expected = sample_count(width, height, layout).ok_or_else(|| {
            ClipCacheError::InvalidParameter(format!("{width}x{height} buffer is too large"))
        })?;
        if samples.len() != expected {
            return Err(ClipCacheError::InvalidParameter(format!(
                "expected {expected} samples for {width}x{height}x{}, got {}",
                layout.channels(),
                samples.len()
            )));
        }
        Ok(Self::with_storage(
            width,
            height,
            layout,
            Storage::Samples(Arc::new(samples)),
        ))
    }

    /// Create a buffer whose samples are computed on demand.
    pub fn procedural<F>(width: u32, height: u32, layout: ChannelLayout, generator: F) -> Self
    where
        F: Fn(f32, f32, &mut [f32]) + Send + Sync + 'static,
    {
        Self::with_storage(
            width,
            height,
            layout,
            Storage::Procedural(Arc::new(generator)),
        )
    }

    /// Create a buffer filled with one constant sample tuple.
    pub fn filled(width: u32, height: u32, layout: ChannelLayout, value: &[f32]) -> Self {
        let mut buffer = Self::allocate(width, height, layout, false);
        let n = layout.channels();
        if let Some(samples) = buffer.samples_mut() {
            for px in samples.chunks_exact_mut(n) {
                for (c, v) in px.iter_mut().enumerate() {
                    *v = value.get(c).copied().unwrap_or(0.0);
                }
            }
        }
        buffer
    }

    fn with_storage(width: u32, height: u32, layout: ChannelLayout, storage: Storage) -> Self {
        Self {
            width,
            height,
            layout,
            storage,
            offset: (0, 0),
            crop: None,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Number of samples per pixel.
    #[inline]
    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    #[inline]
    pub fn is_procedural(&self) -> bool {
        matches!(self.storage, Storage::Procedural(_))
    }

    /// Translation applied when sampling.
    #[inline]
    pub fn offset(&self) -> (i32, i32) {
        self.offset
    }

    pub fn set_offset(&mut self, x: i32, y: i32) {
        self.offset = (x, y);
    }

    /// Move the buffer without touching its samples.
    pub fn translate(&mut self, dx: i32, dy: i32) {
        self.offset.0 += dx;
        self.offset.1 += dy;
    }

    /// Display crop rectangle, if any.
    #[inline]
    pub fn crop_rect(&self) -> Option<CropRect> {
        self.crop
    }

    pub fn set_crop_rect(&mut self, crop: Option<CropRect>) {
        self.crop = crop;
    }

    /// Read-only view of the samples. `None` for procedural buffers.
    pub fn samples(&self) -> Option<&[f32]> {
        match &self.storage {
            Storage::Samples(data) => Some(data.as_slice()),
            Storage::Procedural(_) => None,
        }
    }

    /// Mutable view of the samples.
    ///
    /// If the samples are shared with other handles they are copied first.
    pub fn samples_mut(&mut self) -> Option<&mut [f32]> {
        match &mut self.storage {
            Storage::Samples(data) => Some(Arc::make_mut(data).as_mut_slice()),
            Storage::Procedural(_) => None,
        }
    }

    /// Samples of the pixel at absolute position `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[f32]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let n = self.channels();
        let start = (y as usize * self.width as usize + x as usize) * n;
        self.samples().map(|s| &s[start..start + n])
    }

    /// Mutable samples of the pixel at absolute position `(x, y)`.
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> Option<&mut [f32]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let n = self.channels();
        let start = (y as usize * self.width as usize + x as usize) * n;
        self.samples_mut().map(|s| &mut s[start..start + n])
    }

    /// New handle aliasing this buffer's samples. No allocation.
    pub fn pass_on(&self) -> Self {
        self.clone()
    }

    /// Deep copy into a newly owned allocation.
    ///
    /// Offset and crop are copied verbatim. Procedural buffers share their
    /// generator, there is nothing to copy.
    pub fn duplicate(&self) -> Self {
        let storage = match &self.storage {
            Storage::Samples(data) => Storage::Samples(Arc::new(data.as_ref().clone())),
            Storage::Procedural(generator) => Storage::Procedural(Arc::clone(generator)),
        };
        Self {
            storage,
            ..self.clone()
        }
    }

    /// Release this handle. The samples are freed with the last handle.
    pub fn release(self) {
        drop(self);
    }

    /// Number of handles currently keeping the storage alive.
    pub fn owner_count(&self) -> usize {
        match &self.storage {
            Storage::Samples(data) => Arc::strong_count(data),
            Storage::Procedural(generator) => Arc::strong_count(generator),
        }
    }

    /// Whether two handles alias the same storage.
    pub fn shares_storage(&self, other: &Self) -> bool {
        match (&self.storage, &other.storage) {
            (Storage::Samples(a), Storage::Samples(b)) => Arc::ptr_eq(a, b),
            (Storage::Procedural(a), Storage::Procedural(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }

    /// Weak identity of the storage, used to detect a changed upstream buffer.
    pub fn identity(&self) -> BufferIdentity {
        match &self.storage {
            Storage::Samples(data) => BufferIdentity::Samples(Arc::downgrade(data)),
            Storage::Procedural(generator) => BufferIdentity::Procedural(Arc::downgrade(generator)),
        }
    }

    /// Approximate memory footprint in bytes.
    pub fn memory_size(&self) -> usize {
        let samples = match &self.storage {
            Storage::Samples(data) => data.len() * std::mem::size_of::<f32>(),
            Storage::Procedural(_) => 0,
        };
        samples + std::mem::size_of::<Self>()
    }

    /// Sample at center-relative coordinates.
    ///
    /// `(0, 0)` is the buffer center shifted by the offset. Coordinates outside
    /// the buffer yield zeros. Procedural buffers evaluate their generator with
    /// coordinates normalized by the half extents.
    pub fn sample(&self, x: i32, y: i32) -> Pixel {
        let n = self.channels();
        let xrad = (self.width / 2) as i32;
        let yrad = (self.height / 2) as i32;

        match &self.storage {
            Storage::Procedural(generator) => {
                let mut px: Pixel = smallvec![0.0; n];
                generator(
                    x as f32 / xrad.max(1) as f32,
                    y as f32 / yrad.max(1) as f32,
                    &mut px,
                );
                px
            }
            Storage::Samples(data) => {
                let lx = x - self.offset.0 + xrad;
                let ly = y - self.offset.1 + yrad;
                if lx < 0 || ly < 0 || lx >= self.width as i32 || ly >= self.height as i32 {
                    return smallvec![0.0; n];
                }
                let start = (ly as usize * self.width as usize + lx as usize) * n;
                Pixel::from_slice(&data[start..start + n])
            }
        }
    }

    /// Evaluate a procedural buffer into samples.
    ///
    /// Materialized buffers are passed on unchanged.
    pub fn materialize(&self) -> Self {
        if !self.is_procedural() {
            return self.pass_on();
        }
        let mut out = Self::allocate(self.width, self.height, self.layout, false);
        let n = self.channels();
        let xrad = (self.width / 2) as i32;
        let yrad = (self.height / 2) as i32;
        let width = self.width as usize;
        if let Some(samples) = out.samples_mut() {
            for (i, px) in samples.chunks_exact_mut(n).enumerate() {
                let x = (i % width) as i32 - xrad;
                let y = (i / width) as i32 - yrad;
                px.copy_from_slice(&self.sample(x, y));
            }
        }
        out.offset = self.offset;
        out.crop = self.crop;
        out
    }

    /// Copy of the region `rect`, clamped to the buffer.
    pub fn crop(&self, rect: CropRect) -> Result<Self> {
        let rect = rect.clamp_to(self.width, self.height).ok_or_else(|| {
            ClipCacheError::InvalidParameter(format!(
                "crop {rect:?} is outside {}x{}",
                self.width, self.height
            ))
        })?;
        let source = self.materialize();
        let mut out = Self::allocate(rect.width() as u32, rect.height() as u32, self.layout, false);
        let n = self.channels();
        let row_len = rect.width() as usize * n;
        if let (Some(src), Some(dst)) = (source.samples(), out.samples_mut()) {
            for (row, y) in (rect.ymin..rect.ymax).enumerate() {
                let start = (y as usize * self.width as usize + rect.xmin as usize) * n;
                dst[row * row_len..(row + 1) * row_len]
                    .copy_from_slice(&src[start..start + row_len]);
            }
        }
        Ok(out)
    }

    /// Value buffer holding one channel of this buffer.
    pub fn extract_channel(&self, channel: usize) -> Result<Self> {
        let n = self.channels();
        if channel >= n {
            return Err(ClipCacheError::InvalidParameter(format!(
                "channel {channel} out of range for {n}-channel buffer"
            )));
        }
        let source = self.materialize();
        let mut out = Self::allocate(self.width, self.height, ChannelLayout::Value, false);
        if let (Some(src), Some(dst)) = (source.samples(), out.samples_mut()) {
            for (v, px) in dst.iter_mut().zip(src.chunks_exact(n)) {
                *v = px[channel];
            }
        }
        out.offset = self.offset;
        Ok(out)
    }

    /// Nearest-neighbour resample to a new size.
    pub fn scale_fast(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.pass_on();
        }
        let source = self.materialize();
        let mut out = Self::allocate(width, height, self.layout, false);
        let n = self.channels();
        if width == 0 || height == 0 || self.width == 0 || self.height == 0 {
            return out;
        }
        let fx = self.width as f32 / width as f32;
        let fy = self.height as f32 / height as f32;
        if let (Some(src), Some(dst)) = (source.samples(), out.samples_mut()) {
            for y in 0..height as usize {
                let sy = ((y as f32 * fy) as usize).min(self.height as usize - 1);
                for x in 0..width as usize {
                    let sx = ((x as f32 * fx) as usize).min(self.width as usize - 1);
                    let s = (sy * self.width as usize + sx) * n;
                    let d = (y * width as usize + x) * n;
                    dst[d..d + n].copy_from_slice(&src[s..s + n]);
                }
            }
        }
        out
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .field("procedural", &self.is_procedural())
            .field("offset", &self.offset)
            .field("crop", &self.crop)
            .finish()
    }
}

/// Weak reference to a buffer's storage.
///
/// Does not keep the samples alive. Matches a buffer only while the storage
/// it was taken from is still alive and is the same allocation.
#[derive(Clone)]
pub enum BufferIdentity {
    Samples(Weak<Vec<f32>>),
    Procedural(Weak<dyn Fn(f32, f32, &mut [f32]) + Send + Sync>),
}

impl BufferIdentity {
    /// Check whether `buffer` is backed by the referenced storage.
    pub fn is(&self, buffer: &Buffer) -> bool {
        match (self, &buffer.storage) {
            (Self::Samples(weak), Storage::Samples(data)) => {
                weak.strong_count() > 0 && std::ptr::eq(weak.as_ptr(), Arc::as_ptr(data))
            }
            (Self::Procedural(weak), Storage::Procedural(generator)) => {
                weak.strong_count() > 0
                    && weak.as_ptr() as *const () == Arc::as_ptr(generator) as *const ()
            }
            _ => false,
        }
    }

    /// Whether the referenced storage has been freed.
    pub fn is_released(&self) -> bool {
        match self {
            Self::Samples(weak) => weak.strong_count() == 0,
            Self::Procedural(weak) => weak.strong_count() == 0,
        }
    }
}

impl fmt::Debug for BufferIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferIdentity")
            .field("released", &self.is_released())
            .finish()
    }
}

/// Sample `buffer`, or return `constant` when there is no buffer.
///
/// Inputs that carry a single color or value instead of an image use this.
pub fn sample_or(buffer: Option<&Buffer>, constant: &[f32], x: i32, y: i32) -> Pixel {
    match buffer {
        Some(buffer) => buffer.sample(x, y),
        None => Pixel::from_slice(constant),
    }
}
