//! ClipCache Core - Foundation types for the frame cache
//!
//! This crate provides the fundamental types used throughout ClipCache:
//! - Pixel buffers with shared, copy-on-write sample storage
//! - Channel layouts and coercion between them
//! - Per-pixel processing over buffers and constant inputs
//! - Crop rectangles

pub mod buffer;
pub mod coerce;
pub mod error;
pub mod process;
pub mod rect;

pub use buffer::{sample_or, Buffer, BufferIdentity, ChannelLayout, Pixel, PixelGenerator};
pub use error::{ClipCacheError, Result};
pub use process::{process_pixels, ProcessInput};
pub use rect::CropRect;
