//! ClipCache Clip - movie clip frame caching
//!
//! This crate provides:
//! - [`MovieClip`], frame access through a raw frame cache plus
//!   postprocessed and stabilized single-frame slots
//! - Clip settings, request descriptions and cache keys
//! - [`ImageCache`], the buffer cache behind image datablocks

pub mod clip;
pub mod flags;
pub mod image;
pub mod postprocess;
pub mod settings;

pub use clip::{CachePolicy, MovieClip, StableFrame};
pub use flags::{ClipFlags, PostprocessFlags, RenderFlags, RenderSize};
pub use image::{ImageCache, ImageKey};
pub use postprocess::{
    disable_channels, need_postprocessed_frame, need_undistortion_postprocess, postprocess_frame,
};
pub use settings::{ClipSettings, ClipSource, ClipUser, MovieCacheKey};
