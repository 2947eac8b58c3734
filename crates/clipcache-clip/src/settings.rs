//! Clip settings and request descriptions.

use crate::flags::{ClipFlags, RenderFlags, RenderSize};
use clipcache_cache::FrameIndexed;
use clipcache_media::{ProxySize, SequencePattern};
use clipcache_tracking::{CameraIntrinsics, StabilizationSettings, Track};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClipSource {
    /// Numbered image files, or a single still image.
    #[default]
    Sequence,
    /// Container file, frames numbered from 1.
    Movie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipSettings {
    pub name: String,
    pub source: ClipSource,
    /// First file of the sequence, or the movie file.
    pub path: PathBuf,
    pub flags: ClipFlags,
    /// Scene frame at which the clip starts.
    pub start_frame: i32,
    /// Clip frames skipped at the start.
    pub frame_offset: i32,
    pub camera: CameraIntrinsics,
    pub stabilization: StabilizationSettings,
    pub tracks: Vec<Track>,
}

impl Default for ClipSettings {
    fn default() -> Self {
        Self {
            name: "Clip".to_string(),
            source: ClipSource::Sequence,
            path: PathBuf::new(),
            flags: ClipFlags::empty(),
            start_frame: 1,
            frame_offset: 0,
            camera: CameraIntrinsics::default(),
            stabilization: StabilizationSettings::default(),
            tracks: Vec::new(),
        }
    }
}

impl ClipSettings {
    /// Clip frame (1-based) shown at `scene_frame`.
    pub fn scene_to_clip_frame(&self, scene_frame: i32) -> i32 {
        scene_frame - self.start_frame + 1 + self.frame_offset
    }

    pub(crate) fn frame_base(&self) -> FrameBase {
        match self.source {
            ClipSource::Movie => FrameBase::Offset(0),
            ClipSource::Sequence => {
                let pattern = SequencePattern::parse(&self.path);
                match pattern.first_frame() {
                    Some(first) => FrameBase::Offset(first - 1),
                    None => FrameBase::Still,
                }
            }
        }
    }
}

/// How clip frames map onto source frame numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameBase {
    /// Every frame is the same image.
    Still,
    /// Number of the first file minus one.
    Offset(i32),
}

impl FrameBase {
    pub(crate) fn cache_frame(self, clip_frame: i32) -> i32 {
        match self {
            Self::Still => 0,
            Self::Offset(offset) => clip_frame + offset,
        }
    }
}

/// One consumer's view of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClipUser {
    /// Scene frame.
    pub frame: i32,
    pub render_size: RenderSize,
    pub render_flags: RenderFlags,
}

impl ClipUser {
    pub fn at(frame: i32) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    pub fn with_render_size(mut self, render_size: RenderSize) -> Self {
        self.render_size = render_size;
        self
    }

    pub fn with_render_flags(mut self, render_flags: RenderFlags) -> Self {
        self.render_flags = render_flags;
        self
    }

    /// Proxy tier and render flags this user reads with.
    pub(crate) fn variant(&self, clip_flags: ClipFlags) -> (ProxySize, RenderFlags) {
        if clip_flags.contains(ClipFlags::USE_PROXY) {
            (self.render_size.proxy(), self.render_flags)
        } else {
            (ProxySize::None, RenderFlags::empty())
        }
    }
}

/// Raw frame cache key.
///
/// Hashes only the frame so that all variants of one frame land in the
/// same bucket; equality compares every field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovieCacheKey {
    pub frame: i32,
    pub proxy: ProxySize,
    pub render_flags: RenderFlags,
}

impl Hash for MovieCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.frame.hash(state);
    }
}

impl FrameIndexed for MovieCacheKey {
    fn frame(&self) -> i32 {
        self.frame
    }
}

impl MovieCacheKey {
    /// Plain full resolution frame, not a proxy variant.
    pub fn is_original(&self) -> bool {
        self.proxy == ProxySize::None && self.render_flags.is_empty()
    }
}
