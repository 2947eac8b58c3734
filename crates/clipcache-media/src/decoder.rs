//! Frame decoders feeding the clip cache.

use crate::sequence::{probe_sequence_length, SequencePattern};
use clipcache_core::{Buffer, ChannelLayout, ClipCacheError, Result};
use image::ImageError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolution tier of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProxySize {
    /// Original footage, no proxy
    #[default]
    None,
    P25,
    P50,
    P75,
    P100,
}

impl ProxySize {
    /// Size relative to the original footage.
    pub fn scale(self) -> f32 {
        match self {
            Self::None | Self::P100 => 1.0,
            Self::P25 => 0.25,
            Self::P50 => 0.5,
            Self::P75 => 0.75,
        }
    }

    /// Percentage used in proxy directory names.
    pub fn percent(self) -> Option<u32> {
        match self {
            Self::None => None,
            Self::P25 => Some(25),
            Self::P50 => Some(50),
            Self::P75 => Some(75),
            Self::P100 => Some(100),
        }
    }
}

/// What a decoder is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodeRequest {
    /// Frame number in the source's own numbering.
    pub frame: i32,
    pub proxy: ProxySize,
    /// Read the pre-undistorted proxy variant.
    pub undistorted: bool,
}

impl DecodeRequest {
    pub fn new(frame: i32) -> Self {
        Self {
            frame,
            proxy: ProxySize::None,
            undistorted: false,
        }
    }
}

/// Source of decoded frames.
///
/// Decoders are not expected to be reentrant: the clip cache serializes all
/// calls into one decoder.
pub trait FrameDecoder: Send {
    /// Decode one frame into an RGBA buffer.
    fn decode_frame(&mut self, request: &DecodeRequest) -> Result<Buffer>;

    /// Drop any open handles, the next decode starts fresh.
    fn reset(&mut self) {}

    /// Number of frames available, when known.
    fn frame_count(&mut self) -> Option<usize> {
        None
    }
}

/// Decoder for numbered image files on disk.
pub struct ImageSequenceDecoder {
    pattern: SequencePattern,
    proxy_dir: Option<PathBuf>,
    frame_count: Option<usize>,
}

impl ImageSequenceDecoder {
    /// Open a sequence from the path of its first file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ClipCacheError::NotFound(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let pattern = SequencePattern::parse(path);
        info!(
            "Opening image sequence: {} (still: {})",
            path.display(),
            pattern.is_still()
        );
        Ok(Self {
            pattern,
            proxy_dir: None,
            frame_count: None,
        })
    }

    /// Directory holding `proxy_<percent>` sub-directories.
    pub fn with_proxy_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.proxy_dir = Some(dir.into());
        self
    }

    pub fn pattern(&self) -> &SequencePattern {
        &self.pattern
    }

    /// File that holds the requested frame.
    pub fn frame_path(&self, request: &DecodeRequest) -> Result<PathBuf> {
        let Some(percent) = request.proxy.percent() else {
            return Ok(self.pattern.frame_path(request.frame));
        };
        let dir = self.proxy_dir.as_ref().ok_or_else(|| {
            ClipCacheError::NotFound(format!("no proxy directory for {percent}% proxy"))
        })?;
        let suffix = if request.undistorted { "_undistorted" } else { "" };
        Ok(dir
            .join(format!("proxy_{percent}{suffix}"))
            .join(format!("{:08}.jpg", request.frame)))
    }
}

impl FrameDecoder for ImageSequenceDecoder {
    fn decode_frame(&mut self, request: &DecodeRequest) -> Result<Buffer> {
        let path = self.frame_path(request)?;
        if !path.exists() {
            return Err(ClipCacheError::NotFound(format!(
                "Frame file not found: {}",
                path.display()
            )));
        }

        let image = image::open(&path)
            .map_err(|e| image_error(&path, e))?
            .to_rgba32f();
        let (width, height) = image.dimensions();
        debug!(frame = request.frame, width, height, "decoded {}", path.display());
        Buffer::from_samples(width, height, ChannelLayout::Rgba, image.into_raw())
    }

    fn reset(&mut self) {
        self.frame_count = None;
    }

    fn frame_count(&mut self) -> Option<usize> {
        if self.frame_count.is_none() {
            self.frame_count = Some(probe_sequence_length(&self.pattern));
        }
        self.frame_count
    }
}

fn image_error(path: &Path, err: ImageError) -> ClipCacheError {
    match err {
        ImageError::IoError(e) => ClipCacheError::Io(e),
        ImageError::Unsupported(e) => {
            ClipCacheError::UnsupportedFormat(format!("{}: {e}", path.display()))
        }
        ImageError::Decoding(e) => ClipCacheError::Decoder(format!("{}: {e}", path.display())),
        other => ClipCacheError::Image(format!("{}: {other}", path.display())),
    }
}
