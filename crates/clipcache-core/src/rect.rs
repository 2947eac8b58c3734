//! Integer rectangles used for display crops and buffer regions.

use serde::{Deserialize, Serialize};

/// Pixel-space rectangle with inclusive minimum and exclusive maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CropRect {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

impl CropRect {
    /// Create a new rectangle from its corners.
    #[inline]
    pub const fn new(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Rectangle covering a full `width` x `height` image.
    #[inline]
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    #[inline]
    pub fn width(self) -> i32 {
        (self.xmax - self.xmin).max(0)
    }

    #[inline]
    pub fn height(self) -> i32 {
        (self.ymax - self.ymin).max(0)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Check if a pixel lies inside the rectangle.
    #[inline]
    pub fn contains(self, x: i32, y: i32) -> bool {
        x >= self.xmin && x < self.xmax && y >= self.ymin && y < self.ymax
    }

    /// Compute intersection with another rectangle.
    pub fn intersection(self, other: Self) -> Option<Self> {
        let rect = Self::new(
            self.xmin.max(other.xmin),
            self.ymin.max(other.ymin),
            self.xmax.min(other.xmax),
            self.ymax.min(other.ymax),
        );
        if rect.is_empty() {
            None
        } else {
            Some(rect)
        }
    }

    /// Clamp the rectangle to the bounds of a `width` x `height` image.
    pub fn clamp_to(self, width: u32, height: u32) -> Option<Self> {
        self.intersection(Self::full(width, height))
    }
}
