//! 2D stabilization from tracked markers.
//!
//! Markers are stored in normalized frame coordinates (0..1 on both axes).
//! Tracks flagged for location define a pivot, the mean marker position, and
//! the correction moves the pivot of each frame back onto the pivot of the
//! anchor frame. Tracks flagged for rotation additionally measure how the
//! constellation turned and scaled around that pivot.

use crate::error::TrackingError;
use crate::warp::{warp, FilterKind};
use clipcache_core::Buffer;
use glam::{Affine2, Mat2, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f32::consts::{PI, TAU};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizationSettings {
    pub enabled: bool,
    /// Frame whose marker layout is held still.
    pub anchor_frame: i32,
    pub use_rotation: bool,
    pub use_scale: bool,
    pub influence_location: f32,
    pub influence_rotation: f32,
    pub influence_scale: f32,
    /// Extra translation in pixels.
    pub target_position: Vec2,
    /// Extra rotation in radians.
    pub target_rotation: f32,
    pub target_scale: f32,
    pub filter: FilterKind,
}

impl Default for StabilizationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            anchor_frame: 1,
            use_rotation: false,
            use_scale: false,
            influence_location: 1.0,
            influence_rotation: 1.0,
            influence_scale: 1.0,
            target_position: Vec2::ZERO,
            target_rotation: 0.0,
            target_scale: 1.0,
            filter: FilterKind::Bilinear,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub markers: BTreeMap<i32, Vec2>,
    pub use_for_location: bool,
    pub use_for_rotation: bool,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            markers: BTreeMap::new(),
            use_for_location: true,
            use_for_rotation: false,
        }
    }

    pub fn add_marker(&mut self, frame: i32, position: Vec2) -> Result<(), TrackingError> {
        if !position.is_finite() {
            return Err(TrackingError::InvalidMarker {
                frame,
                reason: format!("non-finite position {position:?}"),
            });
        }
        self.markers.insert(frame, position);
        Ok(())
    }

    /// Marker position at `frame`, interpolated between neighbouring markers.
    /// `None` outside the tracked range.
    pub fn position_at(&self, frame: i32) -> Option<Vec2> {
        if let Some(p) = self.markers.get(&frame) {
            return Some(*p);
        }
        let (f0, p0) = self.markers.range(..frame).next_back()?;
        let (f1, p1) = self.markers.range(frame..).next()?;
        let t = (frame - f0) as f32 / (f1 - f0) as f32;
        Some(p0.lerp(*p1, t))
    }
}

/// Correction applied to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilizationData {
    /// Pixels.
    pub translation: Vec2,
    pub scale: f32,
    /// Radians.
    pub angle: f32,
}

impl Default for StabilizationData {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl StabilizationData {
    pub const IDENTITY: Self = Self {
        translation: Vec2::ZERO,
        scale: 1.0,
        angle: 0.0,
    };

    /// Rotation and scale about the frame center, in aspect-corrected space.
    fn linear(&self, aspect: f32) -> Mat2 {
        let stretch = Vec2::new(aspect, 1.0);
        Mat2::from_diagonal(stretch.recip())
            * Mat2::from_angle(self.angle)
            * Mat2::from_diagonal(Vec2::splat(self.scale))
            * Mat2::from_diagonal(stretch)
    }

    /// Transform from source pixel positions to stabilized pixel positions.
    pub fn to_affine(&self, width: u32, height: u32, aspect: f32) -> Affine2 {
        let center = Vec2::new(width as f32, height as f32) * 0.5;
        let m = self.linear(aspect);
        Affine2::from_mat2_translation(m, center + self.translation - m * center)
    }
}

fn wrap_angle(a: f32) -> f32 {
    (a + PI).rem_euclid(TAU) - PI
}

/// Correction that holds the anchor frame's marker layout still at `frame`.
pub fn compute_stabilization(
    settings: &StabilizationSettings,
    tracks: &[Track],
    frame: i32,
    width: u32,
    height: u32,
    aspect: f32,
) -> StabilizationData {
    if !settings.enabled {
        return StabilizationData::IDENTITY;
    }
    let size = Vec2::new(width as f32, height as f32);
    let center = size * 0.5;
    let stretch = Vec2::new(aspect, 1.0);

    let mut data = StabilizationData {
        translation: settings.target_position,
        scale: settings.target_scale,
        angle: settings.target_rotation,
    };

    let located: Vec<(Vec2, Vec2)> = tracks
        .iter()
        .filter(|t| t.use_for_location)
        .filter_map(|t| {
            let current = t.position_at(frame)?;
            let anchor = t.position_at(settings.anchor_frame)?;
            Some((current * size, anchor * size))
        })
        .collect();
    if located.is_empty() {
        return data;
    }
    let count = located.len() as f32;
    let pivot = located.iter().fold(Vec2::ZERO, |acc, (c, _)| acc + *c) / count;
    let anchor_pivot = located.iter().fold(Vec2::ZERO, |acc, (_, a)| acc + *a) / count;

    if settings.use_rotation || settings.use_scale {
        let mut angle_sum = 0.0;
        let mut scale_sum = 0.0;
        let mut samples = 0;
        for track in tracks.iter().filter(|t| t.use_for_rotation) {
            let (Some(current), Some(anchor)) = (
                track.position_at(frame),
                track.position_at(settings.anchor_frame),
            ) else {
                continue;
            };
            let cur = (current * size - pivot) * stretch;
            let anc = (anchor * size - anchor_pivot) * stretch;
            if cur.length_squared() < 1e-6 || anc.length_squared() < 1e-6 {
                continue;
            }
            angle_sum += wrap_angle(anc.y.atan2(anc.x) - cur.y.atan2(cur.x));
            scale_sum += anc.length() / cur.length();
            samples += 1;
        }
        if samples > 0 {
            let n = samples as f32;
            if settings.use_rotation {
                data.angle += angle_sum / n * settings.influence_rotation;
            }
            if settings.use_scale {
                data.scale *= 1.0 + (scale_sum / n - 1.0) * settings.influence_scale;
            }
        }
    }

    // Move the current pivot onto the anchor pivot once rotation and scale
    // about the frame center are applied.
    let m = data.linear(aspect);
    let correction = anchor_pivot - center - m * (pivot - center);
    data.translation += correction * settings.influence_location;
    data
}

/// Warp a frame by a stabilization correction. Uncovered areas are transparent.
pub fn apply_stabilization(
    buffer: &Buffer,
    data: &StabilizationData,
    aspect: f32,
    filter: FilterKind,
) -> Buffer {
    let inverse = data
        .to_affine(buffer.width(), buffer.height(), aspect)
        .inverse();
    warp(buffer, filter, |p| inverse.transform_point2(p))
}
