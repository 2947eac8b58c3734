//! Camera intrinsics and lens undistortion.

use crate::error::TrackingError;
use crate::warp::{warp, FilterKind};
use clipcache_core::Buffer;
use glam::Vec2;
use serde::{Deserialize, Serialize};

const UNDISTORT_ITERATIONS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DistortionModel {
    #[default]
    Polynomial,
    Division,
}

/// Lens calibration in pixels of the calibration footage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraIntrinsics {
    pub focal: f32,
    pub principal: Vec2,
    pub pixel_aspect: f32,
    /// Width the calibration was solved at, 0 to use buffers as-is.
    pub image_width: u32,
    pub distortion_model: DistortionModel,
    /// k1, k2, k3 of the polynomial model.
    pub polynomial_k: [f32; 3],
    /// k1, k2 of the division model.
    pub division_k: [f32; 2],
}

impl Default for CameraIntrinsics {
    fn default() -> Self {
        Self {
            focal: 1000.0,
            principal: Vec2::ZERO,
            pixel_aspect: 1.0,
            image_width: 0,
            distortion_model: DistortionModel::Polynomial,
            polynomial_k: [0.0; 3],
            division_k: [0.0; 2],
        }
    }
}

impl CameraIntrinsics {
    pub fn validate(&self) -> Result<(), TrackingError> {
        if !(self.focal.is_finite() && self.focal > 0.0) {
            return Err(TrackingError::InvalidCamera(format!(
                "focal length must be positive, got {}",
                self.focal
            )));
        }
        if !(self.pixel_aspect.is_finite() && self.pixel_aspect > 0.0) {
            return Err(TrackingError::InvalidCamera(format!(
                "pixel aspect must be positive, got {}",
                self.pixel_aspect
            )));
        }
        Ok(())
    }

    /// Whether the active model bends any ray.
    pub fn has_distortion(&self) -> bool {
        match self.distortion_model {
            DistortionModel::Polynomial => self.polynomial_k.iter().any(|k| *k != 0.0),
            DistortionModel::Division => self.division_k.iter().any(|k| *k != 0.0),
        }
    }

    /// Intrinsics for a buffer `width` pixels wide.
    pub fn scaled_to(&self, width: u32) -> Self {
        if self.image_width == 0 || width == self.image_width {
            return self.clone();
        }
        let s = width as f32 / self.image_width as f32;
        Self {
            focal: self.focal * s,
            principal: self.principal * s,
            image_width: width,
            ..self.clone()
        }
    }

    fn normalize(&self, p: Vec2) -> Vec2 {
        let d = p - self.principal;
        Vec2::new(d.x / self.focal, d.y * self.pixel_aspect / self.focal)
    }

    fn denormalize(&self, n: Vec2) -> Vec2 {
        Vec2::new(n.x * self.focal, n.y * self.focal / self.pixel_aspect) + self.principal
    }

    fn distort_normalized(&self, n: Vec2) -> Vec2 {
        let r2 = n.length_squared();
        match self.distortion_model {
            DistortionModel::Polynomial => {
                let [k1, k2, k3] = self.polynomial_k;
                n * (1.0 + r2 * (k1 + r2 * (k2 + r2 * k3)))
            }
            DistortionModel::Division => {
                let [k1, k2] = self.division_k;
                n / (1.0 + r2 * (k1 + r2 * k2))
            }
        }
    }

    /// Map an ideal (undistorted) pixel position to where the lens put it.
    pub fn distort_point(&self, p: Vec2) -> Vec2 {
        self.denormalize(self.distort_normalized(self.normalize(p)))
    }

    /// Inverse of [`distort_point`](Self::distort_point), by fixed-point iteration.
    pub fn undistort_point(&self, p: Vec2) -> Vec2 {
        let target = self.normalize(p);
        let mut n = target;
        for _ in 0..UNDISTORT_ITERATIONS {
            let err = self.distort_normalized(n) - target;
            if err.length_squared() < 1e-12 {
                break;
            }
            n -= err;
        }
        self.denormalize(n)
    }
}

/// Remove lens distortion from a frame.
///
/// Every output pixel reads the source where the lens imaged it. A camera
/// without distortion coefficients yields a plain copy.
pub fn undistort(buffer: &Buffer, camera: &CameraIntrinsics) -> Buffer {
    if !camera.has_distortion() {
        return buffer.duplicate();
    }
    let camera = camera.scaled_to(buffer.width());
    warp(buffer, FilterKind::Bilinear, |p| camera.distort_point(p))
}
