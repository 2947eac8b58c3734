//! ClipCache Tracking - camera undistortion and 2D stabilization.

pub mod camera;
pub mod error;
pub mod stabilize;
pub mod warp;

pub use camera::{undistort, CameraIntrinsics, DistortionModel};
pub use error::TrackingError;
pub use stabilize::{
    apply_stabilization, compute_stabilization, StabilizationData, StabilizationSettings, Track,
};
pub use warp::{warp, FilterKind};
