//! Shared types and utilities used by every `alvr_*` crate: the error
//! ladder (spec §7), logging setup, device identifiers (spec §6), and math
//! re-exports so downstream crates don't each pick their own vector/quat
//! library.

pub mod error;
pub mod ids;

pub use error::{ConError, ConResult};
pub use glam;
pub use ids::DeviceId;
pub use semver;

/// Normalized field of view, matching OpenXR's `XrFovf` convention: each
/// angle in radians, `angle_left`/`angle_down` negative, `angle_right`/
/// `angle_up` positive.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Fov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

/// A rigid-body pose plus optional first-derivative tracking state, the
/// wire- and history-level equivalent of `xrt_space_relation` (spec §3/§4.4).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MotionData {
    pub orientation: glam::Quat,
    pub position: glam::Vec3,
    pub linear_velocity: glam::Vec3,
    pub angular_velocity: glam::Vec3,
}

impl Default for MotionData {
    fn default() -> Self {
        Self {
            orientation: glam::Quat::IDENTITY,
            position: glam::Vec3::ZERO,
            linear_velocity: glam::Vec3::ZERO,
            angular_velocity: glam::Vec3::ZERO,
        }
    }
}

bitflags::bitflags! {
    /// Validity/tracked bits carried alongside a [`MotionData`], mirroring
    /// `xrt_space_relation_flags` / the wire `tracking::flags` (spec §3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
    pub struct MotionFlags: u8 {
        const ORIENTATION_VALID     = 1 << 0;
        const POSITION_VALID        = 1 << 1;
        const LINEAR_VELOCITY_VALID = 1 << 2;
        const ANGULAR_VELOCITY_VALID= 1 << 3;
        const ORIENTATION_TRACKED   = 1 << 4;
        const POSITION_TRACKED      = 1 << 5;
    }
}
