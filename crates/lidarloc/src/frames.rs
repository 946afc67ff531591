//! Frame composition between the map, sensor and vehicle frames.
//!
//! Poses follow the `dst_t_src` naming: `map_t_sensor` maps sensor coordinates into the
//! map frame.

use glam::{DMat3, DMat4, DQuat, DVec3, EulerRot};
use lidarloc_3d::transforms::yaw_rotation;

use crate::calibration::Calibration;

/// Orientation decomposed as intrinsic Z-Y-X rotations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EulerAngles {
    /// Rotation about z, radians.
    pub yaw: f64,
    /// Rotation about the rotated y axis, radians.
    pub pitch: f64,
    /// Rotation about the twice rotated x axis, radians.
    pub roll: f64,
}

/// Heading hypothesis placed at the position fix: `translation(fix) * rot_z(yaw)`.
pub fn candidate_transform(fix: DVec3, yaw: f64) -> DMat4 {
    DMat4::from_translation(fix) * yaw_rotation(yaw)
}

/// Vehicle pose in the map frame, `map_t_sensor * sensor_t_vehicle`.
pub fn vehicle_pose(map_t_sensor: &DMat4, calibration: &Calibration) -> DMat4 {
    *map_t_sensor * calibration.sensor_t_vehicle()
}

/// Translation part of a rigid transform.
pub fn position(transform: &DMat4) -> [f64; 3] {
    transform.w_axis.truncate().to_array()
}

/// Rotation part of a rigid transform as a unit quaternion.
pub fn rotation(transform: &DMat4) -> DQuat {
    DQuat::from_mat3(&DMat3::from_mat4(*transform)).normalize()
}

/// Rotation part of a rigid transform as a quaternion in `[x, y, z, w]` order.
pub fn orientation_xyzw(transform: &DMat4) -> [f64; 4] {
    rotation(transform).to_array()
}

/// Yaw, pitch and roll of a rigid transform.
pub fn euler_zyx(transform: &DMat4) -> EulerAngles {
    let (yaw, pitch, roll) = rotation(transform).to_euler(EulerRot::ZYX);
    EulerAngles { yaw, pitch, roll }
}
