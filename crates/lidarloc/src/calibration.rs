use glam::{DMat4, DQuat, DVec3};
use lidarloc_3d::transforms::rigid_inverse;

use crate::config::CalibrationConfig;

/// Maximum deviation of the calibration quaternion norm from one.
const QUATERNION_NORM_TOLERANCE: f64 = 1e-3;

/// Error types for the vehicle to sensor calibration.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CalibrationError {
    /// The translation does not have three components.
    #[error("Calibration translation must have 3 components, got {0}")]
    TranslationLength(usize),

    /// The rotation does not have four components.
    #[error("Calibration rotation must have 4 components (x, y, z, w), got {0}")]
    RotationLength(usize),

    /// A component is NaN or infinite.
    #[error("Calibration contains non-finite values")]
    NonFinite,

    /// The rotation quaternion is not of unit norm.
    #[error("Calibration rotation is not a unit quaternion, norm {0}")]
    NotUnitQuaternion(f64),
}

/// Fixed rigid transform between the vehicle body and the range sensor.
///
/// Stored as `vehicle_t_sensor`, the transform taking sensor coordinates into the vehicle
/// frame. A value of this type is always valid, there is no partially loaded state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    vehicle_t_sensor: DMat4,
}

impl Calibration {
    /// Validate a translation `[x, y, z]` and a quaternion `[x, y, z, w]`.
    pub fn from_parts(translation: &[f64], rotation: &[f64]) -> Result<Self, CalibrationError> {
        let translation: [f64; 3] = translation
            .try_into()
            .map_err(|_| CalibrationError::TranslationLength(translation.len()))?;
        let rotation: [f64; 4] = rotation
            .try_into()
            .map_err(|_| CalibrationError::RotationLength(rotation.len()))?;

        if translation.iter().chain(rotation.iter()).any(|v| !v.is_finite()) {
            return Err(CalibrationError::NonFinite);
        }

        let rotation = DQuat::from_array(rotation);
        let norm = rotation.length();
        if (norm - 1.0).abs() > QUATERNION_NORM_TOLERANCE {
            return Err(CalibrationError::NotUnitQuaternion(norm));
        }

        Ok(Self {
            vehicle_t_sensor: DMat4::from_rotation_translation(
                rotation.normalize(),
                DVec3::from_array(translation),
            ),
        })
    }

    /// The sensor sits at the vehicle reference point.
    pub fn identity() -> Self {
        Self {
            vehicle_t_sensor: DMat4::IDENTITY,
        }
    }

    /// Transform from sensor coordinates to vehicle coordinates.
    pub fn vehicle_t_sensor(&self) -> DMat4 {
        self.vehicle_t_sensor
    }

    /// Transform from vehicle coordinates to sensor coordinates.
    pub fn sensor_t_vehicle(&self) -> DMat4 {
        rigid_inverse(&self.vehicle_t_sensor)
    }
}

impl TryFrom<&CalibrationConfig> for Calibration {
    type Error = CalibrationError;

    fn try_from(config: &CalibrationConfig) -> Result<Self, Self::Error> {
        Self::from_parts(&config.translation, &config.rotation)
    }
}
