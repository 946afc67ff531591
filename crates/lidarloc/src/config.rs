use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::registration::AlignParams;

/// Error types for loading the localizer configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read the configuration file")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for [`LocalizerConfig`].
    #[error("Failed to parse the configuration")]
    Parse(#[from] serde_json::Error),

    /// A value is outside of its valid range.
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// name of the offending field
        field: &'static str,
        /// what is wrong with it
        reason: String,
    },
}

/// Raw calibration values, validated later by [`crate::calibration::Calibration`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Translation of the sensor in the vehicle frame.
    pub translation: Vec<f64>,
    /// Rotation of the sensor in the vehicle frame as a quaternion, x, y, z, w order.
    pub rotation: Vec<f64>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            translation: vec![0.0, 0.0, 0.0],
            rotation: vec![0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Limits of the one-time heading sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoarseSearchConfig {
    /// Heading increment in radians.
    pub yaw_step: f64,
    /// Correspondence distance cap of every attempt.
    pub max_correspondence_distance: f64,
    /// Iteration limit of every attempt.
    pub max_iterations: usize,
    /// Convergence threshold on the squared incremental translation.
    pub transformation_epsilon: f64,
    /// Convergence threshold on the change of the mean squared error.
    pub euclidean_fitness_epsilon: f64,
    /// Squared distance cap of the fitness score used to rank headings.
    pub score_max_range: f64,
}

impl Default for CoarseSearchConfig {
    fn default() -> Self {
        Self {
            yaw_step: 0.2,
            max_correspondence_distance: 0.9,
            max_iterations: 1000,
            transformation_epsilon: 1e-9,
            euclidean_fitness_epsilon: 1e-9,
            score_max_range: 0.5,
        }
    }
}

impl CoarseSearchConfig {
    /// Alignment limits of one heading attempt.
    pub fn align_params(&self) -> AlignParams {
        AlignParams {
            max_correspondence_distance: self.max_correspondence_distance,
            max_iterations: self.max_iterations,
            transformation_epsilon: self.transformation_epsilon,
            euclidean_fitness_epsilon: self.euclidean_fitness_epsilon,
        }
    }
}

/// Limits of the per-scan warm-started alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Correspondence distance cap.
    pub max_correspondence_distance: f64,
    /// Iteration limit.
    pub max_iterations: usize,
    /// Convergence threshold on the squared incremental translation.
    pub transformation_epsilon: f64,
    /// Convergence threshold on the change of the mean squared error.
    pub euclidean_fitness_epsilon: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_correspondence_distance: 1.0,
            max_iterations: 1000,
            transformation_epsilon: 1e-9,
            euclidean_fitness_epsilon: 1e-9,
        }
    }
}

impl TrackingConfig {
    /// Alignment limits of one tracking cycle.
    pub fn align_params(&self) -> AlignParams {
        AlignParams {
            max_correspondence_distance: self.max_correspondence_distance,
            max_iterations: self.max_iterations,
            transformation_epsilon: self.transformation_epsilon,
            euclidean_fitness_epsilon: self.euclidean_fitness_epsilon,
        }
    }
}

/// Startup configuration of the localizer.
///
/// Every field is optional in the JSON file, missing fields take their default.
///
/// ```
/// use lidarloc::config::LocalizerConfig;
///
/// let config = LocalizerConfig::from_json_str(r#"{ "map_leaf_size": 0.4 }"#).unwrap();
/// assert_eq!(config.map_leaf_size, 0.4);
/// assert_eq!(config.scan_leaf_size, 1.0);
/// assert_eq!(config.map_frame, "world");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizerConfig {
    /// Vehicle to sensor calibration.
    pub calibration: CalibrationConfig,
    /// Path of the trajectory log.
    pub result_save_path: PathBuf,
    /// Voxel leaf size applied to every scan.
    pub scan_leaf_size: f64,
    /// Voxel leaf size applied to the reference map.
    pub map_leaf_size: f64,
    /// Identifier of the map frame.
    pub map_frame: String,
    /// Identifier of the sensor frame.
    pub lidar_frame: String,
    /// Heading sweep limits.
    pub coarse_search: CoarseSearchConfig,
    /// Tracking limits.
    pub tracking: TrackingConfig,
    /// Delay between two readiness checks, in milliseconds.
    pub readiness_poll_ms: u64,
    /// Number of scans buffered while the worker is busy.
    pub scan_queue_capacity: usize,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationConfig::default(),
            result_save_path: PathBuf::from("result.csv"),
            scan_leaf_size: 1.0,
            map_leaf_size: 1.0,
            map_frame: "world".to_string(),
            lidar_frame: "nuscenes_lidar".to_string(),
            coarse_search: CoarseSearchConfig::default(),
            tracking: TrackingConfig::default(),
            readiness_poll_ms: 50,
            scan_queue_capacity: 400,
        }
    }
}

impl LocalizerConfig {
    /// Read and validate a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Parse and validate a configuration from a JSON string.
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the numeric ranges and frame identifiers.
    ///
    /// The calibration values are checked separately when the calibration is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("scan_leaf_size", self.scan_leaf_size),
            ("map_leaf_size", self.map_leaf_size),
            ("coarse_search.yaw_step", self.coarse_search.yaw_step),
            (
                "coarse_search.max_correspondence_distance",
                self.coarse_search.max_correspondence_distance,
            ),
            ("coarse_search.score_max_range", self.coarse_search.score_max_range),
            (
                "tracking.max_correspondence_distance",
                self.tracking.max_correspondence_distance,
            ),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("expected a positive value, got {value}"),
                });
            }
        }

        if self.scan_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scan_queue_capacity",
                reason: "the queue must hold at least one scan".to_string(),
            });
        }

        for (field, value) in [("map_frame", &self.map_frame), ("lidar_frame", &self.lidar_frame)] {
            if value.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "frame identifiers cannot be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Delay between two readiness checks.
    pub fn readiness_poll(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.readiness_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_node_parameters() {
        let config = LocalizerConfig::default();
        assert_eq!(config.result_save_path, PathBuf::from("result.csv"));
        assert_eq!(config.lidar_frame, "nuscenes_lidar");
        assert_eq!(config.coarse_search.max_correspondence_distance, 0.9);
        assert_eq!(config.tracking.max_correspondence_distance, 1.0);
        assert_eq!(config.readiness_poll_ms, 50);
        assert_eq!(config.scan_queue_capacity, 400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() -> Result<(), ConfigError> {
        let config = LocalizerConfig::from_json_str(
            r#"{
                "calibration": { "translation": [0.9, 0.0, 1.8] },
                "coarse_search": { "yaw_step": 0.1 },
                "result_save_path": "out/trajectory.csv"
            }"#,
        )?;
        assert_eq!(config.calibration.translation, vec![0.9, 0.0, 1.8]);
        assert_eq!(config.calibration.rotation, vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.coarse_search.yaw_step, 0.1);
        assert_eq!(config.coarse_search.max_iterations, 1000);
        assert_eq!(config.result_save_path, PathBuf::from("out/trajectory.csv"));
        Ok(())
    }

    #[test]
    fn test_rejects_non_positive_leaf() {
        let result = LocalizerConfig::from_json_str(r#"{ "scan_leaf_size": 0.0 }"#);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "scan_leaf_size",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            LocalizerConfig::from_json_str("{ map_frame: }"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("localizer.json");
        std::fs::write(&path, r#"{ "map_frame": "map", "scan_queue_capacity": 8 }"#)?;

        let config = LocalizerConfig::from_file(&path)?;
        assert_eq!(config.map_frame, "map");
        assert_eq!(config.scan_queue_capacity, 8);

        assert!(matches!(
            LocalizerConfig::from_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
        Ok(())
    }
}
