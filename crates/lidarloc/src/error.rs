use lidarloc_3d::voxel_grid::VoxelGridError;
use lidarloc_icp::IcpError;

use crate::{calibration::CalibrationError, config::ConfigError, trajectory::TrajectoryError};

/// Error types for the localization pipeline.
#[derive(Debug, thiserror::Error)]
pub enum LocalizationError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The calibration is invalid, the localizer cannot start.
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// A voxel filter could not be built.
    #[error(transparent)]
    VoxelGrid(#[from] VoxelGridError),

    /// The registration primitive failed.
    #[error(transparent)]
    Registration(#[from] IcpError),

    /// The trajectory log could not be written.
    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),

    /// Nothing is left of the scan after downsampling.
    #[error("Scan is empty after downsampling")]
    EmptyScan,

    /// Nothing is left of the reference map after downsampling.
    #[error("Reference map is empty after downsampling")]
    EmptyMap,

    /// Tracking was requested before the coarse search produced a seed.
    #[error("Registration is not initialized")]
    NotInitialized,

    /// The scan queue is full, the scan was discarded.
    #[error("Scan queue is full")]
    QueueFull,

    /// The node has been shut down.
    #[error("Localizer node is not running")]
    Disconnected,

    /// The worker thread could not be started.
    #[error("Failed to spawn the localizer worker")]
    Spawn(#[source] std::io::Error),
}
