use glam::DMat4;
use lidarloc_3d::{
    pointcloud::PointCloud,
    transforms::{rigid_from_parts, rigid_to_parts},
};
use lidarloc_icp::{fitness_score, icp_point_to_point, IcpCriteria, IcpTarget};

use crate::error::LocalizationError;

/// Limits of one alignment attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignParams {
    /// Correspondences farther apart than this distance are ignored.
    pub max_correspondence_distance: f64,
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Convergence threshold on the squared incremental translation.
    pub transformation_epsilon: f64,
    /// Convergence threshold on the change of the mean squared error.
    pub euclidean_fitness_epsilon: f64,
}

impl Default for AlignParams {
    fn default() -> Self {
        Self {
            max_correspondence_distance: 1.0,
            max_iterations: 1000,
            transformation_epsilon: 1e-9,
            euclidean_fitness_epsilon: 1e-9,
        }
    }
}

impl From<&AlignParams> for IcpCriteria {
    fn from(params: &AlignParams) -> Self {
        IcpCriteria {
            max_iterations: params.max_iterations,
            max_correspondence_distance: params.max_correspondence_distance,
            transformation_epsilon: params.transformation_epsilon,
            euclidean_fitness_epsilon: params.euclidean_fitness_epsilon,
        }
    }
}

/// Outcome of one alignment attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    /// Estimated `target_t_source`, best effort when not converged.
    pub transform: DMat4,
    /// Whether a convergence criterion was met.
    pub converged: bool,
    /// Mean squared correspondence distance of the last iteration.
    pub fitness: f64,
    /// Number of iterations performed.
    pub iterations: usize,
}

/// Downsampled reference map with its nearest neighbour index.
pub struct RegistrationTarget {
    index: IcpTarget,
}

impl RegistrationTarget {
    /// Index `cloud` for repeated alignments.
    pub fn new(cloud: &PointCloud) -> Result<Self, LocalizationError> {
        Ok(Self {
            index: IcpTarget::new(cloud)?,
        })
    }
}

/// Scan to map registration primitive.
pub trait Aligner: Send {
    /// Align `source` onto `target` starting from `guess`.
    fn align(
        &self,
        source: &PointCloud,
        target: &RegistrationTarget,
        guess: &DMat4,
        params: &AlignParams,
    ) -> Result<Alignment, LocalizationError>;

    /// Score `source` placed by `transform` against `target`, lower is better.
    fn fitness_score(
        &self,
        source: &PointCloud,
        target: &RegistrationTarget,
        transform: &DMat4,
        max_range: f64,
    ) -> f64;
}

/// [`Aligner`] backed by point-to-point ICP.
#[derive(Debug, Clone, Copy, Default)]
pub struct IcpAligner;

impl Aligner for IcpAligner {
    fn align(
        &self,
        source: &PointCloud,
        target: &RegistrationTarget,
        guess: &DMat4,
        params: &AlignParams,
    ) -> Result<Alignment, LocalizationError> {
        let (rotation, translation) = rigid_to_parts(guess);
        let result = icp_point_to_point(
            source,
            &target.index,
            rotation,
            translation,
            &IcpCriteria::from(params),
        )?;

        Ok(Alignment {
            transform: rigid_from_parts(&result.rotation, &result.translation),
            converged: result.converged,
            fitness: result.mse,
            iterations: result.num_iterations,
        })
    }

    fn fitness_score(
        &self,
        source: &PointCloud,
        target: &RegistrationTarget,
        transform: &DMat4,
        max_range: f64,
    ) -> f64 {
        let (rotation, translation) = rigid_to_parts(transform);
        fitness_score(source, &target.index, &rotation, &translation, max_range)
    }
}
