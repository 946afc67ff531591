use lidarloc_3d::{linalg::transform_points, pointcloud::PointCloud};

use crate::ops::{
    find_correspondences, fit_transformation, rotation_cosine, update_transformation, TargetTree,
};

/// Minimum cosine of the incremental rotation considered as "no rotation".
const ROTATION_COSINE_THRESHOLD: f64 = 1.0 - 1e-5;

/// Error types for the ICP module.
#[derive(Debug, thiserror::Error)]
pub enum IcpError {
    /// The source point cloud has no points.
    #[error("Source point cloud is empty")]
    EmptySource,

    /// The target point cloud has no points.
    #[error("Target point cloud is empty")]
    EmptyTarget,
}

/// Target point cloud with its nearest neighbour index.
///
/// Building the index is the expensive part of the setup, so a target is built once and
/// reused for every alignment against the same cloud.
pub struct IcpTarget {
    points: Vec<[f64; 3]>,
    kdtree: TargetTree,
}

impl IcpTarget {
    /// Index the points of `cloud`.
    pub fn new(cloud: &PointCloud) -> Result<Self, IcpError> {
        if cloud.is_empty() {
            return Err(IcpError::EmptyTarget);
        }
        let points = cloud.points().to_vec();
        let kdtree = TargetTree::new_from_slice(&points);
        Ok(Self { points, kdtree })
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false, an empty target cannot be built.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The indexed points.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }
}

/// Result of the ICP algorithm.
///
/// The transformation is from the source to the target frame.
#[derive(Debug, Clone)]
pub struct IcpResult {
    /// Estimated rotation matrix, row-major.
    pub rotation: [[f64; 3]; 3],
    /// Estimated translation vector.
    pub translation: [f64; 3],
    /// The total number of iterations performed.
    pub num_iterations: usize,
    /// Mean squared distance of the correspondences of the last iteration.
    pub mse: f64,
    /// Number of correspondences of the last iteration.
    pub num_correspondences: usize,
    /// Whether a convergence criterion was met before running out of iterations.
    pub converged: bool,
}

/// Structure to define the ICP parameters.
#[derive(Debug, Clone)]
pub struct IcpCriteria {
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
    /// Correspondences farther apart than this distance are ignored.
    pub max_correspondence_distance: f64,
    /// Convergence threshold on the squared incremental translation.
    pub transformation_epsilon: f64,
    /// Convergence threshold on the change of the mean squared error between iterations.
    pub euclidean_fitness_epsilon: f64,
}

impl Default for IcpCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            max_correspondence_distance: 1.0,
            transformation_epsilon: 1e-9,
            euclidean_fitness_epsilon: 1e-9,
        }
    }
}

/// Iterative Closest Point (ICP) algorithm using point to point distance.
///
/// # Arguments
///
/// * `source` - Source point cloud.
/// * `target` - Indexed target point cloud.
/// * `initial_rot` - Initial rotation matrix. This is the rotation from the source to the target frame.
/// * `initial_trans` - Initial translation vector. This is the translation from the source to the target frame.
/// * `criteria` - Convergence criteria.
///
/// # Returns
///
/// The best transformation found. A result with `converged == false` is still the last
/// estimate and may be used as a best effort guess.
pub fn icp_point_to_point(
    source: &PointCloud,
    target: &IcpTarget,
    initial_rot: [[f64; 3]; 3],
    initial_trans: [f64; 3],
    criteria: &IcpCriteria,
) -> Result<IcpResult, IcpError> {
    if source.is_empty() {
        return Err(IcpError::EmptySource);
    }

    // initialize the result structure with the initial transformation given by the user
    let mut result = IcpResult {
        rotation: initial_rot,
        translation: initial_trans,
        num_iterations: 0,
        mse: f64::INFINITY,
        num_correspondences: 0,
        converged: false,
    };

    let mut current_source = vec![[0.0; 3]; source.len()];
    transform_points(
        source.points(),
        &result.rotation,
        &result.translation,
        &mut current_source,
    );
    let mut transformed_points = vec![[0.0; 3]; source.len()];

    let max_distance_sq = criteria.max_correspondence_distance.powi(2);
    let mut previous_mse = f64::INFINITY;

    for i in 0..criteria.max_iterations {
        let (current_source_match, current_target_match, distances) =
            find_correspondences(&current_source, &target.points, &target.kdtree, max_distance_sq);

        if current_source_match.len() < 3 {
            log::debug!(
                "ICP stopped at iteration {}: {} correspondences",
                i,
                current_source_match.len()
            );
            break;
        }

        let mse = distances.iter().sum::<f64>() / distances.len() as f64;

        // compute transformation between current source and closest points
        let mut rr_delta = [[0.0; 3]; 3];
        let mut tt_delta = [0.0; 3];
        fit_transformation(
            &current_source_match,
            &current_target_match,
            &mut rr_delta,
            &mut tt_delta,
        );

        transform_points(&current_source, &rr_delta, &tt_delta, &mut transformed_points);
        std::mem::swap(&mut current_source, &mut transformed_points);

        update_transformation(
            &mut result.rotation,
            &mut result.translation,
            &rr_delta,
            &tt_delta,
        );

        result.num_iterations += 1;
        result.mse = mse;
        result.num_correspondences = current_source_match.len();

        let translation_sq = tt_delta.iter().map(|t| t * t).sum::<f64>();
        let small_step = rotation_cosine(&rr_delta) >= ROTATION_COSINE_THRESHOLD
            && translation_sq <= criteria.transformation_epsilon;
        let small_error_change = (previous_mse - mse).abs() < criteria.euclidean_fitness_epsilon;

        if mse == 0.0 || small_step || small_error_change {
            log::debug!("ICP converged in {} iterations with mse {}", i + 1, mse);
            result.converged = true;
            break;
        }

        previous_mse = mse;
    }

    Ok(result)
}

/// Mean squared nearest neighbour distance of the transformed source against the target.
///
/// Only points whose squared distance is at most `max_range` contribute. Returns
/// `f64::MAX` when no point qualifies, so that a lower score is always a better alignment.
pub fn fitness_score(
    source: &PointCloud,
    target: &IcpTarget,
    rotation: &[[f64; 3]; 3],
    translation: &[f64; 3],
    max_range: f64,
) -> f64 {
    let mut transformed = vec![[0.0; 3]; source.len()];
    transform_points(source.points(), rotation, translation, &mut transformed);

    let (sum, count) = transformed
        .iter()
        .map(|p| target.kdtree.nearest_one::<kiddo::SquaredEuclidean>(p).distance)
        .filter(|d| *d <= max_range)
        .fold((0.0, 0usize), |(sum, count), d| (sum + d, count + 1));

    match count {
        0 => f64::MAX,
        n => sum / n as f64,
    }
}
