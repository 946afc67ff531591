use crate::pointcloud::PointCloud;
use glam::DVec3;
use std::collections::BTreeMap;

/// Accumulated data of one occupied voxel: position sum, intensity sum, point count.
type VoxelData = (DVec3, f64, usize);

/// Error types for the voxel grid.
#[derive(Debug, thiserror::Error)]
pub enum VoxelGridError {
    /// The leaf size must be strictly positive and finite in every dimension.
    #[error("Leaf size must be positive in all dimensions. Got: {0:?}")]
    InvalidLeafSize([f64; 3]),
}

/// A 3D voxel grid for downsampling point clouds.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    /// The size of the voxel (leaf) in x, y, z dimensions.
    leaf_size: DVec3,
}

impl VoxelGrid {
    /// Creates a new `VoxelGrid` with the specified leaf size.
    ///
    /// # Arguments
    /// * `leaf_size` - The size of the voxel in x, y, z dimensions.
    ///
    /// # Errors
    /// Returns an error if any dimension of `leaf_size` is non-positive or not finite.
    pub fn new(leaf_size: DVec3) -> Result<Self, VoxelGridError> {
        Self::validate(leaf_size)?;
        Ok(VoxelGrid { leaf_size })
    }

    /// Creates a new `VoxelGrid` with the same leaf size along every axis.
    pub fn with_cubic_leaf(leaf_size: f64) -> Result<Self, VoxelGridError> {
        Self::new(DVec3::splat(leaf_size))
    }

    fn validate(leaf_size: DVec3) -> Result<(), VoxelGridError> {
        let valid = leaf_size.is_finite() && leaf_size.cmpgt(DVec3::ZERO).all();
        match valid {
            true => Ok(()),
            false => Err(VoxelGridError::InvalidLeafSize(leaf_size.to_array())),
        }
    }

    /// Downsamples the input point cloud by grouping points into voxels and computing centroids.
    ///
    /// Intensities, when present, are averaged per voxel. The output is ordered by voxel index
    /// so that the same input always produces the same output.
    pub fn downsample(&self, point_cloud: &PointCloud) -> PointCloud {
        let mut grid: BTreeMap<(i64, i64, i64), VoxelData> = BTreeMap::new();
        let intensities = point_cloud.intensities();

        // Group points into voxels
        for (i, point) in point_cloud.points().iter().enumerate() {
            let entry = grid
                .entry(self.get_voxel_index(point))
                .or_insert((DVec3::ZERO, 0.0, 0));
            entry.0 += DVec3::from_array(*point);
            if let Some(intensity) = intensities.and_then(|v| v.get(i)) {
                entry.1 += *intensity as f64;
            }
            entry.2 += 1;
        }

        // Compute centroids for each voxel
        let mut points = Vec::with_capacity(grid.len());
        let mut out_intensities = intensities.map(|_| Vec::with_capacity(grid.len()));

        for (sum, intensity_sum, count) in grid.into_values() {
            let inv_count = 1.0 / count as f64;
            points.push((sum * inv_count).to_array());
            if let Some(out) = out_intensities.as_mut() {
                out.push((intensity_sum * inv_count) as f32);
            }
        }

        log::debug!(
            "voxel grid downsampled {} -> {} points",
            point_cloud.len(),
            points.len()
        );

        // one intensity is pushed per centroid
        PointCloud::from_parts(points, out_intensities)
    }

    /// Computes the voxel index for a given point.
    pub fn get_voxel_index(&self, point: &[f64; 3]) -> (i64, i64, i64) {
        let cell = (DVec3::from_array(*point) / self.leaf_size).floor();
        (cell.x as i64, cell.y as i64, cell.z as i64)
    }

    /// Gets the voxel grid leaf size.
    pub fn leaf_size(&self) -> DVec3 {
        self.leaf_size
    }
}
