/// Error types for the point cloud container.
#[derive(Debug, thiserror::Error)]
pub enum PointCloudError {
    /// The number of intensities does not match the number of points.
    #[error("Intensity count {intensities} does not match point count {points}")]
    IntensityLengthMismatch {
        /// number of points
        points: usize,
        /// number of intensities
        intensities: usize,
    },
}

/// A point cloud with positions and an optional per-point intensity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The intensity-like scalar of each point.
    intensities: Option<Vec<f32>>,
}

impl PointCloud {
    /// Create a new point cloud from points and optional intensities.
    ///
    /// # Errors
    ///
    /// Returns an error if `intensities` is given with a length different from `points`.
    pub fn new(
        points: Vec<[f64; 3]>,
        intensities: Option<Vec<f32>>,
    ) -> Result<Self, PointCloudError> {
        if let Some(intensities) = &intensities {
            if intensities.len() != points.len() {
                return Err(PointCloudError::IntensityLengthMismatch {
                    points: points.len(),
                    intensities: intensities.len(),
                });
            }
        }
        Ok(Self {
            points,
            intensities,
        })
    }

    /// Create a point cloud holding positions only.
    pub fn from_points(points: Vec<[f64; 3]>) -> Self {
        Self {
            points,
            intensities: None,
        }
    }

    /// Build a cloud whose intensity length is already known to match.
    pub(crate) fn from_parts(points: Vec<[f64; 3]>, intensities: Option<Vec<f32>>) -> Self {
        debug_assert!(intensities.as_ref().map_or(true, |v| v.len() == points.len()));
        Self {
            points,
            intensities,
        }
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the intensities of the points in the point cloud.
    pub fn intensities(&self) -> Option<&[f32]> {
        self.intensities.as_deref()
    }

    /// Consume the cloud and return its points and intensities.
    pub fn into_parts(self) -> (Vec<[f64; 3]>, Option<Vec<f32>>) {
        (self.points, self.intensities)
    }

}
