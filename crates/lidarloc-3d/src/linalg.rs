use glam::{DMat3, DMat4, DVec3};

use crate::pointcloud::PointCloud;

/// Transform a set of points using a rotation and translation.
///
/// # Arguments
///
/// * `src_points` - A set of points to be transformed.
/// * `dst_r_src` - A row-major rotation matrix.
/// * `dst_t_src` - A translation vector.
/// * `dst_points` - A pre-allocated vector to store the transformed points.
///
/// PRECONDITION: dst_points is a pre-allocated vector of the same size as source.
///
/// Example:
///
/// ```
/// use lidarloc_3d::linalg::transform_points;
///
/// let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
/// let rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
/// let translation = [1.0, 0.0, 0.0];
/// let mut dst_points = vec![[0.0; 3]; src_points.len()];
/// transform_points(&src_points, &rotation, &translation, &mut dst_points);
/// assert_eq!(dst_points[0], [3.0, 2.0, 2.0]);
/// ```
pub fn transform_points(
    src_points: &[[f64; 3]],
    dst_r_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
    dst_points: &mut [[f64; 3]],
) {
    assert_eq!(src_points.len(), dst_points.len());

    // glam is column-major, the rotation is given row by row
    let rotation = DMat3::from_cols_array_2d(dst_r_src).transpose();
    let translation = DVec3::from_array(*dst_t_src);

    for (dst, src) in dst_points.iter_mut().zip(src_points.iter()) {
        *dst = (rotation * DVec3::from_array(*src) + translation).to_array();
    }
}

/// Apply a homogeneous rigid transform to every point of a cloud.
///
/// Intensities are carried over unchanged.
pub fn transform_cloud(cloud: &PointCloud, dst_t_src: &DMat4) -> PointCloud {
    let points = cloud
        .points()
        .iter()
        .map(|p| dst_t_src.transform_point3(DVec3::from_array(*p)).to_array())
        .collect();
    PointCloud::from_parts(points, cloud.intensities().map(<[f32]>::to_vec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_points_identity() {
        let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
        let rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let translation = [0.0, 0.0, 0.0];
        let mut dst_points = vec![[0.0; 3]; src_points.len()];
        transform_points(&src_points, &rotation, &translation, &mut dst_points);

        assert_eq!(dst_points, src_points);
    }

    #[test]
    fn test_transform_points_row_major() {
        // +90 degrees about z: x axis goes to y axis
        let rotation = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let mut dst_points = vec![[0.0; 3]; 1];
        transform_points(&[[1.0, 0.0, 0.0]], &rotation, &[0.0, 0.0, 1.0], &mut dst_points);

        assert_relative_eq!(dst_points[0][0], 0.0);
        assert_relative_eq!(dst_points[0][1], 1.0);
        assert_relative_eq!(dst_points[0][2], 1.0);
    }

    #[test]
    fn test_transform_cloud_keeps_intensity() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = PointCloud::new(vec![[1.0, 2.0, 3.0]], Some(vec![0.5]))?;
        let transform = DMat4::from_translation(DVec3::new(-1.0, 0.0, 2.0));
        let moved = transform_cloud(&cloud, &transform);

        assert_eq!(moved.points(), &[[0.0, 2.0, 5.0]]);
        assert_eq!(moved.intensities(), Some(&[0.5][..]));
        Ok(())
    }
}
