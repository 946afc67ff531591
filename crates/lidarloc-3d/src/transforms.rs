use glam::{DMat3, DMat4, DVec3, DVec4};

/// Compute the rotation matrix from an axis and angle.
///
/// The axis does not need to be normalized. Returns the matrix in row-major order.
///
/// Example:
///
/// ```
/// use lidarloc_3d::transforms::axis_angle_to_rotation_matrix;
///
/// let rotation = axis_angle_to_rotation_matrix(&[0.0, 0.0, 2.0], 0.0).unwrap();
/// assert_eq!(rotation, [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
/// ```
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<[[f64; 3]; 3], &'static str> {
    let axis = DVec3::from_array(*axis);
    if axis.length() < 1e-10 {
        return Err("cannot compute rotation matrix from a zero vector");
    }
    Ok(mat3_to_rows(&DMat3::from_axis_angle(axis.normalize(), angle)))
}

/// Homogeneous rotation about the vertical (z) axis.
pub fn yaw_rotation(yaw: f64) -> DMat4 {
    DMat4::from_rotation_z(yaw)
}

/// Build a homogeneous rigid transform from a row-major rotation and a translation.
pub fn rigid_from_parts(dst_r_src: &[[f64; 3]; 3], dst_t_src: &[f64; 3]) -> DMat4 {
    let rotation = DMat3::from_cols_array_2d(dst_r_src).transpose();
    DMat4::from_cols(
        rotation.x_axis.extend(0.0),
        rotation.y_axis.extend(0.0),
        rotation.z_axis.extend(0.0),
        DVec4::new(dst_t_src[0], dst_t_src[1], dst_t_src[2], 1.0),
    )
}

/// Split a homogeneous rigid transform into a row-major rotation and a translation.
pub fn rigid_to_parts(dst_t_src: &DMat4) -> ([[f64; 3]; 3], [f64; 3]) {
    let rotation = DMat3::from_mat4(*dst_t_src);
    (mat3_to_rows(&rotation), dst_t_src.w_axis.truncate().to_array())
}

/// Inverse of a rigid transform, using the transpose of its rotation.
pub fn rigid_inverse(dst_t_src: &DMat4) -> DMat4 {
    let (r, t) = rigid_to_parts(dst_t_src);
    let src_r_dst = DMat3::from_cols_array_2d(&r);
    let src_t_dst = -(src_r_dst * DVec3::from_array(t));
    rigid_from_parts(&mat3_to_rows(&src_r_dst), &src_t_dst.to_array())
}

fn mat3_to_rows(m: &DMat3) -> [[f64; 3]; 3] {
    m.transpose().to_cols_array_2d()
}
