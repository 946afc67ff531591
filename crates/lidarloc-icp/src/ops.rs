use glam::{DMat3, DVec3};
use kiddo::immutable::float::kdtree::ImmutableKdTree;

/// Nearest neighbour index over the target points.
pub(crate) type TargetTree = ImmutableKdTree<f64, u32, 3, 32>;

/// Compute the rigid transformation that best maps `points_in_src` onto `points_in_dst`.
///
/// Least squares fit of paired points (Kabsch): the rotation comes from the SVD of the
/// cross-covariance matrix, with the reflection case corrected so the result is a proper
/// rotation.
///
/// PRECONDITION: both slices have the same length, at least 3.
pub fn fit_transformation(
    points_in_src: &[[f64; 3]],
    points_in_dst: &[[f64; 3]],
    dst_r_src: &mut [[f64; 3]; 3],
    dst_t_src: &mut [f64; 3],
) {
    assert_eq!(points_in_src.len(), points_in_dst.len());
    assert!(
        points_in_src.len() >= 3,
        "Need at least 3 points for transformation estimation"
    );

    let (src_centroid, dst_centroid) = compute_centroids(points_in_src, points_in_dst);

    // compute covariance matrix H = Σ[(src - src_mean) * (dst - dst_mean)^T]
    let mut h = faer::Mat::<f64>::zeros(3, 3);
    for (p_in_src, p_in_dst) in points_in_src.iter().zip(points_in_dst.iter()) {
        let src_centered = DVec3::from_array(*p_in_src) - src_centroid;
        let dst_centered = DVec3::from_array(*p_in_dst) - dst_centroid;
        for i in 0..3 {
            for j in 0..3 {
                let value = h.read(i, j) + src_centered[i] * dst_centered[j];
                h.write(i, j, value);
            }
        }
    }

    let svd = h.svd();
    let (u, v) = (svd.u(), svd.v());
    let u = DMat3::from_cols_array_2d(&[
        [u.read(0, 0), u.read(1, 0), u.read(2, 0)],
        [u.read(0, 1), u.read(1, 1), u.read(2, 1)],
        [u.read(0, 2), u.read(1, 2), u.read(2, 2)],
    ]);
    let v = DMat3::from_cols_array_2d(&[
        [v.read(0, 0), v.read(1, 0), v.read(2, 0)],
        [v.read(0, 1), v.read(1, 1), v.read(2, 1)],
        [v.read(0, 2), v.read(1, 2), v.read(2, 2)],
    ]);

    // R = V * U^T, flipping the last singular direction on reflections
    let mut r = v * u.transpose();
    if r.determinant() < 0.0 {
        let v_corrected = DMat3::from_cols(v.x_axis, v.y_axis, -v.z_axis);
        r = v_corrected * u.transpose();
    }

    let t = dst_centroid - r * src_centroid;

    *dst_r_src = r.transpose().to_cols_array_2d();
    *dst_t_src = t.to_array();
}

/// Compute the centroids of two sets of points.
///
/// # Arguments
///
/// * `points1` - A set of points.
/// * `points2` - Another set of points.
///
/// # Returns
///
/// The centroids of the two sets of points.
pub fn compute_centroids(points1: &[[f64; 3]], points2: &[[f64; 3]]) -> (DVec3, DVec3) {
    let centroid = |points: &[[f64; 3]]| {
        points
            .iter()
            .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p))
            / points.len().max(1) as f64
    };
    (centroid(points1), centroid(points2))
}

/// Pair every source point with its nearest target point.
///
/// Pairs whose squared distance exceeds `max_distance_sq` are dropped. Returns the kept
/// source points, their matches and the squared distances.
pub(crate) fn find_correspondences(
    source: &[[f64; 3]],
    target: &[[f64; 3]],
    kdtree: &TargetTree,
    max_distance_sq: f64,
) -> (Vec<[f64; 3]>, Vec<[f64; 3]>, Vec<f64>) {
    let mut points_in_src = Vec::with_capacity(source.len());
    let mut points_in_dst = Vec::with_capacity(source.len());
    let mut distances = Vec::with_capacity(source.len());

    for p in source {
        let nn = kdtree.nearest_one::<kiddo::SquaredEuclidean>(p);
        if nn.distance <= max_distance_sq {
            points_in_src.push(*p);
            points_in_dst.push(target[nn.item as usize]);
            distances.push(nn.distance);
        }
    }

    (points_in_src, points_in_dst, distances)
}

/// Left-compose an incremental transformation onto the accumulated one.
///
/// R_new = R_delta * R_old
/// t_new = R_delta * t_old + t_delta
pub(crate) fn update_transformation(
    rr: &mut [[f64; 3]; 3],
    tt: &mut [f64; 3],
    rr_delta: &[[f64; 3]; 3],
    tt_delta: &[f64; 3],
) {
    let r_old = DMat3::from_cols_array_2d(rr).transpose();
    let r_delta = DMat3::from_cols_array_2d(rr_delta).transpose();

    *rr = (r_delta * r_old).transpose().to_cols_array_2d();
    *tt = (r_delta * DVec3::from_array(*tt) + DVec3::from_array(*tt_delta)).to_array();
}

/// Cosine of the rotation angle of a row-major rotation matrix.
pub(crate) fn rotation_cosine(rr: &[[f64; 3]; 3]) -> f64 {
    0.5 * (rr[0][0] + rr[1][1] + rr[2][2] - 1.0)
}
