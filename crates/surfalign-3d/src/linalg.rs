use faer::prelude::SpSolver;

/// Add two 3d vectors.
#[inline]
pub fn add3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// Subtract two 3d vectors as `a - b`.
#[inline]
pub fn sub3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Scale a 3d vector.
#[inline]
pub fn scale3(a: &[f64; 3], s: f64) -> [f64; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// Dot product of two 3d vectors.
#[inline]
pub fn dot_product3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Cross product of two 3d vectors.
#[inline]
pub fn cross_vec3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Squared euclidean norm of a 3d vector.
#[inline]
pub fn squared_norm3(a: &[f64; 3]) -> f64 {
    dot_product3(a, a)
}

/// Multiply a 3x3 row-major matrix by a 3d column vector.
#[inline]
pub fn mat33_mul_vec3(m: &[[f64; 3]; 3], v: &[f64; 3]) -> [f64; 3] {
    [
        dot_product3(&m[0], v),
        dot_product3(&m[1], v),
        dot_product3(&m[2], v),
    ]
}

/// Multiply two 3x3 matrices.
///
/// # Arguments
///
/// * `a` - The left hand side matrix.
/// * `b` - The right hand side matrix.
/// * `m` - The output matrix `a * b`.
pub fn matmul33(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3], m: &mut [[f64; 3]; 3]) {
    for (i, row) in m.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
}

/// Multiply three 3x3 matrices as `a * b * c`.
pub fn matmul333(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3], c: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut ab = [[0.0; 3]; 3];
    matmul33(a, b, &mut ab);
    let mut abc = [[0.0; 3]; 3];
    matmul33(&ab, c, &mut abc);
    abc
}

/// Transpose a 3x3 matrix.
pub fn transpose_mat33(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    [
        [m[0][0], m[1][0], m[2][0]],
        [m[0][1], m[1][1], m[2][1]],
        [m[0][2], m[1][2], m[2][2]],
    ]
}

/// Determinant of a 3x3 matrix.
pub fn det_mat33(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Invert a 3x3 matrix using its adjugate.
///
/// Returns `None` if the absolute value of the determinant is below `eps`.
pub fn inverse_mat33(m: &[[f64; 3]; 3], eps: f64) -> Option<[[f64; 3]; 3]> {
    let det = det_mat33(m);
    if !det.is_finite() || det.abs() < eps {
        return None;
    }
    let inv_det = 1.0 / det;

    Some([
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ])
}

/// Compute the arithmetic mean of a set of points.
///
/// Returns the origin for an empty set.
pub fn centroid(points: &[[f64; 3]]) -> [f64; 3] {
    if points.is_empty() {
        return [0.0; 3];
    }
    let sum = points.iter().fold([0.0; 3], |acc, p| add3(&acc, p));
    scale3(&sum, 1.0 / points.len() as f64)
}

/// Transform a set of points using a scaled rotation and a translation.
///
/// Each point is mapped as `dst = scale * R * src + t`.
///
/// # Arguments
///
/// * `src_points` - A set of points to be transformed.
/// * `dst_r_src` - A rotation matrix.
/// * `dst_t_src` - A translation vector.
/// * `scale` - A uniform scale applied after the rotation.
/// * `dst_points` - A pre-allocated vector to store the transformed points.
///
/// PRECONDITION: dst_points is a pre-allocated vector of the same size as source.
///
/// Example:
///
/// ```
/// use surfalign_3d::linalg::transform_points;
///
/// let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
/// let rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
/// let translation = [1.0, 0.0, 0.0];
/// let mut dst_points = vec![[0.0; 3]; src_points.len()];
/// transform_points(&src_points, &rotation, &translation, 1.0, &mut dst_points);
/// assert_eq!(dst_points[0], [3.0, 2.0, 2.0]);
/// ```
pub fn transform_points(
    src_points: &[[f64; 3]],
    dst_r_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
    scale: f64,
    dst_points: &mut [[f64; 3]],
) {
    assert_eq!(src_points.len(), dst_points.len());

    for (point_dst, point_src) in dst_points.iter_mut().zip(src_points.iter()) {
        let rotated = mat33_mul_vec3(dst_r_src, point_src);
        *point_dst = add3(&scale3(&rotated, scale), dst_t_src);
    }
}

/// Solve the 6x6 symmetric positive definite system `a * x = b`.
///
/// The system is factorized with a Cholesky decomposition. Returns `None` when the
/// factorization fails (the matrix is not positive definite) or when the solution
/// contains non-finite values.
pub fn cholesky_solve6(a: &[[f64; 6]; 6], b: &[f64; 6]) -> Option<[f64; 6]> {
    let mat_a = faer::Mat::<f64>::from_fn(6, 6, |i, j| a[i][j]);
    let mat_b = faer::Mat::<f64>::from_fn(6, 1, |i, _| b[i]);

    let llt = mat_a.cholesky(faer::Side::Lower).ok()?;
    let sol = llt.solve(mat_b.as_ref());

    let mut x = [0.0; 6];
    for (i, val) in x.iter_mut().enumerate() {
        *val = sol.read(i, 0);
    }

    x.iter().all(|v| v.is_finite()).then_some(x)
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
        transform_points(&src_points, &rotation, &translation, 1.0, &mut dst_points);

        assert_eq!(dst_points, src_points);
    }

    #[test]
    fn test_transform_points_roundtrip() {
        let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
        let rotation = [[1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]];
        let translation = [1.0, 2.0, 3.0];
        let scale = 2.0;

        let mut dst_points = vec![[0.0; 3]; src_points.len()];
        transform_points(&src_points, &rotation, &translation, scale, &mut dst_points);

        // x = R^T * (y - t) / s
        let rotation_inv = transpose_mat33(&rotation);
        let translation_inv = scale3(&mat33_mul_vec3(&rotation_inv, &translation), -1.0 / scale);

        let mut dst_points_src = vec![[0.0; 3]; dst_points.len()];
        transform_points(
            &dst_points,
            &rotation_inv,
            &translation_inv,
            1.0 / scale,
            &mut dst_points_src,
        );

        for (res, exp) in dst_points_src.iter().zip(src_points.iter()) {
            for i in 0..3 {
                assert_relative_eq!(res[i], exp[i], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_matmul33() {
        let a = [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];
        let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let mut m = [[0.0; 3]; 3];
        matmul33(&a, &identity, &mut m);
        assert_eq!(m, a);

        matmul33(&a, &a, &mut m);
        assert_eq!(m[0], [30.0, 36.0, 42.0]);
        assert_eq!(m[2], [102.0, 126.0, 150.0]);
    }

    #[test]
    fn test_inverse_mat33() {
        let m = [[2.0, 0.0, 1.0], [1.0, 3.0, 0.0], [0.0, 1.0, 4.0]];
        let inv = inverse_mat33(&m, 1e-12).expect("matrix is invertible");
        let mut product = [[0.0; 3]; 3];
        matmul33(&m, &inv, &mut product);
        for (i, row) in product.iter().enumerate() {
            for (j, val) in row.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(*val, expected, epsilon = 1e-12);
            }
        }

        let singular = [[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 1.0, 0.0]];
        assert!(inverse_mat33(&singular, 1e-12).is_none());
    }

    #[test]
    fn test_centroid() {
        let points = vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        assert_eq!(centroid(&points), [2.5, 3.5, 4.5]);
        assert_eq!(centroid(&[]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cross_vec3() {
        assert_eq!(
            cross_vec3(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]),
            [0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_cholesky_solve6() {
        // diagonally dominant, symmetric
        let mut a = [[0.5; 6]; 6];
        for (i, row) in a.iter_mut().enumerate() {
            row[i] = 10.0 + i as f64;
        }
        let x_expected = [1.0, -2.0, 0.5, 3.0, -1.5, 0.25];
        let mut b = [0.0; 6];
        for i in 0..6 {
            b[i] = (0..6).map(|j| a[i][j] * x_expected[j]).sum();
        }

        let x = cholesky_solve6(&a, &b).expect("system is positive definite");
        for i in 0..6 {
            assert_relative_eq!(x[i], x_expected[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_cholesky_solve6_singular() {
        // zero block on the rotation part of the system
        let mut a = [[0.0; 6]; 6];
        for (i, row) in a.iter_mut().enumerate().take(3) {
            row[i] = 1.0;
        }
        let b = [1.0, 1.0, 1.0, 0.0, 0.0, 0.0];
        assert!(cholesky_solve6(&a, &b).is_none());
    }
}
