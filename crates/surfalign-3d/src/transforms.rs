use std::f64::consts::PI;

use crate::linalg;

/// Error types for the transforms module.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    /// The three source vectors do not span the space.
    #[error("source vectors are linearly dependent (det = {0})")]
    SingularBasis(f64),
}

/// Elementary rotation about the x axis.
pub fn rot_x(angle: f64) -> [[f64; 3]; 3] {
    let (s, c) = angle.sin_cos();
    [[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]]
}

/// Elementary rotation about the y axis.
pub fn rot_y(angle: f64) -> [[f64; 3]; 3] {
    let (s, c) = angle.sin_cos();
    [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]]
}

/// Elementary rotation about the z axis.
pub fn rot_z(angle: f64) -> [[f64; 3]; 3] {
    let (s, c) = angle.sin_cos();
    [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

/// Derivative of [`rot_x`] with respect to the angle.
pub fn drot_x(angle: f64) -> [[f64; 3]; 3] {
    let (s, c) = angle.sin_cos();
    [[0.0, 0.0, 0.0], [0.0, -s, -c], [0.0, c, -s]]
}

/// Derivative of [`rot_y`] with respect to the angle.
pub fn drot_y(angle: f64) -> [[f64; 3]; 3] {
    let (s, c) = angle.sin_cos();
    [[-s, 0.0, c], [0.0, 0.0, 0.0], [-c, 0.0, -s]]
}

/// Derivative of [`rot_z`] with respect to the angle.
pub fn drot_z(angle: f64) -> [[f64; 3]; 3] {
    let (s, c) = angle.sin_cos();
    [[-s, -c, 0.0], [c, -s, 0.0], [0.0, 0.0, 0.0]]
}

/// Compose the rotation `R = Rx(rx) * Ry(ry) * Rz(rz)`.
///
/// # Arguments
///
/// * `angles` - The euler angles `[rx, ry, rz]` in radians.
///
/// Example:
///
/// ```
/// use surfalign_3d::transforms::euler_xyz_to_rotation_matrix;
///
/// let rotation = euler_xyz_to_rotation_matrix(&[0.0, 0.0, 0.0]);
/// assert_eq!(rotation, [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
/// ```
pub fn euler_xyz_to_rotation_matrix(angles: &[f64; 3]) -> [[f64; 3]; 3] {
    linalg::matmul333(&rot_x(angles[0]), &rot_y(angles[1]), &rot_z(angles[2]))
}

/// Partial derivatives of `Rx(rx) * Ry(ry) * Rz(rz)` with respect to each angle.
///
/// Each matrix replaces exactly one elementary factor with its derivative:
/// `[DRx * Ry * Rz, Rx * DRy * Rz, Rx * Ry * DRz]`.
pub fn euler_xyz_derivatives(angles: &[f64; 3]) -> [[[f64; 3]; 3]; 3] {
    let (rx, ry, rz) = (rot_x(angles[0]), rot_y(angles[1]), rot_z(angles[2]));
    [
        linalg::matmul333(&drot_x(angles[0]), &ry, &rz),
        linalg::matmul333(&rx, &drot_y(angles[1]), &rz),
        linalg::matmul333(&rx, &ry, &drot_z(angles[2])),
    ]
}

/// Recover the euler angles `[rx, ry, rz]` of a rotation `R = Rx * Ry * Rz`.
///
/// The middle angle lies in `[-pi/2, pi/2]`. At gimbal lock (`|ry| = pi/2`) the
/// z angle is set to zero and the whole in-plane rotation is assigned to x.
pub fn rotation_matrix_to_euler_xyz(rotation: &[[f64; 3]; 3]) -> [f64; 3] {
    let sy = rotation[0][2].clamp(-1.0, 1.0);
    let ry = sy.asin();

    if sy.abs() < 1.0 - 1e-12 {
        let rx = (-rotation[1][2]).atan2(rotation[2][2]);
        let rz = (-rotation[0][1]).atan2(rotation[0][0]);
        [rx, ry, rz]
    } else {
        let rx = rotation[2][1].atan2(rotation[1][1]);
        [rx, ry, 0.0]
    }
}

/// Wrap an angle into the half-open interval `(-pi, pi]`.
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.sin().atan2(angle.cos());
    if wrapped <= -PI {
        PI
    } else {
        wrapped
    }
}

/// Compute the linear map sending three source vectors onto three target vectors.
///
/// The vectors are stacked as columns, `S = [s0 s1 s2]` and `D = [d0 d1 d2]`, and the
/// map is `M = D * S^-1`. For exact rigid data `M` is a rotation matrix.
///
/// # Arguments
///
/// * `src` - The three source vectors.
/// * `dst` - The three target vectors.
///
/// # Returns
///
/// The matrix `M` and its euler angles `[rx, ry, rz]` for the X-Y-Z composition.
pub fn rotation_from_three_vectors(
    src: &[[f64; 3]; 3],
    dst: &[[f64; 3]; 3],
) -> Result<([[f64; 3]; 3], [f64; 3]), GeometryError> {
    // rows of the input are the vectors, so the transposes hold them as columns
    let src_cols = linalg::transpose_mat33(src);
    let dst_cols = linalg::transpose_mat33(dst);

    let src_inv = linalg::inverse_mat33(&src_cols, 1e-12)
        .ok_or_else(|| GeometryError::SingularBasis(linalg::det_mat33(&src_cols)))?;

    let mut rotation = [[0.0; 3]; 3];
    linalg::matmul33(&dst_cols, &src_inv, &mut rotation);

    let angles = rotation_matrix_to_euler_xyz(&rotation);

    Ok((rotation, angles))
}
