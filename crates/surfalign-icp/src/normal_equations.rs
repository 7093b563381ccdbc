use std::ops::Range;

use surfalign_3d::{linalg, transforms};

use crate::params::PoseParameters;

/// Damped Gauss-Newton system accumulated over a block of point pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalEquations {
    /// `sum(J^T J + lambda * diag(J^T J))`.
    pub a: [[f64; 6]; 6],
    /// `sum(-J^T r)`.
    pub b: [f64; 6],
    /// Sum of the squared residual norms.
    pub total_error: f64,
    /// Largest residual norm of the block.
    pub local_error: f64,
}

impl Default for NormalEquations {
    fn default() -> Self {
        Self {
            a: [[0.0; 6]; 6],
            b: [0.0; 6],
            total_error: 0.0,
            local_error: 0.0,
        }
    }
}

impl NormalEquations {
    /// Accumulate the system for the pairs `source[range]` / `targets[range]`.
    ///
    /// The residual of a pair is `s * R * p + t - q` and its 3x6 jacobian is the
    /// identity for the translation next to the scaled rotation derivatives
    /// `s * (dR/drx) * p`, `s * (dR/dry) * p`, `s * (dR/drz) * p`. An empty range gives
    /// an all-zero system.
    ///
    /// PRECONDITION: `range` is inside both `source` and `targets`.
    pub fn build<P: PoseParameters>(
        params: &P,
        source: &[[f64; 3]],
        targets: &[[f64; 3]],
        range: Range<usize>,
        lambda: f64,
    ) -> Self {
        let rotation = params.rotation_matrix();
        let derivatives = transforms::euler_xyz_derivatives(&params.angles());
        let translation = params.translation();
        let scale = params.scale();

        let mut system = Self::default();
        let mut max_squared = 0.0f64;

        for (p, q) in source[range.clone()].iter().zip(&targets[range]) {
            let r = residual(&rotation, &translation, scale, p, q);
            let jac = jacobian(&derivatives, scale, p);

            for i in 0..6 {
                for j in 0..6 {
                    let jtj = jac[0][i] * jac[0][j] + jac[1][i] * jac[1][j] + jac[2][i] * jac[2][j];
                    system.a[i][j] += if i == j { jtj * (1.0 + lambda) } else { jtj };
                }
                system.b[i] -= jac[0][i] * r[0] + jac[1][i] * r[1] + jac[2][i] * r[2];
            }

            let squared = linalg::squared_norm3(&r);
            system.total_error += squared;
            max_squared = max_squared.max(squared);
        }

        system.local_error = max_squared.sqrt();
        system
    }

    /// Solve `A * dx = B` with a Cholesky factorization.
    ///
    /// Returns `None` when `A` is not positive definite or the step is not finite.
    pub fn solve(&self) -> Option<[f64; 6]> {
        linalg::cholesky_solve6(&self.a, &self.b)
    }
}

/// Residual `s * R * p + t - q` of a point pair.
pub fn residual(
    rotation: &[[f64; 3]; 3],
    translation: &[f64; 3],
    scale: f64,
    p: &[f64; 3],
    q: &[f64; 3],
) -> [f64; 3] {
    let rotated = linalg::mat33_mul_vec3(rotation, p);
    linalg::sub3(&linalg::add3(&linalg::scale3(&rotated, scale), translation), q)
}

/// Row-major 3x6 jacobian of the residual of `p` with respect to
/// `[tx, ty, tz, rx, ry, rz]`.
pub fn jacobian(derivatives: &[[[f64; 3]; 3]; 3], scale: f64, p: &[f64; 3]) -> [[f64; 6]; 3] {
    let mut jac = [[0.0; 6]; 3];
    for (axis, derivative) in derivatives.iter().enumerate() {
        let column = linalg::scale3(&linalg::mat33_mul_vec3(derivative, p), scale);
        for (row, value) in column.iter().enumerate() {
            jac[row][3 + axis] = *value;
        }
    }
    for (row, jac_row) in jac.iter_mut().enumerate() {
        jac_row[row] = 1.0;
    }
    jac
}
