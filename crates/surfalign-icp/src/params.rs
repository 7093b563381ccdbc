use serde::{Deserialize, Serialize};
use surfalign_3d::{linalg, transforms};

/// Shared view of the rigid and similarity parameter vectors.
///
/// The solver works on translation and X-Y-Z euler angles; the scale is read-only
/// from its point of view and defaults to one.
pub trait PoseParameters: Copy + std::fmt::Debug {
    /// The translation `[tx, ty, tz]`.
    fn translation(&self) -> [f64; 3];

    /// Mutable access to the translation.
    fn translation_mut(&mut self) -> &mut [f64; 3];

    /// The euler angles `[rx, ry, rz]` in radians.
    fn angles(&self) -> [f64; 3];

    /// Mutable access to the euler angles.
    fn angles_mut(&mut self) -> &mut [f64; 3];

    /// The uniform scale.
    fn scale(&self) -> f64 {
        1.0
    }

    /// The rotation `Rx(rx) * Ry(ry) * Rz(rz)`.
    fn rotation_matrix(&self) -> [[f64; 3]; 3] {
        transforms::euler_xyz_to_rotation_matrix(&self.angles())
    }

    /// Map a point with `s * R * p + t`.
    fn transform_point(&self, point: &[f64; 3]) -> [f64; 3] {
        let rotated = linalg::mat33_mul_vec3(&self.rotation_matrix(), point);
        linalg::add3(&linalg::scale3(&rotated, self.scale()), &self.translation())
    }

    /// Add a Gauss-Newton step `[dtx, dty, dtz, drx, dry, drz]` and wrap the angles
    /// into `(-pi, pi]`.
    fn apply_step(&mut self, dx: &[f64; 6]) {
        let translation = self.translation_mut();
        for (t, d) in translation.iter_mut().zip(&dx[..3]) {
            *t += d;
        }
        let angles = self.angles_mut();
        for (a, d) in angles.iter_mut().zip(&dx[3..]) {
            *a = transforms::normalize_angle(*a + d);
        }
    }

    /// Offset the translation and the angles, leaving the scale untouched.
    fn perturb(&mut self, translation: &[f64; 3], angles: &[f64; 3]) {
        let (t, a) = (self.translation(), self.angles());
        *self.translation_mut() = linalg::add3(&t, translation);
        *self.angles_mut() = linalg::add3(&a, angles);
    }

    /// Map every point with [`PoseParameters::transform_point`].
    fn transform_points(&self, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
        let mut dst = vec![[0.0; 3]; points.len()];
        linalg::transform_points(
            points,
            &self.rotation_matrix(),
            &self.translation(),
            self.scale(),
            &mut dst,
        );
        dst
    }
}

/// Rigid transform `(tx, ty, tz, rx, ry, rz)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RigidParams {
    /// Translation applied after the rotation.
    pub translation: [f64; 3],
    /// X-Y-Z euler angles in radians.
    pub angles: [f64; 3],
}

impl RigidParams {
    /// Create the parameters from a translation and euler angles.
    pub fn new(translation: [f64; 3], angles: [f64; 3]) -> Self {
        Self {
            translation,
            angles,
        }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create from the flat layout `[tx, ty, tz, rx, ry, rz]`.
    pub fn from_array(data: [f64; 6]) -> Self {
        let [tx, ty, tz, rx, ry, rz] = data;
        Self::new([tx, ty, tz], [rx, ry, rz])
    }

    /// The flat layout `[tx, ty, tz, rx, ry, rz]`.
    pub fn to_array(&self) -> [f64; 6] {
        let [tx, ty, tz] = self.translation;
        let [rx, ry, rz] = self.angles;
        [tx, ty, tz, rx, ry, rz]
    }
}

impl PoseParameters for RigidParams {
    fn translation(&self) -> [f64; 3] {
        self.translation
    }

    fn translation_mut(&mut self) -> &mut [f64; 3] {
        &mut self.translation
    }

    fn angles(&self) -> [f64; 3] {
        self.angles
    }

    fn angles_mut(&mut self) -> &mut [f64; 3] {
        &mut self.angles
    }
}

impl From<[f64; 6]> for RigidParams {
    fn from(data: [f64; 6]) -> Self {
        Self::from_array(data)
    }
}

/// Similarity transform `(tx, ty, tz, rx, ry, rz, s)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityParams {
    /// Translation applied after the scaled rotation.
    pub translation: [f64; 3],
    /// X-Y-Z euler angles in radians.
    pub angles: [f64; 3],
    /// Uniform scale.
    pub scale: f64,
}

impl Default for SimilarityParams {
    fn default() -> Self {
        Self::identity()
    }
}

impl SimilarityParams {
    /// Create the parameters from a translation, euler angles and a scale.
    pub fn new(translation: [f64; 3], angles: [f64; 3], scale: f64) -> Self {
        Self {
            translation,
            angles,
            scale,
        }
    }

    /// The identity transform, with unit scale.
    pub fn identity() -> Self {
        Self::new([0.0; 3], [0.0; 3], 1.0)
    }

    /// Create from the flat layout `[tx, ty, tz, rx, ry, rz, s]`.
    pub fn from_array(data: [f64; 7]) -> Self {
        let [tx, ty, tz, rx, ry, rz, s] = data;
        Self::new([tx, ty, tz], [rx, ry, rz], s)
    }

    /// The flat layout `[tx, ty, tz, rx, ry, rz, s]`.
    pub fn to_array(&self) -> [f64; 7] {
        let [tx, ty, tz] = self.translation;
        let [rx, ry, rz] = self.angles;
        [tx, ty, tz, rx, ry, rz, self.scale]
    }

    /// Drop the scale.
    pub fn rigid(&self) -> RigidParams {
        RigidParams::new(self.translation, self.angles)
    }
}

impl PoseParameters for SimilarityParams {
    fn translation(&self) -> [f64; 3] {
        self.translation
    }

    fn translation_mut(&mut self) -> &mut [f64; 3] {
        &mut self.translation
    }

    fn angles(&self) -> [f64; 3] {
        self.angles
    }

    fn angles_mut(&mut self) -> &mut [f64; 3] {
        &mut self.angles
    }

    fn scale(&self) -> f64 {
        self.scale
    }
}

impl From<[f64; 7]> for SimilarityParams {
    fn from(data: [f64; 7]) -> Self {
        Self::from_array(data)
    }
}

impl From<RigidParams> for SimilarityParams {
    fn from(params: RigidParams) -> Self {
        Self::new(params.translation, params.angles, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_flat_layout() {
        let params = RigidParams::from_array([1.0, 2.0, 3.0, 0.1, 0.2, 0.3]);
        assert_eq!(params.translation, [1.0, 2.0, 3.0]);
        assert_eq!(params.angles, [0.1, 0.2, 0.3]);
        assert_eq!(params.to_array(), [1.0, 2.0, 3.0, 0.1, 0.2, 0.3]);

        let params = SimilarityParams::from([1.0, 2.0, 3.0, 0.1, 0.2, 0.3, 1.5]);
        assert_eq!(params.scale, 1.5);
        assert_eq!(params.rigid().to_array(), [1.0, 2.0, 3.0, 0.1, 0.2, 0.3]);
        assert_eq!(SimilarityParams::default().scale, 1.0);
    }

    #[test]
    fn test_apply_step_wraps_angles() {
        let mut params = RigidParams::new([0.0; 3], [3.0, -3.0, 0.5]);
        params.apply_step(&[1.0, -1.0, 0.5, 0.5, -0.5, 0.1]);

        assert_eq!(params.translation, [1.0, -1.0, 0.5]);
        assert_relative_eq!(params.angles[0], 3.5 - 2.0 * PI, epsilon = 1e-12);
        assert_relative_eq!(params.angles[1], 2.0 * PI - 3.5, epsilon = 1e-12);
        assert_relative_eq!(params.angles[2], 0.6, epsilon = 1e-12);
        assert!(params.angles.iter().all(|a| *a > -PI && *a <= PI));
    }

    #[test]
    fn test_perturb_keeps_scale() {
        let mut params = SimilarityParams::new([1.0, 0.0, 0.0], [0.0; 3], 2.0);
        params.perturb(&[0.5, 0.5, 0.5], &[0.01, 0.02, 0.03]);
        assert_eq!(params.translation, [1.5, 0.5, 0.5]);
        assert_eq!(params.angles, [0.01, 0.02, 0.03]);
        assert_eq!(params.scale, 2.0);
    }

    #[test]
    fn test_transform_points() {
        let params = SimilarityParams::new([1.0, 0.0, 0.0], [0.0, 0.0, PI / 2.0], 2.0);
        let points = params.transform_points(&[[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        assert_relative_eq!(points[0][0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(points[0][1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(points[1][2], 2.0, epsilon = 1e-12);

        let rigid = params.rigid();
        let p = rigid.transform_point(&[1.0, 0.0, 0.0]);
        assert_relative_eq!(p[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], 1.0, epsilon = 1e-12);
    }
}
