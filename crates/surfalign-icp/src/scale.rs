use rand::Rng;
use surfalign_3d::{linalg, NearestPointOracle};

use crate::{
    config::RegistrationConfig,
    params::{PoseParameters, SimilarityParams},
    solver::{find_correspondences, levenberg_marquardt, BlockReport, SolveReport},
    RegistrationError,
};

/// Translation shift between the original source frame and its centered copy.
///
/// With `c` the source centroid, `s * R * p + t == s * R * (p - c) + (t + s * R * c)`,
/// so a solve on the centered source starts from `t + s * R * c` and ends by removing
/// `s * R * c` again with the final rotation and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenteringFrame {
    centroid: [f64; 3],
}

impl CenteringFrame {
    /// Create the frame of a source with the given centroid.
    pub fn new(centroid: [f64; 3]) -> Self {
        Self { centroid }
    }

    /// Get the centroid removed from the source.
    pub fn centroid(&self) -> [f64; 3] {
        self.centroid
    }

    fn rotated_centroid(&self, params: &SimilarityParams) -> [f64; 3] {
        let rotated = linalg::mat33_mul_vec3(&params.rotation_matrix(), &self.centroid);
        linalg::scale3(&rotated, params.scale)
    }

    /// Express parameters of the original source in the centered frame.
    pub fn enter(&self, params: &mut SimilarityParams) {
        params.translation = linalg::add3(&params.translation, &self.rotated_centroid(params));
    }

    /// Express parameters of the centered frame in the original source frame.
    pub fn leave(&self, params: &mut SimilarityParams) {
        params.translation = linalg::sub3(&params.translation, &self.rotated_centroid(params));
    }
}

/// Closed-form update of the scale with rotation and translation held fixed.
///
/// Accumulates `a1 = sum((s * R * p)^T (t - q))` and `a2 = sum(|t - q|^2)` over the
/// centered points and their correspondences, then sets `s <- s * (-a2 / a1)`.
/// Returns `false` and leaves the scale untouched when `a1` vanishes.
pub fn refine_scale(
    centered_source: &[[f64; 3]],
    correspondences: &[[f64; 3]],
    params: &mut SimilarityParams,
) -> bool {
    let rotation = params.rotation_matrix();
    let mut a1 = 0.0f64;
    let mut a2 = 0.0f64;
    for (p, q) in centered_source.iter().zip(correspondences) {
        let moved = linalg::scale3(&linalg::mat33_mul_vec3(&rotation, p), params.scale);
        let offset = linalg::sub3(&params.translation, q);
        a1 += linalg::dot_product3(&moved, &offset);
        a2 += linalg::squared_norm3(&offset);
    }

    if a1.abs() < 1e-12 || !a1.is_finite() {
        log::warn!("Degenerate scale refinement (a1 = {a1:e}), keeping scale {}", params.scale);
        return false;
    }

    params.scale *= -a2 / a1;
    true
}

/// Scale-aware solve over the centered source.
///
/// `params` is read and written in the frame of the original, uncentered source.
#[allow(clippy::too_many_arguments)]
pub fn solve_similarity<O, R, F>(
    config: &RegistrationConfig,
    oracle: &O,
    frame: &CenteringFrame,
    centered_source: &[[f64; 3]],
    params: &mut SimilarityParams,
    iterations: usize,
    rng: &mut R,
    observer: F,
) -> Result<SolveReport, RegistrationError>
where
    O: NearestPointOracle + ?Sized,
    R: Rng + ?Sized,
    F: FnMut(&BlockReport<SimilarityParams>),
{
    let mut centered = *params;
    frame.enter(&mut centered);

    let (best, report) = levenberg_marquardt(
        config,
        oracle,
        centered_source,
        &centered,
        iterations,
        rng,
        |oracle, source, current, correspondences| {
            *correspondences = find_correspondences(oracle, source, &*current)?;
            refine_scale(source, correspondences, current);
            Ok(())
        },
        observer,
    )?;

    let mut result = best.params;
    frame.leave(&mut result);
    *params = result;

    log::debug!("Recovered scale: {:.6}", params.scale);

    Ok(report)
}
