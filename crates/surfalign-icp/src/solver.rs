use std::ops::Range;

use rand::{seq::SliceRandom, Rng};
use surfalign_3d::{linalg, NearestPointOracle, OracleError};

use crate::{
    config::{RegistrationConfig, SolveFailurePolicy},
    normal_equations::NormalEquations,
    params::PoseParameters,
    RegistrationError,
};

/// Summary of a single solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    /// Lowest block error seen during the solve. Infinite when no block ran.
    pub best_error: f64,
    /// Number of outer iterations started.
    pub iterations: usize,
    /// Whether the convergence test stopped the solve.
    pub converged: bool,
    /// Number of blocks whose linear solve failed and whose step was skipped.
    pub skipped_steps: usize,
}

/// State of the solve after a block, passed to the observer of a traced solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockReport<P> {
    /// Outer iteration index.
    pub iteration: usize,
    /// Block index inside the outer iteration.
    pub block: usize,
    /// Damping that will be used for the next block.
    pub lambda: f64,
    /// Summed squared residual of the block.
    pub total_error: f64,
    /// Largest residual norm of the block.
    pub local_error: f64,
    /// Lowest block error seen so far, this block included.
    pub best_error: f64,
    /// Whether the Gauss-Newton step of the block was applied.
    pub step_applied: bool,
    /// Parameters after the update of the block.
    pub params: P,
}

/// Lowest-error parameters seen so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestSnapshot<P> {
    /// Error of the snapshot, infinite before any offer.
    pub error: f64,
    /// Parameters of the snapshot.
    pub params: P,
}

impl<P: Copy> BestSnapshot<P> {
    /// Start with no error recorded and `params` as fallback.
    pub fn new(params: P) -> Self {
        Self {
            error: f64::INFINITY,
            params,
        }
    }

    /// Keep `params` if `error` is strictly lower than the recorded one.
    pub fn offer(&mut self, error: f64, params: &P) -> bool {
        if error < self.error {
            self.error = error;
            self.params = *params;
            true
        } else {
            false
        }
    }
}

// adaptive damping of the blocks
#[derive(Debug)]
struct Damping {
    lambda: f64,
    previous_error: Option<f64>,
    max_lambda: f64,
    decrease: f64,
    increase: f64,
}

impl Damping {
    fn new(config: &RegistrationConfig) -> Self {
        Self {
            lambda: config.initial_lambda,
            previous_error: None,
            max_lambda: config.max_lambda,
            decrease: config.lambda_decrease,
            increase: config.lambda_increase,
        }
    }

    // no change on the first block of a solve
    fn update(&mut self, error: f64) {
        if let Some(previous) = self.previous_error {
            if error < previous {
                self.lambda /= self.decrease;
            } else if error > previous {
                self.penalize();
            }
        }
        self.previous_error = Some(error);
    }

    // a failed solve counts as a worsened block, whatever its error
    fn fail(&mut self, error: f64) {
        self.penalize();
        self.previous_error = Some(error);
    }

    fn penalize(&mut self) {
        self.lambda = (self.lambda * self.increase).min(self.max_lambda);
    }
}

/// Split `num_points` into `batch_count` contiguous blocks of `num_points / batch_count`
/// points, the last block taking the remainder. Empty blocks are dropped, keeping the
/// index of the remaining ones.
pub fn block_ranges(num_points: usize, batch_count: usize) -> Vec<(usize, Range<usize>)> {
    let step = num_points / batch_count.max(1);
    (0..batch_count)
        .map(|j| {
            let begin = step * j;
            let end = if j + 1 == batch_count {
                num_points
            } else {
                begin + step
            };
            (j, begin..end)
        })
        .filter(|(_, range)| !range.is_empty())
        .collect()
}

/// Match every source point, mapped by `params`, to its nearest point on the target.
pub fn find_correspondences<O, P>(
    oracle: &O,
    source: &[[f64; 3]],
    params: &P,
) -> Result<Vec<[f64; 3]>, OracleError>
where
    O: NearestPointOracle + ?Sized,
    P: PoseParameters,
{
    let mut transformed = vec![[0.0; 3]; source.len()];
    linalg::transform_points(
        source,
        &params.rotation_matrix(),
        &params.translation(),
        params.scale(),
        &mut transformed,
    );
    transformed
        .iter()
        .map(|p| oracle.nearest_point(p).map(|nn| nn.point))
        .collect()
}

/// Batched Levenberg-Marquardt iterations shared by the rigid and the scale-aware solves.
///
/// `after_step` runs after the update of every block and before the best snapshot is
/// taken; the scale-aware solve uses it to refresh the correspondences and the scale.
/// The source order is shuffled on a local copy after every outer iteration.
#[allow(clippy::too_many_arguments)]
pub(crate) fn levenberg_marquardt<P, O, R, H, F>(
    config: &RegistrationConfig,
    oracle: &O,
    source: &[[f64; 3]],
    initial: &P,
    iterations: usize,
    rng: &mut R,
    mut after_step: H,
    mut observer: F,
) -> Result<(BestSnapshot<P>, SolveReport), RegistrationError>
where
    P: PoseParameters,
    O: NearestPointOracle + ?Sized,
    R: Rng + ?Sized,
    H: FnMut(&O, &[[f64; 3]], &mut P, &mut Vec<[f64; 3]>) -> Result<(), RegistrationError>,
    F: FnMut(&BlockReport<P>),
{
    config.validate()?;
    if source.is_empty() {
        return Err(RegistrationError::InvalidInput(
            "cannot register an empty source".to_string(),
        ));
    }

    let mut source = source.to_vec();
    let mut params = *initial;
    let mut correspondences = find_correspondences(oracle, &source, &params)?;

    let blocks = block_ranges(source.len(), config.batch_count);
    let mut damping = Damping::new(config);
    let mut best = BestSnapshot::new(params);
    let mut report = SolveReport {
        best_error: f64::INFINITY,
        iterations: 0,
        converged: false,
        skipped_steps: 0,
    };

    'outer: for iteration in 0..iterations {
        report.iterations = iteration + 1;

        for (block, range) in blocks.iter() {
            let system = NormalEquations::build(
                &params,
                &source,
                &correspondences,
                range.clone(),
                damping.lambda,
            );
            let step_applied = match system.solve() {
                Some(dx) => {
                    damping.update(system.local_error);
                    params.apply_step(&dx);
                    true
                }
                None => match config.failure_policy {
                    SolveFailurePolicy::Abort => {
                        return Err(RegistrationError::NumericalFailure {
                            iteration,
                            block: *block,
                        });
                    }
                    SolveFailurePolicy::SkipStep => {
                        log::warn!(
                            "Skipping singular step at iteration {} block {}",
                            iteration,
                            block
                        );
                        damping.fail(system.local_error);
                        report.skipped_steps += 1;
                        false
                    }
                },
            };

            after_step(oracle, &source, &mut params, &mut correspondences)?;
            best.offer(system.local_error, &params);

            log::debug!(
                "Iteration: {} block: {} lambda: {:.3e} total: {:.6} local: {:.6} best: {:.6}",
                iteration,
                block,
                damping.lambda,
                system.total_error,
                system.local_error,
                best.error
            );

            observer(&BlockReport {
                iteration,
                block: *block,
                lambda: damping.lambda,
                total_error: system.total_error,
                local_error: system.local_error,
                best_error: best.error,
                step_applied,
                params,
            });

            if system.total_error < config.chi2 && system.local_error < config.max_error {
                report.converged = true;
                break 'outer;
            }
        }

        source.shuffle(rng);
        correspondences = find_correspondences(oracle, &source, &params)?;
    }

    report.best_error = best.error;
    log::debug!(
        "Solve finished after {} iterations, converged: {}, best error: {:.6}, skipped steps: {}",
        report.iterations,
        report.converged,
        report.best_error,
        report.skipped_steps
    );

    Ok((best, report))
}

/// Rigid solve over `source`, writing the best parameters back into `params`.
pub fn solve_rigid<O, R, F>(
    config: &RegistrationConfig,
    oracle: &O,
    source: &[[f64; 3]],
    params: &mut crate::RigidParams,
    iterations: usize,
    rng: &mut R,
    observer: F,
) -> Result<SolveReport, RegistrationError>
where
    O: NearestPointOracle + ?Sized,
    R: Rng + ?Sized,
    F: FnMut(&BlockReport<crate::RigidParams>),
{
    let (best, report) = levenberg_marquardt(
        config,
        oracle,
        source,
        &*params,
        iterations,
        rng,
        |_, _, _, _| Ok(()),
        observer,
    )?;
    *params = best.params;
    Ok(report)
}
