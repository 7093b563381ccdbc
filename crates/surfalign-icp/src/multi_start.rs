use rand::Rng;

use crate::{params::PoseParameters, solver::SolveReport, RegistrationError};

/// Summary of a multi-start search.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiStartReport {
    /// Lowest error over all runs.
    pub best_error: f64,
    /// Index of the run that produced the result, `0` being the unperturbed guess.
    pub best_run: usize,
    /// Reports of every run, in order.
    pub runs: Vec<SolveReport>,
    /// Restarts abandoned on a failed linear solve. Their entry in `runs` has an
    /// infinite error.
    pub failed_runs: Vec<usize>,
}

/// Half-widths of the uniform offsets added to the initial guess of a restart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perturbation {
    /// Translation offsets are drawn from `[-translation, translation]` per axis.
    pub translation: f64,
    /// Rotation offsets are drawn from `[-rotation, rotation]` radians per axis.
    pub rotation: f64,
}

impl Perturbation {
    /// Draw a translation and a rotation offset.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ([f64; 3], [f64; 3]) {
        let translation = [(); 3].map(|_| rng.random_range(-self.translation..=self.translation));
        let rotation = [(); 3].map(|_| rng.random_range(-self.rotation..=self.rotation));
        (translation, rotation)
    }
}

/// Run `solve` from `params`, then `restarts` more times from randomly perturbed copies
/// of the same initial guess, keeping the run with the strictly lowest error.
///
/// The perturbations are drawn from `rng` after the first run, so the first run is
/// identical to a single solve with the same generator. On return `params` holds the
/// parameters of the best run.
///
/// A restart failing with [`RegistrationError::NumericalFailure`] is recorded in
/// `failed_runs` and the search goes on. Any other error, and every error of the first
/// run, is returned; `params` then holds the best run finished so far, or the initial
/// guess when the first run failed.
pub fn multi_start<P, R, S>(
    params: &mut P,
    restarts: usize,
    perturbation: Perturbation,
    rng: &mut R,
    mut solve: S,
) -> Result<MultiStartReport, RegistrationError>
where
    P: PoseParameters,
    R: Rng + ?Sized,
    S: FnMut(&mut P, &mut R) -> Result<SolveReport, RegistrationError>,
{
    let initial = *params;

    let first = solve(params, rng)?;
    let mut report = MultiStartReport {
        best_error: first.best_error,
        best_run: 0,
        runs: vec![first],
        failed_runs: Vec::new(),
    };

    for run in 1..=restarts {
        let (translation, rotation) = perturbation.sample(rng);
        let mut candidate = initial;
        candidate.perturb(&translation, &rotation);

        let run_report = match solve(&mut candidate, rng) {
            Ok(run_report) => run_report,
            Err(RegistrationError::NumericalFailure { iteration, block }) => {
                log::warn!(
                    "Restart {} abandoned: singular step at iteration {} block {}",
                    run,
                    iteration,
                    block
                );
                report.failed_runs.push(run);
                report.runs.push(SolveReport {
                    best_error: f64::INFINITY,
                    iterations: iteration + 1,
                    converged: false,
                    skipped_steps: 0,
                });
                continue;
            }
            Err(err) => return Err(err),
        };
        log::debug!(
            "Restart {}: error {:.6} (best {:.6})",
            run,
            run_report.best_error,
            report.best_error
        );

        if run_report.best_error < report.best_error {
            report.best_error = run_report.best_error;
            report.best_run = run;
            *params = candidate;
        }
        report.runs.push(run_report);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RigidParams;
    use rand::{rngs::StdRng, SeedableRng};

    fn report(best_error: f64) -> SolveReport {
        SolveReport {
            best_error,
            iterations: 1,
            converged: false,
            skipped_steps: 0,
        }
    }

    #[test]
    fn test_perturbation_bounds() {
        let perturbation = Perturbation {
            translation: 1.0,
            rotation: 0.06,
        };
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let (t, r) = perturbation.sample(&mut rng);
            assert!(t.iter().all(|v| v.abs() <= 1.0));
            assert!(r.iter().all(|v| v.abs() <= 0.06));
        }
    }

    #[test]
    fn test_keeps_strictly_better_runs() -> Result<(), RegistrationError> {
        let perturbation = Perturbation {
            translation: 1.0,
            rotation: 0.06,
        };
        let mut rng = StdRng::seed_from_u64(11);
        let mut params = RigidParams::identity();
        let mut starts = Vec::new();
        let errors = [0.5, 0.7, 0.2, 0.2, 0.9];
        let mut calls = 0;

        let result = multi_start(&mut params, 4, perturbation, &mut rng, |p, _| {
            starts.push(*p);
            // the solve moves the parameters so the adopted ones are recognizable
            p.translation[2] += 10.0 * calls as f64;
            let r = report(errors[calls]);
            calls += 1;
            Ok(r)
        })?;

        assert_eq!(calls, 5);
        assert_eq!(result.best_error, 0.2);
        assert_eq!(result.best_run, 2);
        assert_eq!(result.runs.len(), 5);
        assert_eq!(params.translation[2], starts[2].translation[2] + 20.0);

        // every restart is drawn around the original guess
        assert_eq!(starts[0], RigidParams::identity());
        for start in &starts[1..] {
            assert!(start.translation.iter().all(|v| v.abs() <= 1.0));
            assert!(start.angles.iter().all(|v| v.abs() <= 0.06));
        }
        Ok(())
    }

    #[test]
    fn test_first_run_error_propagates() {
        let perturbation = Perturbation {
            translation: 1.0,
            rotation: 0.06,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let mut params = RigidParams::identity();
        let result = multi_start(&mut params, 3, perturbation, &mut rng, |_, _| {
            Err(RegistrationError::InvalidInput("no source".to_string()))
        });
        assert!(matches!(result, Err(RegistrationError::InvalidInput(_))));
    }

    #[test]
    fn test_failed_restart_keeps_the_finished_runs() -> Result<(), RegistrationError> {
        let perturbation = Perturbation {
            translation: 1.0,
            rotation: 0.06,
        };
        let mut rng = StdRng::seed_from_u64(5);
        let mut params = RigidParams::identity();
        let mut calls = 0;

        let result = multi_start(&mut params, 3, perturbation, &mut rng, |p, _| {
            calls += 1;
            match calls {
                1 => {
                    p.translation = [1.0, 2.0, 3.0];
                    Ok(report(0.4))
                }
                2 => Err(RegistrationError::NumericalFailure {
                    iteration: 2,
                    block: 1,
                }),
                3 => Ok(report(0.1)),
                _ => Ok(report(0.8)),
            }
        })?;

        assert_eq!(calls, 4);
        assert_eq!(result.failed_runs, vec![1]);
        assert_eq!(result.runs.len(), 4);
        assert!(result.runs[1].best_error.is_infinite());
        assert_eq!(result.runs[1].iterations, 3);
        assert_eq!(result.best_run, 2);
        assert_eq!(result.best_error, 0.1);
        Ok(())
    }

    #[test]
    fn test_oracle_error_in_restart_propagates() {
        let perturbation = Perturbation {
            translation: 1.0,
            rotation: 0.06,
        };
        let mut rng = StdRng::seed_from_u64(5);
        let mut params = RigidParams::identity();
        let mut calls = 0;

        let result = multi_start(&mut params, 3, perturbation, &mut rng, |p, _| {
            calls += 1;
            if calls == 1 {
                p.translation = [1.0, 2.0, 3.0];
                Ok(report(0.4))
            } else {
                Err(surfalign_3d::OracleError::EmptyTarget.into())
            }
        });

        assert!(matches!(
            result,
            Err(RegistrationError::CorrespondenceFailure(_))
        ));
        // the first run stays in place
        assert_eq!(params.translation, [1.0, 2.0, 3.0]);
    }
}
