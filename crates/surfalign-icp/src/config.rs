use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::RegistrationError;

/// What to do when the damped normal equations of a block cannot be solved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveFailurePolicy {
    /// Keep the current parameters and increase the damping as if the step worsened.
    #[default]
    SkipStep,
    /// Stop the solve with [`RegistrationError::NumericalFailure`].
    Abort,
}

/// Parameters controlling the registration solves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Convergence threshold on the summed squared residual of a block.
    pub chi2: f64,
    /// Convergence threshold on the largest residual norm of a block.
    pub max_error: f64,
    /// Number of blocks each outer iteration is split into.
    pub batch_count: usize,
    /// Damping factor at the start of a solve.
    pub initial_lambda: f64,
    /// Upper bound of the damping factor.
    pub max_lambda: f64,
    /// Divisor applied to the damping when a block improves on the previous one.
    pub lambda_decrease: f64,
    /// Factor applied to the damping when a block is worse than the previous one.
    pub lambda_increase: f64,
    /// Number of perturbed runs of the multi-start driver.
    pub restarts: usize,
    /// Half-width of the uniform translation perturbation.
    pub translation_perturbation: f64,
    /// Half-width of the uniform rotation perturbation, in radians.
    pub rotation_perturbation: f64,
    /// Reaction to a failed linear solve.
    pub failure_policy: SolveFailurePolicy,
    /// Seed of the random generator. Entropy from the OS when `None`.
    pub seed: Option<u64>,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            chi2: 0.75,
            max_error: 0.3,
            batch_count: 3,
            initial_lambda: 0.01,
            max_lambda: 1000.0,
            lambda_decrease: 3.0,
            lambda_increase: 2.0,
            restarts: 10,
            translation_perturbation: 1.0,
            rotation_perturbation: 0.06,
            failure_policy: SolveFailurePolicy::SkipStep,
            seed: None,
        }
    }
}

impl RegistrationConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the summed squared residual threshold.
    pub fn with_chi2(mut self, chi2: f64) -> Self {
        self.chi2 = chi2;
        self
    }

    /// Set the worst-point residual threshold.
    pub fn with_max_error(mut self, max_error: f64) -> Self {
        self.max_error = max_error;
        self
    }

    /// Set the number of blocks per outer iteration.
    pub fn with_batch_count(mut self, batch_count: usize) -> Self {
        self.batch_count = batch_count;
        self
    }

    /// Set the initial damping factor.
    pub fn with_initial_lambda(mut self, lambda: f64) -> Self {
        self.initial_lambda = lambda;
        self
    }

    /// Set the number of perturbed multi-start runs.
    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts;
        self
    }

    /// Set the half-widths of the multi-start perturbation.
    pub fn with_perturbation(mut self, translation: f64, rotation: f64) -> Self {
        self.translation_perturbation = translation;
        self.rotation_perturbation = rotation;
        self
    }

    /// Set the reaction to a failed linear solve.
    pub fn with_failure_policy(mut self, policy: SolveFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the seed of the random generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Create the random generator of a solve: seeded when `seed` is set.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    /// Check that the configuration describes a valid solve.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.batch_count == 0 {
            return Err(RegistrationError::InvalidInput(
                "batch_count must be at least 1".to_string(),
            ));
        }

        let positive = [
            ("initial_lambda", self.initial_lambda),
            ("max_lambda", self.max_lambda),
            ("lambda_decrease", self.lambda_decrease),
            ("lambda_increase", self.lambda_increase),
        ];
        if let Some((name, value)) = positive.iter().find(|(_, v)| !(v.is_finite() && *v > 0.0)) {
            return Err(RegistrationError::InvalidInput(format!(
                "{name} must be finite and positive, got {value}"
            )));
        }

        let non_negative = [
            ("translation_perturbation", self.translation_perturbation),
            ("rotation_perturbation", self.rotation_perturbation),
        ];
        if let Some((name, value)) = non_negative
            .iter()
            .find(|(_, v)| !(v.is_finite() && *v >= 0.0))
        {
            return Err(RegistrationError::InvalidInput(format!(
                "{name} must be finite and non-negative, got {value}"
            )));
        }

        if self.chi2.is_nan() || self.max_error.is_nan() {
            return Err(RegistrationError::InvalidInput(
                "convergence thresholds must not be NaN".to_string(),
            ));
        }

        Ok(())
    }
}
