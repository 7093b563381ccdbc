use surfalign_3d::OracleError;

/// Error types for the registration module.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// The input points or the configuration cannot be used for a solve.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The damped normal equations could not be solved.
    #[error("numerical failure in the linear solve (iteration {iteration}, block {block})")]
    NumericalFailure {
        /// Outer iteration in which the solve failed.
        iteration: usize,
        /// Block index inside the outer iteration.
        block: usize,
    },

    /// The nearest-point query failed.
    #[error("correspondence search failed")]
    CorrespondenceFailure(#[from] OracleError),
}
