#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Configuration of the registration solves.
pub mod config;

mod error;
pub use error::RegistrationError;

/// Multi-start search over perturbed initial guesses.
pub mod multi_start;

/// Residuals, jacobians and damped normal equations.
pub mod normal_equations;

/// Rigid and similarity parameter vectors.
pub mod params;

/// Registration of a source point set.
pub mod registration;

/// Scale-aware solve over the centered source.
pub mod scale;

/// Batched Levenberg-Marquardt solver.
pub mod solver;

pub use config::{RegistrationConfig, SolveFailurePolicy};
pub use multi_start::MultiStartReport;
pub use params::{PoseParameters, RigidParams, SimilarityParams};
pub use registration::Registration;
pub use solver::{BestSnapshot, BlockReport, SolveReport};
