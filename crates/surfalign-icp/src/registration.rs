use rand::Rng;
use surfalign_3d::{transforms, NearestPointOracle, Point3, PointCloud};

use crate::{
    config::RegistrationConfig,
    multi_start::{multi_start, MultiStartReport, Perturbation},
    params::{RigidParams, SimilarityParams},
    scale::{self, CenteringFrame},
    solver::{self, BlockReport, SolveReport},
    RegistrationError,
};

/// Registration of a fixed source point set onto target surfaces.
///
/// The source and its centered copy are computed once at construction. Every solve
/// reads the configuration at its start and owns all its working state, so the same
/// object can be solved against many targets.
///
/// Example:
///
/// ```
/// use surfalign_3d::PointSetOracle;
/// use surfalign_icp::{PoseParameters, Registration, RigidParams};
///
/// let source = vec![
///     [0.0, 0.0, 0.0],
///     [1.0, 0.0, 0.0],
///     [0.0, 1.0, 0.0],
///     [0.0, 0.0, 1.0],
///     [1.0, 1.0, 0.5],
///     [0.3, 0.8, 1.2],
///     [1.5, 0.2, 0.7],
///     [0.6, 1.4, 0.1],
///     [1.1, 0.9, 1.6],
/// ];
/// let truth = RigidParams::new([0.05, -0.02, 0.03], [0.0, 0.0, 0.01]);
/// let target = PointSetOracle::new(truth.transform_points(&source)).unwrap();
///
/// let mut registration = Registration::new(&source).unwrap();
/// registration.set_chi2(1e-8);
/// registration.set_max_error(1e-6);
///
/// let mut params = RigidParams::identity();
/// let error = registration.solve_rigid(&target, &mut params, 20).unwrap();
/// assert!(error < 1e-4);
/// ```
#[derive(Debug, Clone)]
pub struct Registration {
    source: PointCloud,
    centered_source: PointCloud,
    frame: CenteringFrame,
    config: RegistrationConfig,
}

impl Registration {
    /// Create the registration from any points implementing [`Point3`].
    ///
    /// # Errors
    ///
    /// [`RegistrationError::InvalidInput`] for an empty set or non-finite coordinates.
    pub fn new<P: Point3>(points: &[P]) -> Result<Self, RegistrationError> {
        Self::from_pointcloud(PointCloud::from_points(points))
    }

    /// Create the registration from a point cloud.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::InvalidInput`] for an empty cloud or non-finite coordinates.
    pub fn from_pointcloud(source: PointCloud) -> Result<Self, RegistrationError> {
        if source.is_empty() {
            return Err(RegistrationError::InvalidInput(
                "source point cloud is empty".to_string(),
            ));
        }
        if !source.is_finite() {
            return Err(RegistrationError::InvalidInput(
                "source point cloud has non-finite coordinates".to_string(),
            ));
        }

        let (centered_source, centroid) = source.centered();
        log::debug!(
            "Registration source with {} points, centroid {:?}",
            source.len(),
            centroid
        );

        Ok(Self {
            source,
            centered_source,
            frame: CenteringFrame::new(centroid),
            config: RegistrationConfig::default(),
        })
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: RegistrationConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Get the configuration for modification.
    pub fn config_mut(&mut self) -> &mut RegistrationConfig {
        &mut self.config
    }

    /// Get the summed squared residual threshold.
    pub fn chi2(&self) -> f64 {
        self.config.chi2
    }

    /// Set the summed squared residual threshold.
    pub fn set_chi2(&mut self, chi2: f64) {
        self.config.chi2 = chi2;
    }

    /// Get the worst-point residual threshold.
    pub fn max_error(&self) -> f64 {
        self.config.max_error
    }

    /// Set the worst-point residual threshold.
    pub fn set_max_error(&mut self, max_error: f64) {
        self.config.max_error = max_error;
    }

    /// Get the source points.
    pub fn source(&self) -> &PointCloud {
        &self.source
    }

    /// Get the source points shifted by minus their centroid.
    pub fn centered_source(&self) -> &PointCloud {
        &self.centered_source
    }

    /// Get the centroid of the source.
    pub fn centroid(&self) -> [f64; 3] {
        self.frame.centroid()
    }

    /// Rotation `Rx(rx) * Ry(ry) * Rz(rz)` as used by every solve.
    pub fn rotation_matrix(&self, rx: f64, ry: f64, rz: f64) -> [[f64; 3]; 3] {
        transforms::euler_xyz_to_rotation_matrix(&[rx, ry, rz])
    }

    fn perturbation(&self) -> Perturbation {
        Perturbation {
            translation: self.config.translation_perturbation,
            rotation: self.config.rotation_perturbation,
        }
    }

    /// Rigid solve with the configured generator.
    ///
    /// `params` is the initial guess and receives the best estimate. Returns the lowest
    /// block error of the solve.
    pub fn solve_rigid<O>(
        &self,
        oracle: &O,
        params: &mut RigidParams,
        iterations: usize,
    ) -> Result<f64, RegistrationError>
    where
        O: NearestPointOracle + ?Sized,
    {
        let mut rng = self.config.rng();
        self.solve_rigid_with_rng(oracle, params, iterations, &mut rng)
            .map(|report| report.best_error)
    }

    /// Rigid solve with a caller-supplied generator.
    pub fn solve_rigid_with_rng<O, R>(
        &self,
        oracle: &O,
        params: &mut RigidParams,
        iterations: usize,
        rng: &mut R,
    ) -> Result<SolveReport, RegistrationError>
    where
        O: NearestPointOracle + ?Sized,
        R: Rng + ?Sized,
    {
        self.solve_rigid_traced(oracle, params, iterations, rng, |_| {})
    }

    /// Rigid solve calling `observer` after every block.
    pub fn solve_rigid_traced<O, R, F>(
        &self,
        oracle: &O,
        params: &mut RigidParams,
        iterations: usize,
        rng: &mut R,
        observer: F,
    ) -> Result<SolveReport, RegistrationError>
    where
        O: NearestPointOracle + ?Sized,
        R: Rng + ?Sized,
        F: FnMut(&BlockReport<RigidParams>),
    {
        solver::solve_rigid(
            &self.config,
            oracle,
            self.source.points(),
            params,
            iterations,
            rng,
            observer,
        )
    }

    /// Scale-aware solve with the configured generator.
    ///
    /// The scale of `params` is usually `1` on entry.
    pub fn solve_similarity<O>(
        &self,
        oracle: &O,
        params: &mut SimilarityParams,
        iterations: usize,
    ) -> Result<f64, RegistrationError>
    where
        O: NearestPointOracle + ?Sized,
    {
        let mut rng = self.config.rng();
        self.solve_similarity_with_rng(oracle, params, iterations, &mut rng)
            .map(|report| report.best_error)
    }

    /// Scale-aware solve with a caller-supplied generator.
    pub fn solve_similarity_with_rng<O, R>(
        &self,
        oracle: &O,
        params: &mut SimilarityParams,
        iterations: usize,
        rng: &mut R,
    ) -> Result<SolveReport, RegistrationError>
    where
        O: NearestPointOracle + ?Sized,
        R: Rng + ?Sized,
    {
        self.solve_similarity_traced(oracle, params, iterations, rng, |_| {})
    }

    /// Scale-aware solve calling `observer` after every block.
    ///
    /// The reported parameters are expressed in the centered frame.
    pub fn solve_similarity_traced<O, R, F>(
        &self,
        oracle: &O,
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
        scale::solve_similarity(
            &self.config,
            oracle,
            &self.frame,
            self.centered_source.points(),
            params,
            iterations,
            rng,
            observer,
        )
    }

    /// Best of a rigid solve from `params` and `restarts` perturbed rigid solves.
    pub fn solve_rigid_multi_start<O>(
        &self,
        oracle: &O,
        params: &mut RigidParams,
        iterations: usize,
    ) -> Result<f64, RegistrationError>
    where
        O: NearestPointOracle + ?Sized,
    {
        let mut rng = self.config.rng();
        self.solve_rigid_multi_start_with_rng(oracle, params, iterations, &mut rng)
            .map(|report| report.best_error)
    }

    /// Rigid multi-start search with a caller-supplied generator.
    pub fn solve_rigid_multi_start_with_rng<O, R>(
        &self,
        oracle: &O,
        params: &mut RigidParams,
        iterations: usize,
        rng: &mut R,
    ) -> Result<MultiStartReport, RegistrationError>
    where
        O: NearestPointOracle + ?Sized,
        R: Rng + ?Sized,
    {
        multi_start(
            params,
            self.config.restarts,
            self.perturbation(),
            rng,
            |candidate, rng| self.solve_rigid_with_rng(oracle, candidate, iterations, rng),
        )
    }

    /// Best of a scale-aware solve from `params` and `restarts` perturbed ones.
    ///
    /// Restarts perturb translation and rotation only.
    pub fn solve_similarity_multi_start<O>(
        &self,
        oracle: &O,
        params: &mut SimilarityParams,
        iterations: usize,
    ) -> Result<f64, RegistrationError>
    where
        O: NearestPointOracle + ?Sized,
    {
        let mut rng = self.config.rng();
        self.solve_similarity_multi_start_with_rng(oracle, params, iterations, &mut rng)
            .map(|report| report.best_error)
    }

    /// Scale-aware multi-start search with a caller-supplied generator.
    pub fn solve_similarity_multi_start_with_rng<O, R>(
        &self,
        oracle: &O,
        params: &mut SimilarityParams,
        iterations: usize,
        rng: &mut R,
    ) -> Result<MultiStartReport, RegistrationError>
    where
        O: NearestPointOracle + ?Sized,
        R: Rng + ?Sized,
    {
        multi_start(
            params,
            self.config.restarts,
            self.perturbation(),
            rng,
            |candidate, rng| self.solve_similarity_with_rng(oracle, candidate, iterations, rng),
        )
    }
}
