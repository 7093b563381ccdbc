#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Linear algebra utilities.
pub mod linalg;

/// Nearest-point queries against target geometry.
pub mod oracle;

/// Point cloud types and traits.
pub mod pointcloud;

/// 3D rotation primitives and their derivatives.
pub mod transforms;

pub use oracle::{NearestPoint, NearestPointOracle, OracleError, PointSetOracle, TriangleMeshOracle};
pub use pointcloud::{LabeledPoint, Point3, PointCloud};
