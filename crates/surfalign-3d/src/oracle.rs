use kiddo::{immutable::float::kdtree::ImmutableKdTree, SquaredEuclidean};

use crate::linalg;

/// Error types for nearest-point queries.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The target geometry has no points to query against.
    #[error("target geometry is empty")]
    EmptyTarget,

    /// The target mesh is malformed.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    /// The query point has NaN or infinite coordinates.
    #[error("query point {0:?} is not finite")]
    NonFiniteQuery([f64; 3]),
}

/// The answer of a nearest-point query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPoint {
    /// The closest point on the target geometry.
    pub point: [f64; 3],
    /// The distance from the query to `point`.
    ///
    /// Signed (negative behind the surface) when the geometry is oriented.
    pub distance: f64,
}

/// Closest-point queries against a fixed target geometry.
///
/// Implementations are expected to be cheap to query repeatedly, typically backed
/// by a spatial index built once at construction.
pub trait NearestPointOracle {
    /// Find the point of the target geometry closest to `query`.
    fn nearest_point(&self, query: &[f64; 3]) -> Result<NearestPoint, OracleError>;
}

impl<T: NearestPointOracle + ?Sized> NearestPointOracle for &T {
    fn nearest_point(&self, query: &[f64; 3]) -> Result<NearestPoint, OracleError> {
        (**self).nearest_point(query)
    }
}

impl<T: NearestPointOracle + ?Sized> NearestPointOracle for Box<T> {
    fn nearest_point(&self, query: &[f64; 3]) -> Result<NearestPoint, OracleError> {
        (**self).nearest_point(query)
    }
}

fn check_query(query: &[f64; 3]) -> Result<(), OracleError> {
    if query.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(OracleError::NonFiniteQuery(*query))
    }
}

/// Nearest point of a target point set, backed by a kd-tree.
pub struct PointSetOracle {
    points: Vec<[f64; 3]>,
    kdtree: ImmutableKdTree<f64, u32, 3, 32>,
}

impl PointSetOracle {
    /// Build the kd-tree over the target points.
    pub fn new(points: Vec<[f64; 3]>) -> Result<Self, OracleError> {
        if points.is_empty() {
            return Err(OracleError::EmptyTarget);
        }
        let kdtree = ImmutableKdTree::new_from_slice(&points);
        Ok(Self { points, kdtree })
    }

    /// Get the target points.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }
}

impl NearestPointOracle for PointSetOracle {
    fn nearest_point(&self, query: &[f64; 3]) -> Result<NearestPoint, OracleError> {
        check_query(query)?;
        let nn = self.kdtree.nearest_one::<SquaredEuclidean>(query);
        Ok(NearestPoint {
            point: self.points[nn.item as usize],
            distance: nn.distance.sqrt(),
        })
    }
}

/// Exact closest point on a triangle mesh.
///
/// Triangle centroids are indexed in a kd-tree. A query first measures the distance
/// `d` to the triangle of the nearest centroid, then only visits triangles whose
/// centroid lies within `d + r`, where `r` is the largest centroid-to-vertex distance
/// of the mesh. No triangle outside that ball can be closer than `d`.
pub struct TriangleMeshOracle {
    vertices: Vec<[f64; 3]>,
    faces: Vec<[usize; 3]>,
    kdtree: ImmutableKdTree<f64, u32, 3, 32>,
    max_radius: f64,
}

impl TriangleMeshOracle {
    /// Build the oracle from mesh vertices and triangle index triples.
    pub fn new(vertices: Vec<[f64; 3]>, faces: Vec<[usize; 3]>) -> Result<Self, OracleError> {
        if vertices.is_empty() || faces.is_empty() {
            return Err(OracleError::EmptyTarget);
        }

        if let Some(face) = faces.iter().find(|f| f.iter().any(|&i| i >= vertices.len())) {
            return Err(OracleError::InvalidMesh(format!(
                "face {:?} references a vertex out of range (#vertices = {})",
                face,
                vertices.len()
            )));
        }

        let mut max_radius: f64 = 0.0;
        let centroids = faces
            .iter()
            .map(|f| {
                let tri = [vertices[f[0]], vertices[f[1]], vertices[f[2]]];
                let c = linalg::centroid(&tri);
                for v in tri.iter() {
                    max_radius = max_radius.max(linalg::squared_norm3(&linalg::sub3(v, &c)).sqrt());
                }
                c
            })
            .collect::<Vec<_>>();

        let kdtree = ImmutableKdTree::new_from_slice(&centroids);

        Ok(Self {
            vertices,
            faces,
            kdtree,
            max_radius,
        })
    }

    /// Get the number of triangles of the mesh.
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    fn triangle(&self, face_idx: usize) -> [[f64; 3]; 3] {
        let f = self.faces[face_idx];
        [self.vertices[f[0]], self.vertices[f[1]], self.vertices[f[2]]]
    }

    // closest point of a single face and its squared distance to the query
    fn closest_on_face(&self, query: &[f64; 3], face_idx: usize) -> ([f64; 3], f64) {
        let [a, b, c] = self.triangle(face_idx);
        let p = closest_point_on_triangle(query, &a, &b, &c);
        (p, linalg::squared_norm3(&linalg::sub3(query, &p)))
    }
}

impl NearestPointOracle for TriangleMeshOracle {
    fn nearest_point(&self, query: &[f64; 3]) -> Result<NearestPoint, OracleError> {
        check_query(query)?;

        let seed = self.kdtree.nearest_one::<SquaredEuclidean>(query);
        let mut best_face = seed.item as usize;
        let (mut best_point, mut best_dist2) = self.closest_on_face(query, best_face);

        let radius = best_dist2.sqrt() + self.max_radius;
        for candidate in self
            .kdtree
            .within_unsorted::<SquaredEuclidean>(query, radius * radius)
        {
            let face_idx = candidate.item as usize;
            if face_idx == best_face {
                continue;
            }
            let (point, dist2) = self.closest_on_face(query, face_idx);
            if dist2 < best_dist2 {
                best_face = face_idx;
                best_point = point;
                best_dist2 = dist2;
            }
        }

        // sign the distance with the winding of the closest face
        let [a, b, c] = self.triangle(best_face);
        let normal = linalg::cross_vec3(&linalg::sub3(&b, &a), &linalg::sub3(&c, &a));
        let side = linalg::dot_product3(&linalg::sub3(query, &best_point), &normal);
        let distance = if side < 0.0 {
            -best_dist2.sqrt()
        } else {
            best_dist2.sqrt()
        };

        Ok(NearestPoint {
            point: best_point,
            distance,
        })
    }
}

/// Closest point on the triangle `(a, b, c)` to a query point.
///
/// Classifies the query against the Voronoi regions of the triangle's vertices,
/// edges and face.
pub fn closest_point_on_triangle(
    query: &[f64; 3],
    a: &[f64; 3],
    b: &[f64; 3],
    c: &[f64; 3],
) -> [f64; 3] {
    let ab = linalg::sub3(b, a);
    let ac = linalg::sub3(c, a);

    let ap = linalg::sub3(query, a);
    let d1 = linalg::dot_product3(&ab, &ap);
    let d2 = linalg::dot_product3(&ac, &ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = linalg::sub3(query, b);
    let d3 = linalg::dot_product3(&ab, &bp);
    let d4 = linalg::dot_product3(&ac, &bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return linalg::add3(a, &linalg::scale3(&ab, v));
    }

    let cp = linalg::sub3(query, c);
    let d5 = linalg::dot_product3(&ab, &cp);
    let d6 = linalg::dot_product3(&ac, &cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return linalg::add3(a, &linalg::scale3(&ac, w));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return linalg::add3(b, &linalg::scale3(&linalg::sub3(c, b), w));
    }

    // inside the face
    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    linalg::add3(
        a,
        &linalg::add3(&linalg::scale3(&ab, v), &linalg::scale3(&ac, w)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::Rng;

    // unit cube split into 12 outward-facing triangles
    fn unit_cube() -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
        let vertices = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ];
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [1, 2, 6],
            [1, 6, 5],
            [2, 3, 7],
            [2, 7, 6],
            [3, 0, 4],
            [3, 4, 7],
        ];
        (vertices, faces)
    }

    #[test]
    fn test_point_set_oracle() -> Result<(), OracleError> {
        let oracle = PointSetOracle::new(vec![[1.0, 0.0, 0.0], [1.0, 1.0, 0.0]])?;

        let nn = oracle.nearest_point(&[0.0, 0.0, 0.0])?;
        assert_eq!(nn.point, [1.0, 0.0, 0.0]);
        assert_relative_eq!(nn.distance, 1.0);

        let nn = oracle.nearest_point(&[1.0, 1.0, 0.0])?;
        assert_eq!(nn.point, [1.0, 1.0, 0.0]);
        assert_relative_eq!(nn.distance, 0.0);
        Ok(())
    }

    #[test]
    fn test_point_set_oracle_errors() {
        assert!(matches!(
            PointSetOracle::new(vec![]),
            Err(OracleError::EmptyTarget)
        ));

        let oracle = PointSetOracle::new(vec![[0.0; 3]]).expect("non-empty target");
        assert!(matches!(
            oracle.nearest_point(&[f64::NAN, 0.0, 0.0]),
            Err(OracleError::NonFiniteQuery(_))
        ));
    }

    #[test]
    fn test_closest_point_on_triangle_regions() {
        let (a, b, c) = ([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);

        // face interior
        let p = closest_point_on_triangle(&[0.2, 0.3, 5.0], &a, &b, &c);
        assert_relative_eq!(p[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(p[1], 0.3, epsilon = 1e-12);
        assert_relative_eq!(p[2], 0.0, epsilon = 1e-12);

        // vertex regions
        assert_eq!(closest_point_on_triangle(&[-1.0, -1.0, 0.0], &a, &b, &c), a);
        assert_eq!(closest_point_on_triangle(&[2.0, -0.5, 1.0], &a, &b, &c), b);
        assert_eq!(closest_point_on_triangle(&[-0.5, 2.0, 0.0], &a, &b, &c), c);

        // edge regions
        let p = closest_point_on_triangle(&[0.5, -1.0, 0.0], &a, &b, &c);
        assert_eq!(p, [0.5, 0.0, 0.0]);
        let p = closest_point_on_triangle(&[1.0, 1.0, 0.0], &a, &b, &c);
        assert_relative_eq!(p[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(p[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_mesh_oracle_signed_distance() -> Result<(), OracleError> {
        let (vertices, faces) = unit_cube();
        let oracle = TriangleMeshOracle::new(vertices, faces)?;
        assert_eq!(oracle.num_faces(), 12);

        // above the top face
        let nn = oracle.nearest_point(&[0.3, 0.4, 1.5])?;
        assert_relative_eq!(nn.point[0], 0.3, epsilon = 1e-12);
        assert_relative_eq!(nn.point[1], 0.4, epsilon = 1e-12);
        assert_relative_eq!(nn.point[2], 1.0, epsilon = 1e-12);
        assert_relative_eq!(nn.distance, 0.5, epsilon = 1e-12);

        // inside, closest to the x = 1 face
        let nn = oracle.nearest_point(&[0.9, 0.5, 0.5])?;
        assert_relative_eq!(nn.point[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(nn.distance, -0.1, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_mesh_oracle_matches_brute_force() -> Result<(), OracleError> {
        let (vertices, faces) = unit_cube();
        let oracle = TriangleMeshOracle::new(vertices.clone(), faces.clone())?;

        let mut rng = rand::rng();
        for _ in 0..200 {
            let query = [
                rng.random_range(-1.0..2.0),
                rng.random_range(-1.0..2.0),
                rng.random_range(-1.0..2.0),
            ];
            let brute = faces
                .iter()
                .map(|f| {
                    let p = closest_point_on_triangle(
                        &query,
                        &vertices[f[0]],
                        &vertices[f[1]],
                        &vertices[f[2]],
                    );
                    linalg::squared_norm3(&linalg::sub3(&query, &p)).sqrt()
                })
                .fold(f64::INFINITY, f64::min);

            let nn = oracle.nearest_point(&query)?;
            assert_relative_eq!(nn.distance.abs(), brute, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_mesh_oracle_invalid() {
        let res = TriangleMeshOracle::new(vec![[0.0; 3]; 3], vec![[0, 1, 3]]);
        assert!(matches!(res, Err(OracleError::InvalidMesh(_))));
        let res = TriangleMeshOracle::new(vec![], vec![]);
        assert!(matches!(res, Err(OracleError::EmptyTarget)));
    }
}
