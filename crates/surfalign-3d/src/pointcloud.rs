use serde::{Deserialize, Serialize};

use crate::linalg;

/// A type that can be read as a 3d point with `f64` coordinates.
///
/// Implemented for raw coordinate arrays and tuples, and for [`LabeledPoint`], so
/// that callers can feed their own point types without copying them first.
pub trait Point3 {
    /// The `[x, y, z]` coordinates of the point.
    fn xyz(&self) -> [f64; 3];
}

impl Point3 for [f64; 3] {
    #[inline]
    fn xyz(&self) -> [f64; 3] {
        *self
    }
}

impl Point3 for [f32; 3] {
    #[inline]
    fn xyz(&self) -> [f64; 3] {
        [self[0] as f64, self[1] as f64, self[2] as f64]
    }
}

impl Point3 for (f64, f64, f64) {
    #[inline]
    fn xyz(&self) -> [f64; 3] {
        [self.0, self.1, self.2]
    }
}

/// A 3d point carrying a user label, e.g. an anatomical landmark name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledPoint<L> {
    /// The label of the point.
    pub label: L,
    /// The position of the point.
    pub position: [f64; 3],
}

impl<L> LabeledPoint<L> {
    /// Create a new labeled point.
    pub fn new(label: L, position: [f64; 3]) -> Self {
        Self { label, position }
    }
}

impl<L> Point3 for LabeledPoint<L> {
    #[inline]
    fn xyz(&self) -> [f64; 3] {
        self.position
    }
}

/// An ordered set of 3d points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
}

impl PointCloud {
    /// Create a new point cloud from points.
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self { points }
    }

    /// Create a point cloud from any slice of [`Point3`] values.
    pub fn from_points<P: Point3>(points: &[P]) -> Self {
        Self {
            points: points.iter().map(Point3::xyz).collect(),
        }
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Consume the point cloud and return its points.
    pub fn into_points(self) -> Vec<[f64; 3]> {
        self.points
    }

    /// Check that every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.points.iter().flatten().all(|v| v.is_finite())
    }

    /// Get the arithmetic mean of the points. The origin for an empty cloud.
    pub fn centroid(&self) -> [f64; 3] {
        linalg::centroid(&self.points)
    }

    /// Return a copy of the cloud shifted so that its centroid is the origin,
    /// together with the centroid that was removed.
    pub fn centered(&self) -> (PointCloud, [f64; 3]) {
        let centroid = self.centroid();
        let points = self
            .points
            .iter()
            .map(|p| linalg::sub3(p, &centroid))
            .collect();
        (PointCloud { points }, centroid)
    }
}

impl From<Vec<[f64; 3]>> for PointCloud {
    fn from(points: Vec<[f64; 3]>) -> Self {
        Self::new(points)
    }
}
