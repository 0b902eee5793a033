use crate::{WorldPoint, WorldToCamera};
use nalgebra::Point2;

/// One camera's view of a feature: the pose of the camera and the normalized
/// image coordinate (on the virtual image plane at `z = 1`) of the feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub pose: WorldToCamera,
    pub point: Point2<f64>,
}

impl Observation {
    pub fn new(pose: WorldToCamera, point: Point2<f64>) -> Self {
        Self { pose, point }
    }
}

/// The output of a triangulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangulation {
    pub point: WorldPoint,
    /// `false` if an iterative method stopped at its iteration cap rather than at its tolerance.
    ///
    /// Direct methods always report `true`.
    pub converged: bool,
}

/// This trait is for algorithms which triangulate a point from the two observations of a pair.
pub trait TriangulatorPair {
    fn triangulate_pair(&self, a: Observation, b: Observation) -> Option<Triangulation>;
}
