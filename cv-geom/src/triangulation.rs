use cv_core::{
    nalgebra::{Matrix3x4, Matrix4x3, Point2, Point3, Vector2, Vector4},
    Observation, Pose, Projective, Triangulation, TriangulatorPair, WorldPoint,
};
use num_traits::Float;

/// Solver settings for the least squares step. These are not exposed since the
/// system is only `4x3` and always converges quickly.
const SVD_EPSILON: f64 = 1e-12;
const SVD_ITERATIONS: usize = 1000;

/// The two projection matrices of a pair and the normalized image coordinates of one feature.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProjectionPair {
    pub first: Matrix3x4<f64>,
    pub second: Matrix3x4<f64>,
    pub a: Point2<f64>,
    pub b: Point2<f64>,
}

impl ProjectionPair {
    pub fn new(
        first: Matrix3x4<f64>,
        second: Matrix3x4<f64>,
        a: Point2<f64>,
        b: Point2<f64>,
    ) -> Self {
        Self {
            first,
            second,
            a,
            b,
        }
    }

    /// The projective depths `P.row(2) * X` of the point in both cameras.
    ///
    /// For a rigid camera matrix `[R|t]` this is the `z` coordinate of the point in that
    /// camera, so a positive value means the point lies in front of it.
    pub fn depths(&self, point: Point3<f64>) -> Vector2<f64> {
        let homogeneous = point.to_homogeneous();
        Vector2::new(
            self.first.row(2).dot(&homogeneous.transpose()),
            self.second.row(2).dot(&homogeneous.transpose()),
        )
    }
}

/// Iterative linear triangulation, called Iterative-LS by Hartley and Sturm in the paper
/// ["Triangulation"](https://users.cecs.anu.edu.au/~hartley/Papers/triangulation/triangulation.pdf).
///
/// Each camera contributes the two equations `(x * P.row(2) - P.row(0)) X = 0` and
/// `(y * P.row(2) - P.row(1)) X = 0`. Fixing `X = (x, y, z, 1)` turns these into a `4x3`
/// inhomogeneous least squares problem. Solving it directly minimizes an algebraic error
/// that is biased towards points that are far away from a camera. To counter that, every
/// row is divided by the projective depth of the current estimate in its camera and the
/// system is solved again. This repeats until both depths stop changing by more than
/// `epsilon` or `max_iterations` re-weightings were done.
///
/// ```
/// use cv_core::nalgebra::{Point2, Point3, Rotation3, Vector3};
/// use cv_core::{Observation, Pose, Projective, TriangulatorPair, WorldPoint, WorldToCamera};
/// use cv_geom::triangulation::IterativeLinearTriangulator;
///
/// let point = WorldPoint::from_point(Point3::new(0.3, 0.1, 2.0));
/// let second = WorldToCamera::from_parts(Vector3::new(-1.0, 0.1, 0.1), Rotation3::new(Vector3::new(0.1, 0.1, 0.1)));
/// let project = |pose: WorldToCamera| {
///     Point2::from_homogeneous(pose.transform(point).bearing_unnormalized()).unwrap()
/// };
/// let triangulated = IterativeLinearTriangulator::new()
///     .triangulate_pair(
///         Observation::new(WorldToCamera::identity(), project(WorldToCamera::identity())),
///         Observation::new(second, project(second)),
///     )
///     .unwrap();
/// let distance = (point.point().unwrap() - triangulated.point.point().unwrap()).norm();
/// assert!(distance < 1e-6);
/// assert!(triangulated.converged);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct IterativeLinearTriangulator {
    epsilon: f64,
    max_iterations: usize,
}

impl IterativeLinearTriangulator {
    /// Creates an `IterativeLinearTriangulator` with default values.
    ///
    /// Same as calling [`Default::default`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the largest change of the depth weights at which the iteration is considered converged.
    ///
    /// Default is `1e-4`.
    #[must_use]
    pub fn epsilon(self, epsilon: f64) -> Self {
        Self { epsilon, ..self }
    }

    /// Set the maximum number of re-weighting steps.
    ///
    /// Default is `10`.
    #[must_use]
    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// Solves the linear system with every row of camera `i` divided by `weights[i]`.
    ///
    /// Returns `None` if a weight is zero or not finite, or if the solver fails.
    pub fn solve(&self, pair: &ProjectionPair, weights: Vector2<f64>) -> Option<Point3<f64>> {
        if weights
            .iter()
            .any(|&w| !w.is_finite() || Float::abs(w) < f64::EPSILON)
        {
            return None;
        }

        let mut system = Matrix4x3::zeros();
        let mut rhs = Vector4::zeros();
        let views = [
            (&pair.first, pair.a, weights.x),
            (&pair.second, pair.b, weights.y),
        ];
        for (view, (projection, observed, weight)) in views.iter().enumerate() {
            for (axis, &coordinate) in [observed.x, observed.y].iter().enumerate() {
                let row = (projection.row(2) * coordinate - projection.row(axis)) / *weight;
                system
                    .row_mut(2 * view + axis)
                    .copy_from(&row.fixed_columns::<3>(0));
                rhs[2 * view + axis] = -row[3];
            }
        }

        let solution = system
            .try_svd(true, true, SVD_EPSILON, SVD_ITERATIONS)?
            .solve(&rhs, SVD_EPSILON)
            .ok()?;
        let point = Point3::from(solution);
        point.iter().all(|n| n.is_finite()).then(|| point)
    }

    /// One re-weighting step.
    ///
    /// Computes the depths of `point` and compares them with the `weights` it was solved with.
    /// If both changed by no more than `epsilon`, the input is returned unchanged, which is the
    /// fixed point of this function. Otherwise the system is solved again with the new depths.
    pub fn refine(
        &self,
        pair: &ProjectionPair,
        point: Point3<f64>,
        weights: Vector2<f64>,
    ) -> Option<(Point3<f64>, Vector2<f64>)> {
        if self.is_settled(pair, point, weights) {
            Some((point, weights))
        } else {
            let depths = pair.depths(point);
            self.solve(pair, depths).map(|point| (point, depths))
        }
    }

    /// Checks that the depths of `point` are within `epsilon` of the `weights` it was solved with.
    pub fn is_settled(
        &self,
        pair: &ProjectionPair,
        point: Point3<f64>,
        weights: Vector2<f64>,
    ) -> bool {
        (pair.depths(point) - weights)
            .iter()
            .all(|&delta| Float::abs(delta) <= self.epsilon)
    }

    /// Triangulates the pair and reports whether the weights settled within `max_iterations`.
    ///
    /// If a re-weighting step fails, the last good estimate is returned.
    pub fn triangulate_with_status(&self, pair: &ProjectionPair) -> Option<(Point3<f64>, bool)> {
        let mut weights = Vector2::repeat(1.0);
        let mut point = self.solve(pair, weights)?;
        for _ in 0..self.max_iterations {
            match self.refine(pair, point, weights) {
                Some((_, next)) if next == weights => return Some((point, true)),
                Some((next_point, next)) => {
                    point = next_point;
                    weights = next;
                }
                None => break,
            }
        }
        // The last re-solve may have settled without another step to observe it.
        let converged = self.is_settled(pair, point, weights);
        Some((point, converged))
    }
}

impl Default for IterativeLinearTriangulator {
    fn default() -> Self {
        Self {
            epsilon: 1e-4,
            max_iterations: 10,
        }
    }
}

impl TriangulatorPair for IterativeLinearTriangulator {
    fn triangulate_pair(&self, a: Observation, b: Observation) -> Option<Triangulation> {
        let pair = ProjectionPair::new(a.pose.matrix(), b.pose.matrix(), a.point, b.point);
        self.triangulate_with_status(&pair)
            .map(|(point, converged)| Triangulation {
                point: WorldPoint::from_point(point),
                converged,
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use cv_core::{
        nalgebra::{Rotation3, Vector3},
        WorldToCamera,
    };
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    fn pair_for(point: Point3<f64>) -> ProjectionPair {
        let first = WorldToCamera::identity();
        let second =
            WorldToCamera::from_parts(Vector3::new(-1.0, 0.0, 0.0), Rotation3::identity());
        let project = |pose: WorldToCamera| {
            let camera = pose.transform(WorldPoint::from_point(point));
            Point2::from_homogeneous(camera.bearing_unnormalized()).unwrap()
        };
        ProjectionPair::new(first.matrix(), second.matrix(), project(first), project(second))
    }

    #[test]
    fn unweighted_solve_recovers_noiseless_point() {
        let point = Point3::new(0.5, -0.25, 6.0);
        let solved = IterativeLinearTriangulator::new()
            .solve(&pair_for(point), Vector2::repeat(1.0))
            .unwrap();
        assert_relative_eq!(solved, point, epsilon = 1e-9);
    }

    #[test]
    fn refine_fixed_point_keeps_weights() {
        let point = Point3::new(0.5, -0.25, 6.0);
        let pair = pair_for(point);
        let triangulator = IterativeLinearTriangulator::new();
        let depths = pair.depths(point);
        assert_eq!(
            triangulator.refine(&pair, point, depths),
            Some((point, depths))
        );
        let (refined, weights) = triangulator
            .refine(&pair, point, Vector2::repeat(1.0))
            .unwrap();
        assert_eq!(weights, depths);
        assert_relative_eq!(refined, point, epsilon = 1e-9);
    }

    #[test]
    fn zero_weight_is_rejected() {
        let pair = pair_for(Point3::new(0.0, 0.0, 3.0));
        let triangulator = IterativeLinearTriangulator::new();
        assert_eq!(triangulator.solve(&pair, Vector2::new(0.0, 1.0)), None);
        assert_eq!(triangulator.solve(&pair, Vector2::new(1.0, f64::NAN)), None);
    }

    #[test]
    fn iteration_cap_reports_divergence() {
        let point = Point3::new(0.5, -0.25, 6.0);
        let (triangulated, converged) = IterativeLinearTriangulator::new()
            .max_iterations(0)
            .triangulate_with_status(&pair_for(point))
            .unwrap();
        assert!(!converged);
        assert_relative_eq!(triangulated, point, epsilon = 1e-9);
    }

    #[test]
    fn settling_on_the_last_step_is_converged() {
        let point = Point3::new(0.5, -0.25, 6.0);
        let (triangulated, converged) = IterativeLinearTriangulator::new()
            .max_iterations(1)
            .triangulate_with_status(&pair_for(point))
            .unwrap();
        assert!(converged);
        assert_relative_eq!(triangulated, point, epsilon = 1e-9);
    }

    #[test]
    fn random_points_round_trip() {
        let mut rng = SmallRng::seed_from_u64(0);
        let triangulator = IterativeLinearTriangulator::new();
        for _ in 0..100 {
            let point = Point3::new(
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-2.0..2.0),
                rng.gen_range(2.0..10.0),
            );
            let (triangulated, converged) = triangulator
                .triangulate_with_status(&pair_for(point))
                .unwrap();
            assert!(converged);
            assert_relative_eq!(triangulated, point, epsilon = 1e-6);
        }
    }

    #[test]
    fn point_behind_camera_has_negative_depth() {
        let point = Point3::new(0.1, 0.2, -4.0);
        let pair = pair_for(point);
        let (triangulated, _) = IterativeLinearTriangulator::new()
            .triangulate_with_status(&pair)
            .unwrap();
        let depths = pair.depths(triangulated);
        assert!(depths.x < 0.0 && depths.y < 0.0);
    }
}
