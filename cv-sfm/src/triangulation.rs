use cv_core::{
    nalgebra::Point3, CameraModel, Correspondence, KeyPoint, Pose, Projective, WorldPoint,
    WorldToCamera,
};
use cv_geom::triangulation::{IterativeLinearTriangulator, ProjectionPair};
use cv_pinhole::{CameraIntrinsics, NormalizedKeyPoint};
use log::*;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// A triangulated point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudPoint {
    /// The point in the frame of the reference camera.
    pub point: Point3<f64>,
    /// The correspondence the point was triangulated from.
    pub correspondence: Correspondence,
    /// The pixel distance between the reprojection of the point and its keypoint in the reference image.
    pub error: f64,
    /// Whether the point has positive depth in both cameras.
    pub in_front: bool,
    /// Whether the depth weights settled before the iteration cap.
    pub converged: bool,
}

/// An append-only collection of [`CloudPoint`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<CloudPoint>,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, point: CloudPoint) {
        self.points.push(point);
    }

    /// Appends all points of `other`.
    pub fn merge(&mut self, other: PointCloud) {
        self.points.extend(other.points);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, CloudPoint> {
        self.points.iter()
    }

    pub fn points(&self) -> &[CloudPoint] {
        &self.points
    }

    /// The fraction of points in front of both cameras, or `0.0` for an empty cloud.
    pub fn in_front_fraction(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.iter().filter(|p| p.in_front).count() as f64 / self.len() as f64
    }

    /// The mean reprojection error, or `0.0` for an empty cloud.
    pub fn mean_error(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.iter().map(|p| p.error).sum::<f64>() / self.len() as f64
    }

    /// The number of points whose triangulation hit the iteration cap.
    pub fn diverged(&self) -> usize {
        self.iter().filter(|p| !p.converged).count()
    }
}

impl FromIterator<CloudPoint> for PointCloud {
    fn from_iter<I: IntoIterator<Item = CloudPoint>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PointCloud {
    type Item = CloudPoint;
    type IntoIter = std::vec::IntoIter<CloudPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a> IntoIterator for &'a PointCloud {
    type Item = &'a CloudPoint;
    type IntoIter = core::slice::Iter<'a, CloudPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// One camera of a pair: where it is and how it maps rays to pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View<'a> {
    pub pose: WorldToCamera,
    pub intrinsics: CameraIntrinsics,
    pub keypoints: &'a [KeyPoint],
}

impl<'a> View<'a> {
    pub fn new(
        pose: WorldToCamera,
        intrinsics: CameraIntrinsics,
        keypoints: &'a [KeyPoint],
    ) -> Self {
        Self {
            pose,
            intrinsics,
            keypoints,
        }
    }

    /// Checks that `point` has positive depth in this camera.
    pub fn is_in_front(&self, point: Point3<f64>) -> bool {
        self.pose
            .transform(WorldPoint::from_point(point))
            .is_in_front()
    }

    /// The pixel that `point` projects to, if it does not lie on the camera plane.
    pub fn project(&self, point: Point3<f64>) -> Option<KeyPoint> {
        let camera = self.pose.transform(WorldPoint::from_point(point));
        NormalizedKeyPoint::from_camera_point(camera)
            .filter(|keypoint| keypoint.iter().all(|n| n.is_finite()))
            .map(|keypoint| self.intrinsics.uncalibrate(keypoint))
    }
}

/// Triangulates every correspondence of an image pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangulator {
    pub triangulator: IterativeLinearTriangulator,
}

impl Triangulator {
    pub fn new(triangulator: IterativeLinearTriangulator) -> Self {
        Self { triangulator }
    }

    /// Triangulates a single correspondence.
    ///
    /// The point is reprojected into the first view to measure its error. Returns `None`
    /// if a keypoint index is out of bounds or the linear system cannot be solved.
    pub fn triangulate_one(
        &self,
        a: &View<'_>,
        b: &View<'_>,
        correspondence: Correspondence,
    ) -> Option<CloudPoint> {
        let keypoint_a = *a.keypoints.get(correspondence.query)?;
        let keypoint_b = *b.keypoints.get(correspondence.train)?;
        let pair = ProjectionPair::new(
            a.pose.matrix(),
            b.pose.matrix(),
            a.intrinsics.calibrate(keypoint_a).0,
            b.intrinsics.calibrate(keypoint_b).0,
        );
        let (point, converged) = self.triangulator.triangulate_with_status(&pair)?;
        let error = a
            .project(point)
            .map_or(f64::INFINITY, |reprojection| reprojection.distance(&keypoint_a));
        Some(CloudPoint {
            point,
            correspondence,
            error,
            in_front: a.is_in_front(point) && b.is_in_front(point),
            converged,
        })
    }

    /// Triangulates all `correspondences`, skipping the ones that fail.
    ///
    /// Points are computed in parallel when the `rayon` feature is enabled, each worker
    /// collecting into its own buffer. The cloud keeps the order of `correspondences`.
    pub fn triangulate(
        &self,
        a: &View<'_>,
        b: &View<'_>,
        correspondences: &[Correspondence],
    ) -> PointCloud {
        #[cfg(not(feature = "rayon"))]
        let cloud: PointCloud = correspondences
            .iter()
            .filter_map(|&correspondence| self.triangulate_one(a, b, correspondence))
            .collect();
        #[cfg(feature = "rayon")]
        let cloud: PointCloud = correspondences
            .par_iter()
            .filter_map(|&correspondence| self.triangulate_one(a, b, correspondence))
            .collect::<Vec<_>>()
            .into_iter()
            .collect();

        let skipped = correspondences.len() - cloud.len();
        if skipped != 0 {
            debug!("failed to triangulate {} correspondences", skipped);
        }
        cloud
    }
}

impl Default for Triangulator {
    fn default() -> Self {
        Self::new(IterativeLinearTriangulator::new())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use cv_core::nalgebra::{Rotation3, Vector3};

    fn point(x: f64, y: f64, z: f64, in_front: bool, error: f64) -> CloudPoint {
        CloudPoint {
            point: Point3::new(x, y, z),
            correspondence: Correspondence::new(0, 0, 0.0),
            error,
            in_front,
            converged: true,
        }
    }

    #[test]
    fn cloud_statistics() {
        let mut cloud = PointCloud::new();
        assert_eq!(cloud.in_front_fraction(), 0.0);
        assert_eq!(cloud.mean_error(), 0.0);
        cloud.push(point(0.0, 0.0, 1.0, true, 1.0));
        cloud.push(point(0.0, 0.0, -1.0, false, 3.0));
        let other: PointCloud = vec![point(1.0, 1.0, 1.0, true, 2.0)].into_iter().collect();
        cloud.merge(other);
        assert_eq!(cloud.len(), 3);
        assert_relative_eq!(cloud.in_front_fraction(), 2.0 / 3.0);
        assert_relative_eq!(cloud.mean_error(), 2.0);
        assert_eq!(cloud.diverged(), 0);
    }

    #[test]
    fn out_of_bounds_correspondences_are_skipped() {
        let intrinsics = CameraIntrinsics::guess_from_dimensions(640, 480);
        let second =
            WorldToCamera::from_parts(Vector3::new(-1.0, 0.0, 0.0), Rotation3::identity());
        let truth = Point3::new(0.5, 0.25, 5.0);
        let keypoints_a = [View::new(WorldToCamera::identity(), intrinsics, &[])
            .project(truth)
            .unwrap()];
        let keypoints_b = [View::new(second, intrinsics, &[]).project(truth).unwrap()];
        let a = View::new(WorldToCamera::identity(), intrinsics, &keypoints_a);
        let b = View::new(second, intrinsics, &keypoints_b);

        let cloud = Triangulator::default().triangulate(
            &a,
            &b,
            &[
                Correspondence::new(0, 0, 0.0),
                Correspondence::new(1, 0, 0.0),
                Correspondence::new(0, 3, 0.0),
            ],
        );
        assert_eq!(cloud.len(), 1);
        let triangulated = cloud.points()[0];
        assert_relative_eq!(triangulated.point, truth, epsilon = 1e-6);
        assert!(triangulated.in_front);
        assert!(triangulated.error < 1e-6);
    }

    #[test]
    fn points_behind_either_camera_are_not_in_front() {
        let intrinsics = CameraIntrinsics::guess_from_dimensions(640, 480);
        // The second camera sits beyond the point, so it sees the point from behind.
        let second =
            WorldToCamera::from_parts(Vector3::new(0.0, 0.0, -6.0), Rotation3::identity());
        let truth = Point3::new(0.5, 0.25, 5.0);
        let first = View::new(WorldToCamera::identity(), intrinsics, &[]);
        assert!(first.is_in_front(truth));
        assert!(!View::new(second, intrinsics, &[]).is_in_front(truth));

        let keypoints_a = [first.project(truth).unwrap()];
        let keypoints_b = [View::new(second, intrinsics, &[]).project(truth).unwrap()];
        let a = View::new(WorldToCamera::identity(), intrinsics, &keypoints_a);
        let b = View::new(second, intrinsics, &keypoints_b);
        let triangulated = Triangulator::default()
            .triangulate_one(&a, &b, Correspondence::new(0, 0, 0.0))
            .unwrap();
        assert_relative_eq!(triangulated.point, truth, epsilon = 1e-6);
        assert!(!triangulated.in_front);
    }
}
