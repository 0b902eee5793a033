use crate::{CameraIntrinsics, EssentialMatrix};
use cv_core::{
    nalgebra::{Matrix3, Vector3},
    sample_consensus::Model,
    FeatureMatch, KeyPoint,
};
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use num_traits::Float;

/// The fundamental matrix relates the pixel coordinates of two images:
///
/// transpose(x') * F * x = 0
///
/// Where `x` is a homogeneous pixel coordinate in the first image and `x'` its match in
/// the second image. Unlike the [`EssentialMatrix`], it needs no knowledge of the cameras,
/// which is why it is the matrix estimated from raw keypoint matches.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
pub struct FundamentalMatrix(pub Matrix3<f64>);

impl FundamentalMatrix {
    /// Builds the fundamental matrix `K2^-T E K1^-1` that an essential matrix induces
    /// between two cameras.
    pub fn from_essential(
        essential: EssentialMatrix,
        first: &CameraIntrinsics,
        second: &CameraIntrinsics,
    ) -> Self {
        Self(second.inverse_matrix().transpose() * essential.0 * first.inverse_matrix())
    }

    /// Lifts the fundamental matrix to the essential matrix `K2^T F K1`.
    ///
    /// ```
    /// use cv_core::{CameraToCamera, Pose};
    /// use cv_core::nalgebra::{Rotation3, Vector3};
    /// use cv_pinhole::{CameraIntrinsics, EssentialMatrix, FundamentalMatrix};
    /// let k = CameraIntrinsics::guess_from_dimensions(640, 480);
    /// let essential = EssentialMatrix::from(CameraToCamera::from_parts(
    ///     Vector3::new(1.0, 0.0, 0.0),
    ///     Rotation3::identity(),
    /// ));
    /// let fundamental = FundamentalMatrix::from_essential(essential, &k, &k);
    /// assert!((fundamental.essential(&k, &k).0 - essential.0).norm() < 1e-9);
    /// ```
    pub fn essential(&self, first: &CameraIntrinsics, second: &CameraIntrinsics) -> EssentialMatrix {
        EssentialMatrix(second.matrix().transpose() * self.0 * first.matrix())
    }

    /// The epipolar line `F x` in the second image of a point in the first image.
    pub fn epipolar_line_second(&self, first: KeyPoint) -> Vector3<f64> {
        self.0 * first.homogeneous()
    }

    /// The epipolar line `F* x'` in the first image of a point in the second image.
    pub fn epipolar_line_first(&self, second: KeyPoint) -> Vector3<f64> {
        self.0.tr_mul(&second.homogeneous())
    }

    /// The larger of the two pixel distances between each keypoint of the match and the
    /// epipolar line of the other keypoint.
    ///
    /// A degenerate line (for instance from the zero matrix) yields infinity.
    pub fn epipolar_distance(&self, data: &FeatureMatch<KeyPoint>) -> f64 {
        let &FeatureMatch(first, second) = data;
        let first_distance = line_distance(self.epipolar_line_first(second), first);
        let second_distance = line_distance(self.epipolar_line_second(first), second);
        first_distance.max(second_distance)
    }
}

fn line_distance(line: Vector3<f64>, point: KeyPoint) -> f64 {
    let norm = Float::sqrt(line.x * line.x + line.y * line.y);
    let distance = Float::abs(line.dot(&point.homogeneous())) / norm;
    if distance.is_nan() {
        f64::INFINITY
    } else {
        distance
    }
}

impl Model<FeatureMatch<KeyPoint>> for FundamentalMatrix {
    fn residual(&self, data: &FeatureMatch<KeyPoint>) -> f64 {
        self.epipolar_distance(data)
    }
}
