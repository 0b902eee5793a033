//! This crate plugs into `cv-core` and provides the pinhole camera model along with the two
//! matrices of epipolar geometry. The [`CameraIntrinsics`] convert pixel keypoints into normalized
//! image coordinates and back. The [`FundamentalMatrix`] relates pixel keypoints of two images and
//! the [`EssentialMatrix`] relates their normalized image coordinates, from which the relative pose
//! candidates of the two cameras are extracted.

#![no_std]

mod essential;
mod fundamental;

pub use essential::*;
pub use fundamental::*;

use cv_core::nalgebra::{Matrix3, Point2, Vector2, Vector3};
use cv_core::{CameraModel, CameraPoint, ImagePoint, KeyPoint, Projective};
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A point in normalized image coordinates. This keypoint has been normalized
/// based on the camera intrinsic matrix, so it lies on the virtual image plane
/// a distance `z = 1.0` in front of the optical center.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct NormalizedKeyPoint(pub Point2<f64>);

impl NormalizedKeyPoint {
    /// Tries to convert the [`CameraPoint`] into a [`NormalizedKeyPoint`], but it may fail
    /// in extreme conditions, in which case `None` is returned.
    pub fn from_camera_point(point: CameraPoint) -> Option<Self> {
        Point2::from_homogeneous(point.bearing_unnormalized()).map(Self)
    }

    /// The homogeneous ray `(x, y, 1)` through this point.
    pub fn homogeneous(self) -> Vector3<f64> {
        self.coords.push(1.0)
    }
}

/// This contains intrinsic camera parameters as per
/// [this Wikipedia page](https://en.wikipedia.org/wiki/Camera_resectioning#Intrinsic_parameters).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraIntrinsics {
    pub focals: Vector2<f64>,
    pub principal_point: Point2<f64>,
    pub skew: f64,
}

impl CameraIntrinsics {
    /// Creates camera intrinsics that would create an identity intrinsic matrix.
    /// This would imply that the pixel positions have an origin at `0,0`,
    /// the pixel distance unit is the focal length, pixels are square,
    /// and there is no skew.
    pub fn identity() -> Self {
        Self {
            focals: Vector2::new(1.0, 1.0),
            skew: 0.0,
            principal_point: Point2::new(0.0, 0.0),
        }
    }

    /// Guesses intrinsics for an image when no calibration is available.
    ///
    /// The focal lengths are the image width and height in pixels and the principal
    /// point is the (integer) center of the image.
    ///
    /// ```
    /// use cv_pinhole::CameraIntrinsics;
    /// let k = CameraIntrinsics::guess_from_dimensions(641, 480).matrix();
    /// assert_eq!(k[(0, 0)], 641.0);
    /// assert_eq!(k[(1, 1)], 480.0);
    /// assert_eq!(k[(0, 2)], 320.0);
    /// assert_eq!(k[(1, 2)], 240.0);
    /// ```
    pub fn guess_from_dimensions(width: u32, height: u32) -> Self {
        Self::identity()
            .focals(Vector2::new(width as f64, height as f64))
            .principal_point(Point2::new((width / 2) as f64, (height / 2) as f64))
    }

    /// Reads the intrinsics out of an upper-triangular calibration matrix.
    ///
    /// Returns `None` if the matrix is not an invertible calibration matrix
    /// (bottom row `0 0 1`, non-zero focal lengths).
    pub fn from_matrix(matrix: Matrix3<f64>) -> Option<Self> {
        let calibration_form = matrix[(1, 0)] == 0.0
            && matrix[(2, 0)] == 0.0
            && matrix[(2, 1)] == 0.0
            && matrix[(2, 2)] == 1.0;
        if !calibration_form || matrix[(0, 0)] == 0.0 || matrix[(1, 1)] == 0.0 {
            return None;
        }
        Some(Self {
            focals: Vector2::new(matrix[(0, 0)], matrix[(1, 1)]),
            principal_point: Point2::new(matrix[(0, 2)], matrix[(1, 2)]),
            skew: matrix[(0, 1)],
        })
    }

    pub fn focals(self, focals: Vector2<f64>) -> Self {
        Self { focals, ..self }
    }

    pub fn focal(self, focal: f64) -> Self {
        Self {
            focals: Vector2::new(focal, focal),
            ..self
        }
    }

    pub fn principal_point(self, principal_point: Point2<f64>) -> Self {
        Self {
            principal_point,
            ..self
        }
    }

    pub fn skew(self, skew: f64) -> Self {
        Self { skew, ..self }
    }

    #[rustfmt::skip]
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focals.x,  self.skew,      self.principal_point.x,
            0.0,            self.focals.y,  self.principal_point.y,
            0.0,            0.0,            1.0,
        )
    }

    /// The inverse of [`CameraIntrinsics::matrix`], computed in closed form.
    ///
    /// ```
    /// use cv_pinhole::CameraIntrinsics;
    /// use cv_core::nalgebra::{Matrix3, Point2, Vector2};
    /// let intrinsics = CameraIntrinsics::identity()
    ///     .focals(Vector2::new(800.0, 900.0))
    ///     .principal_point(Point2::new(500.0, 600.0))
    ///     .skew(1.7);
    /// let product = intrinsics.matrix() * intrinsics.inverse_matrix();
    /// assert!((product - Matrix3::identity()).norm() < 1e-12);
    /// ```
    #[rustfmt::skip]
    pub fn inverse_matrix(&self) -> Matrix3<f64> {
        let (fx, fy) = (self.focals.x, self.focals.y);
        let (cx, cy) = (self.principal_point.x, self.principal_point.y);
        let s = self.skew;
        Matrix3::new(
            1.0 / fx,   -s / (fx * fy), (s * cy - cx * fy) / (fx * fy),
            0.0,        1.0 / fy,       -cy / fy,
            0.0,        0.0,            1.0,
        )
    }
}

impl CameraModel for CameraIntrinsics {
    type Projection = NormalizedKeyPoint;

    /// Takes in a point from an image in pixel coordinates and
    /// converts it to a [`NormalizedKeyPoint`].
    ///
    /// ```
    /// use cv_core::{KeyPoint, CameraModel};
    /// use cv_pinhole::{NormalizedKeyPoint, CameraIntrinsics};
    /// use cv_core::nalgebra::{Vector2, Vector3, Point2};
    /// let intrinsics = CameraIntrinsics {
    ///     focals: Vector2::new(800.0, 900.0),
    ///     principal_point: Point2::new(500.0, 600.0),
    ///     skew: 1.7,
    /// };
    /// let kp = KeyPoint(Point2::new(471.0, 322.0));
    /// let nkp = intrinsics.calibrate(kp);
    /// let calibration_matrix = intrinsics.matrix();
    /// let distance = (kp.to_homogeneous() - calibration_matrix * nkp.to_homogeneous()).norm();
    /// assert!(distance < 0.1);
    /// ```
    fn calibrate<P>(&self, point: P) -> NormalizedKeyPoint
    where
        P: ImagePoint,
    {
        let centered = point.image_point() - self.principal_point;
        let y = centered.y / self.focals.y;
        let x = (centered.x - self.skew * y) / self.focals.x;
        NormalizedKeyPoint(Point2::new(x, y))
    }

    /// Converts a [`NormalizedKeyPoint`] back into pixel coordinates.
    ///
    /// ```
    /// use cv_core::{KeyPoint, CameraModel};
    /// use cv_pinhole::{NormalizedKeyPoint, CameraIntrinsics};
    /// use cv_core::nalgebra::{Vector2, Vector3, Point2};
    /// let intrinsics = CameraIntrinsics {
    ///     focals: Vector2::new(800.0, 900.0),
    ///     principal_point: Point2::new(500.0, 600.0),
    ///     skew: 1.7,
    /// };
    /// let kp = KeyPoint(Point2::new(471.0, 322.0));
    /// let nkp = intrinsics.calibrate(kp);
    /// let ukp = intrinsics.uncalibrate(nkp);
    /// assert!((kp.0 - ukp.0).norm() < 1e-6);
    /// ```
    fn uncalibrate(&self, projection: NormalizedKeyPoint) -> KeyPoint {
        let y = projection.y * self.focals.y;
        let x = projection.x * self.focals.x + self.skew * projection.y;
        let centered = Point2::new(x, y);
        KeyPoint(centered + self.principal_point.coords)
    }
}
