use crate::NormalizedKeyPoint;
use cv_core::{
    nalgebra::{Matrix3, Rotation3, Vector3, SVD},
    sample_consensus::Model,
    CameraToCamera, FeatureMatch, Pose,
};
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use num_traits::Float;

/// This stores an essential matrix, which is satisfied by the following constraint:
///
/// transpose(x') * E * x = 0
///
/// Where `x'` and `x` are homogeneous normalized image coordinates of the second and the
/// first image. You can get a homogeneous normalized image coordinate by appending `1.0`
/// to a [`NormalizedKeyPoint`].
///
/// `E * x` is the epipolar line in the second image on which the match of `x` must lie.
/// A perfect essential matrix has two equal singular values and a third that is zero,
/// and it can be factored into a rotation and a translation bearing (of unknown length and sign).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
pub struct EssentialMatrix(pub Matrix3<f64>);

impl EssentialMatrix {
    /// The singular values of the matrix, sorted in descending order.
    pub fn singular_values(&self, epsilon: f64, max_iterations: usize) -> Option<Vector3<f64>> {
        self.0
            .try_svd(false, false, epsilon, max_iterations)
            .map(|svd| svd.singular_values)
    }

    /// The ratio between the two largest singular values, folded into `[0, 1]`.
    ///
    /// A well conditioned essential matrix has a ratio close to `1.0`. When both
    /// singular values are zero the ratio is `0.0`.
    ///
    /// ```
    /// use cv_core::nalgebra::Matrix3;
    /// use cv_pinhole::EssentialMatrix;
    /// let e = EssentialMatrix(Matrix3::from_diagonal(&[1.0, 0.3, 0.0].into()));
    /// let ratio = e.singular_value_ratio(1e-12, 1000).unwrap();
    /// assert!((ratio - 0.3).abs() < 1e-12);
    /// ```
    pub fn singular_value_ratio(&self, epsilon: f64, max_iterations: usize) -> Option<f64> {
        let singular = self.singular_values(epsilon, max_iterations)?;
        let ratio = Float::abs(singular[0] / singular[1]);
        let ratio = if ratio > 1.0 { ratio.recip() } else { ratio };
        Some(if ratio.is_nan() { 0.0 } else { ratio })
    }

    /// Returns two possible rotations for the essential matrix along with a translation
    /// bearing of arbitrary length and sign.
    ///
    /// The decomposition is `E = U diag(a, a, 0) V*`. `U` and `V*` are flipped so that their
    /// determinants are positive, which is allowed because the last singular vector of each is
    /// free when the last singular value is zero. The rotations are then `U W V*` and `U W* V*`,
    /// and the translation bearing is the last column of `U`.
    ///
    /// `epsilon` is the threshold by which the singular value decomposition is considered
    /// complete. `max_iterations` caps the number of iterations of the decomposition.
    ///
    /// ```
    /// use cv_core::{CameraToCamera, Pose};
    /// use cv_core::nalgebra::{Rotation3, Vector3};
    /// use cv_pinhole::EssentialMatrix;
    /// let pose = CameraToCamera::from_parts(
    ///     Vector3::new(-0.8, 0.4, 0.5),
    ///     Rotation3::from_euler_angles(0.2, 0.3, 0.4),
    /// );
    /// let (rot_a, rot_b, t) = EssentialMatrix::from(pose)
    ///     .possible_rotations_unscaled_translation(1e-12, 1000)
    ///     .unwrap();
    /// let a_close = rot_a.rotation_to(&pose.0.rotation).angle() < 1e-6;
    /// let b_close = rot_b.rotation_to(&pose.0.rotation).angle() < 1e-6;
    /// assert!(a_close || b_close);
    /// let t_res = 1.0 - t.normalize().dot(&pose.0.translation.vector.normalize()).abs();
    /// assert!(t_res < 1e-6);
    /// ```
    pub fn possible_rotations_unscaled_translation(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Option<(Rotation3<f64>, Rotation3<f64>, Vector3<f64>)> {
        #[rustfmt::skip]
        let w = Matrix3::new(
            0.0, -1.0, 0.0,
            1.0,  0.0, 0.0,
            0.0,  0.0, 1.0,
        );

        let SVD { u, v_t, .. } = self.0.try_svd(true, true, epsilon, max_iterations)?;
        let (mut u, mut v_t) = (u?, v_t?);
        if u.determinant() < 0.0 {
            u.column_mut(2).neg_mut();
        }
        if v_t.determinant() < 0.0 {
            v_t.row_mut(2).neg_mut();
        }

        Some((
            Rotation3::from_matrix_unchecked(u * w * v_t),
            Rotation3::from_matrix_unchecked(u * w.transpose() * v_t),
            u.column(2).into_owned(),
        ))
    }

    /// The four relative poses that can produce this essential matrix.
    ///
    /// With rotations `R1 = U W V*`, `R2 = U W* V*` and bearing `t`, the order is
    /// `(R1, t)`, `(R1, -t)`, `(R2, t)`, `(R2, -t)`. Only one of them places the scene in
    /// front of both cameras.
    ///
    /// ```
    /// use cv_core::{CameraToCamera, Pose};
    /// use cv_core::nalgebra::{Rotation3, Vector3};
    /// use cv_pinhole::EssentialMatrix;
    /// let pose = CameraToCamera::from_parts(
    ///     Vector3::new(-0.8, 0.4, 0.5),
    ///     Rotation3::from_euler_angles(0.2, 0.3, 0.4),
    /// );
    /// let candidates = EssentialMatrix::from(pose).possible_unscaled_poses(1e-12, 1000).unwrap();
    /// let one_correct = candidates.iter().any(|candidate| {
    ///     let angle_residual = candidate.0.rotation.rotation_to(&pose.0.rotation).angle();
    ///     let translation_residual = 1.0
    ///         - candidate.0.translation.vector.normalize()
    ///             .dot(&pose.0.translation.vector.normalize());
    ///     angle_residual < 1e-6 && translation_residual < 1e-6
    /// });
    /// assert!(one_correct);
    /// ```
    pub fn possible_unscaled_poses(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Option<[CameraToCamera; 4]> {
        let (r1, r2, t) = self.possible_rotations_unscaled_translation(epsilon, max_iterations)?;
        Some([
            CameraToCamera::from_parts(t, r1),
            CameraToCamera::from_parts(-t, r1),
            CameraToCamera::from_parts(t, r2),
            CameraToCamera::from_parts(-t, r2),
        ])
    }
}

/// Generates the essential matrix `[t]x R` of a relative camera pose.
///
/// If a point `a` is transformed using [`Pose::transform`] into a point `b`, then the
/// residual of the normalized projections of `a` and `b` is approximately `0.0`.
impl From<CameraToCamera> for EssentialMatrix {
    fn from(pose: CameraToCamera) -> Self {
        Self(pose.0.translation.vector.cross_matrix() * *pose.0.rotation.matrix())
    }
}

impl Model<FeatureMatch<NormalizedKeyPoint>> for EssentialMatrix {
    fn residual(&self, data: &FeatureMatch<NormalizedKeyPoint>) -> f64 {
        let &FeatureMatch(a, b) = data;
        Float::abs(b.homogeneous().dot(&(self.0 * a.homogeneous())))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use cv_core::{nalgebra::Point3, CameraPoint, Projective};

    fn pose() -> CameraToCamera {
        CameraToCamera::from_parts(
            Vector3::new(1.0, 0.1, -0.2),
            Rotation3::from_euler_angles(0.05, -0.1, 0.02),
        )
    }

    #[test]
    fn projections_satisfy_constraint() {
        let pose = pose();
        let essential = EssentialMatrix::from(pose);
        for &(x, y, z) in &[(0.0, 0.0, 5.0), (1.0, -2.0, 7.0), (-3.0, 0.5, 4.0)] {
            let a = CameraPoint::from_point(Point3::new(x, y, z));
            let b = pose.transform(a);
            let matched = FeatureMatch(
                NormalizedKeyPoint::from_camera_point(a).unwrap(),
                NormalizedKeyPoint::from_camera_point(b).unwrap(),
            );
            assert!(essential.residual(&matched) < 1e-12);
        }
    }

    #[test]
    fn ideal_essential_is_well_conditioned() {
        let ratio = EssentialMatrix::from(pose())
            .singular_value_ratio(1e-12, 1000)
            .unwrap();
        assert_relative_eq!(ratio, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn degenerate_essential_has_zero_ratio() {
        let ratio = EssentialMatrix(Matrix3::zeros())
            .singular_value_ratio(1e-12, 1000)
            .unwrap();
        assert_eq!(ratio, 0.0);
    }

    #[test]
    fn candidates_are_proper_rotations() {
        let candidates = EssentialMatrix::from(pose())
            .possible_unscaled_poses(1e-12, 1000)
            .unwrap();
        for candidate in &candidates {
            assert_relative_eq!(
                candidate.0.rotation.matrix().determinant(),
                1.0,
                epsilon = 1e-9
            );
        }
        // Pairs share a rotation and flip the translation.
        assert_eq!(candidates[0].0.rotation, candidates[1].0.rotation);
        assert_eq!(candidates[2].0.rotation, candidates[3].0.rotation);
        assert_relative_eq!(
            candidates[0].0.translation.vector,
            -candidates[1].0.translation.vector
        );
    }
}
