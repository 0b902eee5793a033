use crate::{Error, PointCloud, Result, Triangulator, TwoViewSettings, View, Warning};
use core::cmp::Ordering;
use cv_core::{
    nalgebra::{Matrix3, Matrix3x4, Vector3},
    Correspondence, CameraToCamera, KeyPoint, Pose, WorldToCamera,
};
use cv_pinhole::{CameraIntrinsics, EssentialMatrix};
use float_ord::FloatOrd;
use log::*;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// A candidate relative pose `[R|t]` of the second camera.
///
/// The reference camera is `[I|0]`. The cloud is only present once the candidate was triangulated.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraPose {
    /// The position of this candidate among those decomposed from the essential matrix.
    pub index: usize,
    pub pose: CameraToCamera,
    pub cloud: Option<PointCloud>,
}

impl CameraPose {
    pub fn new(index: usize, pose: CameraToCamera) -> Self {
        Self {
            index,
            pose,
            cloud: None,
        }
    }

    pub fn rotation(&self) -> Matrix3<f64> {
        *self.pose.0.rotation.matrix()
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.pose.0.translation.vector
    }

    pub fn matrix(&self) -> Matrix3x4<f64> {
        self.pose.matrix()
    }

    /// Checks that the rotation determinant is `±1` within `tolerance`.
    pub fn is_coherent(&self, tolerance: f64) -> bool {
        let determinant = self.rotation().determinant();
        let finite = self.translation().iter().all(|n| n.is_finite());
        finite && determinant.is_finite() && (determinant.abs() - 1.0).abs() <= tolerance
    }

    /// The fraction of triangulated points in front of both cameras.
    pub fn in_front_fraction(&self) -> f64 {
        self.cloud.as_ref().map_or(0.0, PointCloud::in_front_fraction)
    }

    /// The mean reprojection error, which is infinite until there are triangulated points.
    pub fn error(&self) -> f64 {
        match &self.cloud {
            Some(cloud) if !cloud.is_empty() => cloud.mean_error(),
            _ => f64::INFINITY,
        }
    }

    /// The number of triangulated points.
    pub fn len(&self) -> usize {
        self.cloud.as_ref().map_or(0, PointCloud::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Orders candidates so that the better one is greater.
    ///
    /// More points in front wins, then a lower error, then the earlier candidate.
    /// This is a total order, so picking the greatest is independent of evaluation order.
    pub fn rank(&self, other: &Self) -> Ordering {
        FloatOrd(self.in_front_fraction())
            .cmp(&FloatOrd(other.in_front_fraction()))
            .then_with(|| FloatOrd(other.error()).cmp(&FloatOrd(self.error())))
            .then_with(|| other.index.cmp(&self.index))
    }
}

fn better(a: CameraPose, b: CameraPose) -> CameraPose {
    if b.rank(&a) == Ordering::Greater {
        b
    } else {
        a
    }
}

/// Picks the physically valid relative pose out of the four that an essential matrix admits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseDisambiguator {
    pub singular_value_ratio_threshold: f64,
    pub rotation_tolerance: f64,
    pub epsilon: f64,
    pub max_iterations: usize,
}

impl PoseDisambiguator {
    pub fn new(settings: &TwoViewSettings) -> Self {
        Self {
            singular_value_ratio_threshold: settings.singular_value_ratio_threshold,
            rotation_tolerance: settings.rotation_tolerance,
            epsilon: 1e-12,
            max_iterations: 1000,
        }
    }

    /// Reports when the two largest singular values of the essential matrix differ too much.
    pub fn check_conditioning(&self, essential: &EssentialMatrix) -> Result<Option<Warning>> {
        let ratio = essential
            .singular_value_ratio(self.epsilon, self.max_iterations)
            .ok_or(Error::DegenerateEssentialMatrix)?;
        if ratio < self.singular_value_ratio_threshold {
            warn!(
                "essential matrix singular value ratio {} is below {}",
                ratio, self.singular_value_ratio_threshold
            );
            Ok(Some(Warning::IllConditionedEssentialMatrix { ratio }))
        } else {
            Ok(None)
        }
    }

    /// Decomposes the essential matrix into its four candidate poses, in the order
    /// `(R1, t)`, `(R1, -t)`, `(R2, t)`, `(R2, -t)`.
    pub fn candidates(
        &self,
        essential: &EssentialMatrix,
    ) -> Result<([CameraPose; 4], Option<Warning>)> {
        let warning = self.check_conditioning(essential)?;
        let [a, b, c, d] = essential
            .possible_unscaled_poses(self.epsilon, self.max_iterations)
            .ok_or(Error::DegenerateEssentialMatrix)?;
        Ok((
            [
                CameraPose::new(0, a),
                CameraPose::new(1, b),
                CameraPose::new(2, c),
                CameraPose::new(3, d),
            ],
            warning,
        ))
    }

    /// Picks the best of the `candidates` by [`CameraPose::rank`].
    ///
    /// Fails with [`Error::NoValidPose`] if there is no candidate or the best one has no points.
    pub fn select(&self, candidates: Vec<CameraPose>) -> Result<CameraPose> {
        #[cfg(not(feature = "rayon"))]
        let best = candidates.into_iter().reduce(better);
        #[cfg(feature = "rayon")]
        let best = candidates.into_par_iter().reduce_with(better);

        match best {
            Some(best) if !best.is_empty() => Ok(best),
            Some(best) => {
                info!("best candidate {} has no triangulated points", best.index);
                Err(Error::NoValidPose)
            }
            None => Err(Error::NoValidPose),
        }
    }

    /// Decomposes the essential matrix, triangulates every coherent candidate, and returns the best.
    ///
    /// `view_a` is the reference camera. The second camera uses each candidate as its pose.
    pub fn disambiguate(
        &self,
        essential: &EssentialMatrix,
        triangulator: &Triangulator,
        view_a: &View<'_>,
        intrinsics_b: CameraIntrinsics,
        keypoints_b: &[KeyPoint],
        correspondences: &[Correspondence],
    ) -> Result<(CameraPose, Vec<Warning>)> {
        let (candidates, warning) = self.candidates(essential)?;
        let mut warnings: Vec<Warning> = warning.into_iter().collect();

        let coherent: Vec<CameraPose> = candidates
            .into_iter()
            .filter(|candidate| {
                let coherent = candidate.is_coherent(self.rotation_tolerance);
                if !coherent {
                    debug!("candidate {} has an incoherent rotation", candidate.index);
                }
                coherent
            })
            .collect();

        let evaluate = |mut candidate: CameraPose| {
            let view_b = View::new(
                WorldToCamera::from(candidate.pose),
                intrinsics_b,
                keypoints_b,
            );
            candidate.cloud = Some(triangulator.triangulate(view_a, &view_b, correspondences));
            debug!(
                "candidate {} has {} points, {} in front, mean error {}",
                candidate.index,
                candidate.len(),
                candidate.in_front_fraction(),
                candidate.error()
            );
            candidate
        };
        #[cfg(not(feature = "rayon"))]
        let evaluated: Vec<CameraPose> = coherent.into_iter().map(evaluate).collect();
        #[cfg(feature = "rayon")]
        let evaluated: Vec<CameraPose> = coherent.into_par_iter().map(evaluate).collect();

        let best = self.select(evaluated)?;
        info!(
            "chose candidate {} with {} points, {} in front, mean error {}",
            best.index,
            best.len(),
            best.in_front_fraction(),
            best.error()
        );
        let diverged = best.cloud.as_ref().map_or(0, PointCloud::diverged);
        if diverged != 0 {
            warn!("{} points did not converge during triangulation", diverged);
            warnings.push(Warning::TriangulationDivergence { points: diverged });
        }
        Ok((best, warnings))
    }
}

impl Default for PoseDisambiguator {
    fn default() -> Self {
        Self::new(&TwoViewSettings::default())
    }
}
