//! Two-view structure from motion.
//!
//! Given two images, this crate matches their feature descriptors, robustly estimates the
//! fundamental matrix between them, lifts it to the essential matrix with the camera intrinsics,
//! picks the one relative pose out of the four candidates that places the scene in front of both
//! cameras, and triangulates a point cloud. The reference camera is `[I|0]` and the baseline has
//! an unknown length, so the reconstruction is only defined up to scale.
//!
//! The entry point is [`TwoViewReconstructor`].

mod consensus;
mod epipolar;
mod error;
mod image;
mod matching;
mod pose;
mod settings;
mod triangulation;

pub use consensus::*;
pub use epipolar::*;
pub use error::*;
pub use image::*;
pub use matching::*;
pub use pose::*;
pub use settings::*;
pub use triangulation::*;

use cv_core::{Correspondence, Pose, WorldToCamera};
use cv_geom::triangulation::IterativeLinearTriangulator;
use cv_pinhole::CameraIntrinsics;
use log::*;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// The result of reconstructing one image pair.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoViewReconstruction {
    /// The chosen relative pose of the second camera along with its point cloud.
    pub pose: CameraPose,
    pub geometry: EpipolarGeometry,
    pub intrinsics: (CameraIntrinsics, CameraIntrinsics),
    pub warnings: Vec<Warning>,
}

impl TwoViewReconstruction {
    pub fn cloud(&self) -> &[CloudPoint] {
        self.pose.cloud.as_ref().map_or(&[][..], PointCloud::points)
    }

    /// The mean reprojection error of the cloud in pixels.
    pub fn error(&self) -> f64 {
        self.pose.error()
    }
}

/// Reconstructs image pairs with a feature extractor and a source of camera intrinsics.
pub struct TwoViewReconstructor<E, I> {
    pub settings: TwoViewSettings,
    pub extractor: E,
    pub intrinsics: I,
}

/// The image type that an extractor `E` works on.
pub type ExtractorImage<E> =
    Image<<E as FeatureExtractor>::Pixels, <E as FeatureExtractor>::Descriptor>;

impl<E, I> TwoViewReconstructor<E, I>
where
    E: FeatureExtractor,
    I: IntrinsicsSource,
{
    pub fn new(settings: TwoViewSettings, extractor: E, intrinsics: I) -> Self {
        Self {
            settings,
            extractor,
            intrinsics,
        }
    }

    pub fn matcher(&self) -> CorrespondenceMatcher {
        CorrespondenceMatcher::new(&self.settings)
    }

    pub fn epipolar_estimator(&self) -> EpipolarEstimator {
        EpipolarEstimator::new(&self.settings)
    }

    pub fn disambiguator(&self) -> PoseDisambiguator {
        PoseDisambiguator::new(&self.settings)
    }

    pub fn triangulator(&self) -> Triangulator {
        Triangulator::new(
            IterativeLinearTriangulator::new()
                .epsilon(self.settings.triangulation_epsilon)
                .max_iterations(self.settings.triangulation_max_iterations),
        )
    }

    /// Matches the features of both images and returns the correspondences from `a` to `b`.
    pub fn match_features(
        &self,
        a: &ExtractorImage<E>,
        b: &ExtractorImage<E>,
    ) -> Result<Vec<Correspondence>> {
        let detector = &self.settings.detector;
        let features_a = a.features(&self.extractor, detector);
        let features_b = b.features(&self.extractor, detector);
        info!(
            "performing matching between {} and {} features",
            features_a.len(),
            features_b.len()
        );
        self.matcher().match_descriptors(
            self.extractor.metric(),
            &features_a.descriptors,
            &features_b.descriptors,
            None,
        )
    }

    /// Estimates the relative pose of `b` with respect to `a` and triangulates the inliers.
    pub fn estimate_pose(
        &self,
        a: &ExtractorImage<E>,
        b: &ExtractorImage<E>,
    ) -> Result<TwoViewReconstruction> {
        info!("estimating pose between {} and {}", a.name, b.name);
        let correspondences = self.match_features(a, b)?;

        let detector = &self.settings.detector;
        let features_a = a.features(&self.extractor, detector);
        let features_b = b.features(&self.extractor, detector);
        let intrinsics_a = self.intrinsics.intrinsics(a);
        let intrinsics_b = self.intrinsics.intrinsics(b);

        let geometry = self.epipolar_estimator().estimate(
            &correspondences,
            &features_a.keypoints,
            &features_b.keypoints,
            &intrinsics_a,
            &intrinsics_b,
        )?;

        let view_a = View::new(
            WorldToCamera::identity(),
            intrinsics_a,
            &features_a.keypoints,
        );
        let (pose, warnings) = self.disambiguator().disambiguate(
            &geometry.essential,
            &self.triangulator(),
            &view_a,
            intrinsics_b,
            &features_b.keypoints,
            &geometry.correspondences,
        )?;

        Ok(TwoViewReconstruction {
            pose,
            geometry,
            intrinsics: (intrinsics_a, intrinsics_b),
            warnings,
        })
    }

    /// Triangulates `correspondences` between `a` and `b` given the pose of each camera.
    ///
    /// Returns the points and their mean reprojection error in image `a`.
    pub fn triangulate(
        &self,
        a: &ExtractorImage<E>,
        b: &ExtractorImage<E>,
        pose_a: WorldToCamera,
        pose_b: WorldToCamera,
        correspondences: &[Correspondence],
    ) -> (PointCloud, f64) {
        let detector = &self.settings.detector;
        let features_a = a.features(&self.extractor, detector);
        let features_b = b.features(&self.extractor, detector);
        let view_a = View::new(pose_a, self.intrinsics.intrinsics(a), &features_a.keypoints);
        let view_b = View::new(pose_b, self.intrinsics.intrinsics(b), &features_b.keypoints);
        let cloud = self
            .triangulator()
            .triangulate(&view_a, &view_b, correspondences);
        let error = cloud.mean_error();
        (cloud, error)
    }

    /// Reconstructs every pair of images.
    ///
    /// A pair that fails is logged and skipped without affecting the others. Each successful
    /// result comes with the index of its pair.
    pub fn reconstruct_pairs(
        &self,
        pairs: &[(&ExtractorImage<E>, &ExtractorImage<E>)],
    ) -> Vec<(usize, TwoViewReconstruction)>
    where
        E: Sync,
        I: Sync,
        E::Pixels: Sync,
        E::Descriptor: Send + Sync,
    {
        let reconstruct = |(ix, &(a, b)): (usize, &(&ExtractorImage<E>, &ExtractorImage<E>))| {
            match self.estimate_pose(a, b) {
                Ok(reconstruction) => Some((ix, reconstruction)),
                Err(e) => {
                    warn!("skipping pair {} and {}: {}", a.name, b.name, e);
                    None
                }
            }
        };
        #[cfg(not(feature = "rayon"))]
        let reconstructions = pairs.iter().enumerate().filter_map(reconstruct).collect();
        #[cfg(feature = "rayon")]
        let reconstructions = pairs
            .par_iter()
            .enumerate()
            .filter_map(reconstruct)
            .collect();
        reconstructions
    }
}

/// Merges the clouds of several reconstructions into one.
pub fn merge_clouds<'a>(
    reconstructions: impl IntoIterator<Item = &'a TwoViewReconstruction>,
) -> PointCloud {
    let mut merged = PointCloud::new();
    for reconstruction in reconstructions {
        if let Some(cloud) = &reconstruction.pose.cloud {
            merged.merge(cloud.clone());
        }
    }
    merged
}
