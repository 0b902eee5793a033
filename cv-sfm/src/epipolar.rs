use crate::{Error, Ransac, Result, TwoViewSettings};
use cv_core::{sample_consensus::Consensus, Correspondence, FeatureMatch, KeyPoint};
use cv_pinhole::{CameraIntrinsics, EssentialMatrix, FundamentalMatrix};
use eight_point::EightPoint;
use log::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// The epipolar geometry of an image pair along with the correspondences consistent with it.
#[derive(Debug, Clone, PartialEq)]
pub struct EpipolarGeometry {
    pub fundamental: FundamentalMatrix,
    pub essential: EssentialMatrix,
    /// Only the inliers of the fundamental matrix, in their original order.
    pub correspondences: Vec<Correspondence>,
}

/// Robustly estimates the fundamental matrix of two images and lifts it to the essential matrix.
#[derive(Debug, Clone)]
pub struct EpipolarEstimator {
    pub distance_factor: f64,
    pub confidence: f64,
    pub max_iterations: usize,
    pub seed: u64,
    pub minimum_correspondences: usize,
    pub estimator: EightPoint,
}

impl EpipolarEstimator {
    pub fn new(settings: &TwoViewSettings) -> Self {
        Self {
            distance_factor: settings.epipolar_distance_factor,
            confidence: settings.consensus_confidence,
            max_iterations: settings.consensus_max_iterations,
            seed: settings.consensus_seed,
            minimum_correspondences: settings.minimum_correspondences,
            estimator: EightPoint::new(),
        }
    }

    /// The inlier distance in pixels, which scales with the largest coordinate of the first image.
    pub fn threshold(&self, matches: &[FeatureMatch<KeyPoint>]) -> f64 {
        let largest = matches
            .iter()
            .flat_map(|FeatureMatch(a, _)| [a.x.abs(), a.y.abs()])
            .fold(0.0, f64::max);
        self.distance_factor * largest
    }

    fn require(&self, found: usize) -> Result<()> {
        if found < self.minimum_correspondences {
            return Err(Error::InsufficientGeometry {
                found,
                required: self.minimum_correspondences,
            });
        }
        Ok(())
    }

    /// Estimates the epipolar geometry and prunes the correspondences down to its inliers.
    ///
    /// Correspondences that refer to keypoints outside of either keypoint set are dropped first.
    pub fn estimate(
        &self,
        correspondences: &[Correspondence],
        keypoints_a: &[KeyPoint],
        keypoints_b: &[KeyPoint],
        intrinsics_a: &CameraIntrinsics,
        intrinsics_b: &CameraIntrinsics,
    ) -> Result<EpipolarGeometry> {
        let (correspondences, matches): (Vec<Correspondence>, Vec<FeatureMatch<KeyPoint>>) =
            correspondences
                .iter()
                .filter_map(|c| Some((*c, c.keypoints(keypoints_a, keypoints_b)?)))
                .unzip();
        self.require(matches.len())?;

        let threshold = self.threshold(&matches);
        info!(
            "estimate fundamental matrix on {} matches with threshold {}",
            matches.len(),
            threshold
        );
        let mut consensus = Ransac::new(Xoshiro256PlusPlus::seed_from_u64(self.seed))
            .threshold(threshold)
            .confidence(self.confidence)
            .max_iterations(self.max_iterations);
        let (fundamental, inliers) = consensus
            .model_inliers(&self.estimator, matches.iter().copied())
            .ok_or(Error::InsufficientGeometry {
                found: 0,
                required: self.minimum_correspondences,
            })?;

        let correspondences: Vec<Correspondence> =
            inliers.into_iter().map(|ix| correspondences[ix]).collect();
        info!(
            "retained {} of {} matches as inliers",
            correspondences.len(),
            matches.len()
        );
        self.require(correspondences.len())?;

        Ok(EpipolarGeometry {
            fundamental,
            essential: fundamental.essential(intrinsics_a, intrinsics_b),
            correspondences,
        })
    }
}
