use crate::KeyPoint;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A pair of observations of the same feature in image A and image B, in that order.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct FeatureMatch<P>(pub P, pub P);

/// A match between keypoint `query` of the first image and keypoint `train` of the
/// second image, along with the descriptor distance that produced it.
///
/// Correspondences only carry indices. They are resolved into keypoints with
/// [`Correspondence::keypoints`], which checks the indices against the keypoint sets.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Correspondence {
    pub query: usize,
    pub train: usize,
    pub distance: f64,
}

impl Correspondence {
    pub fn new(query: usize, train: usize, distance: f64) -> Self {
        Self {
            query,
            train,
            distance,
        }
    }

    /// Looks up both keypoints. Returns `None` if either index is out of bounds.
    pub fn keypoints(&self, a: &[KeyPoint], b: &[KeyPoint]) -> Option<FeatureMatch<KeyPoint>> {
        Some(FeatureMatch(*a.get(self.query)?, *b.get(self.train)?))
    }
}
