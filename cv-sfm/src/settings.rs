#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// How candidate neighbours are gathered for each query descriptor.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MatchMode {
    /// The two nearest neighbours are candidates.
    NearestTwo,
    /// Every neighbour within [`TwoViewSettings::match_radius`] is a candidate.
    Radius,
}

/// The settings for two-view reconstruction.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct TwoViewSettings {
    /// The detector type that features are extracted and cached under
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_detector"))]
    pub detector: String,
    /// How neighbours are found for each descriptor of the first image
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_match_mode"))]
    pub match_mode: MatchMode,
    /// The best match must be closer than this ratio times the second best match
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_match_ratio"))]
    pub match_ratio: f64,
    /// The largest descriptor distance of a candidate in [`MatchMode::Radius`]
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_match_radius"))]
    pub match_radius: f64,
    /// Accept a match when the descriptor has exactly one neighbour
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_single_matches"))]
    pub single_matches: bool,
    /// The consensus threshold in pixels is this factor times the largest keypoint coordinate
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_epipolar_distance_factor")
    )]
    pub epipolar_distance_factor: f64,
    /// The probability that sample consensus draws at least one outlier-free sample
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_consensus_confidence")
    )]
    pub consensus_confidence: f64,
    /// The most samples drawn by sample consensus
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_consensus_max_iterations")
    )]
    pub consensus_max_iterations: usize,
    /// The seed of the sample consensus random number generator
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_consensus_seed"))]
    pub consensus_seed: u64,
    /// The fewest correspondences that epipolar geometry is estimated from
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_minimum_correspondences")
    )]
    pub minimum_correspondences: usize,
    /// Below this ratio of the two largest singular values the essential matrix is reported as ill-conditioned
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_singular_value_ratio_threshold")
    )]
    pub singular_value_ratio_threshold: f64,
    /// The largest deviation of `|det R|` from `1.0` for a candidate rotation to be coherent
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_rotation_tolerance")
    )]
    pub rotation_tolerance: f64,
    /// The change of the depth weights below which triangulation has converged
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_triangulation_epsilon")
    )]
    pub triangulation_epsilon: f64,
    /// The most re-weighting steps of triangulation
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_triangulation_max_iterations")
    )]
    pub triangulation_max_iterations: usize,
}

impl Default for TwoViewSettings {
    fn default() -> Self {
        Self {
            detector: default_detector(),
            match_mode: default_match_mode(),
            match_ratio: default_match_ratio(),
            match_radius: default_match_radius(),
            single_matches: default_single_matches(),
            epipolar_distance_factor: default_epipolar_distance_factor(),
            consensus_confidence: default_consensus_confidence(),
            consensus_max_iterations: default_consensus_max_iterations(),
            consensus_seed: default_consensus_seed(),
            minimum_correspondences: default_minimum_correspondences(),
            singular_value_ratio_threshold: default_singular_value_ratio_threshold(),
            rotation_tolerance: default_rotation_tolerance(),
            triangulation_epsilon: default_triangulation_epsilon(),
            triangulation_max_iterations: default_triangulation_max_iterations(),
        }
    }
}

fn default_detector() -> String {
    "ORB".to_owned()
}

fn default_match_mode() -> MatchMode {
    MatchMode::NearestTwo
}

fn default_match_ratio() -> f64 {
    0.8
}

fn default_match_radius() -> f64 {
    200.0
}

fn default_single_matches() -> bool {
    true
}

fn default_epipolar_distance_factor() -> f64 {
    0.006
}

fn default_consensus_confidence() -> f64 {
    0.99
}

fn default_consensus_max_iterations() -> usize {
    2000
}

fn default_consensus_seed() -> u64 {
    0
}

fn default_minimum_correspondences() -> usize {
    8
}

fn default_singular_value_ratio_threshold() -> f64 {
    0.7
}

fn default_rotation_tolerance() -> f64 {
    1e-6
}

fn default_triangulation_epsilon() -> f64 {
    1e-4
}

fn default_triangulation_max_iterations() -> usize {
    10
}
