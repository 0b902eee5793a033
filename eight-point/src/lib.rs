#![no_std]

use cv_core::{
    nalgebra::{Matrix3, SMatrix, SVector},
    sample_consensus::Estimator,
    FeatureMatch, KeyPoint,
};
use cv_pinhole::FundamentalMatrix;
use num_traits::Float;

/// Moves the centroid of the points to the origin and scales them so that their mean
/// distance from it is `sqrt(2)`.
///
/// Returns `None` when all points coincide.
fn normalization(points: impl Iterator<Item = KeyPoint> + Clone) -> Option<Matrix3<f64>> {
    let count = points.clone().count() as f64;
    let centroid = points.clone().map(|p| p.0.coords).sum::<SVector<f64, 2>>() / count;
    let mean_distance = points.map(|p| (p.0.coords - centroid).norm()).sum::<f64>() / count;
    let scale = Float::sqrt(2.0) / mean_distance;
    if !scale.is_finite() {
        return None;
    }
    #[rustfmt::skip]
    let transform = Matrix3::new(
        scale,  0.0,    -scale * centroid.x,
        0.0,    scale,  -scale * centroid.y,
        0.0,    0.0,    1.0,
    );
    Some(transform)
}

/// Accumulates `A* A` for the linear system `A f = 0`, where each row of `A` is the epipolar
/// constraint of one match and `f` holds the fundamental matrix in column-major order.
fn encode_epipolar_equation<I>(
    matches: I,
    first: &Matrix3<f64>,
    second: &Matrix3<f64>,
) -> SMatrix<f64, 9, 9>
where
    I: Iterator<Item = FeatureMatch<KeyPoint>>,
{
    let mut ata = SMatrix::<f64, 9, 9>::zeros();
    for FeatureMatch(a, b) in matches {
        let a = first * a.homogeneous();
        let b = second * b.homogeneous();
        let mut row = SVector::<f64, 9>::zeros();
        for j in 0..3 {
            row.fixed_rows_mut::<3>(3 * j).copy_from(&(a[j] * b));
        }
        ata += row * row.transpose();
    }
    ata
}

/// Performs the normalized
/// [eight-point algorithm](https://en.wikipedia.org/wiki/Eight-point_algorithm)
/// by Richard Hartley to estimate a [`FundamentalMatrix`] from pixel matches.
///
/// The keypoints of each image are normalized before solving and the solution is
/// forced to rank two before it is denormalized.
#[derive(Copy, Clone, Debug)]
pub struct EightPoint {
    pub epsilon: f64,
    pub iterations: usize,
}

impl EightPoint {
    pub fn new() -> Self {
        Default::default()
    }

    /// Estimates the fundamental matrix from at least eight matches.
    ///
    /// Every match participates in a least squares fit, so this also refits a model
    /// on all of the inliers of a consensus run.
    pub fn from_matches<I>(&self, data: I) -> Option<FundamentalMatrix>
    where
        I: Iterator<Item = FeatureMatch<KeyPoint>> + Clone,
    {
        if data.clone().count() < Self::MIN_SAMPLES {
            return None;
        }
        let first = normalization(data.clone().map(|FeatureMatch(a, _)| a))?;
        let second = normalization(data.clone().map(|FeatureMatch(_, b)| b))?;
        let ata = encode_epipolar_equation(data, &first, &second);
        let eigens = ata.try_symmetric_eigen(self.epsilon, self.iterations)?;
        let eigenvector = eigens
            .eigenvalues
            .iter()
            .enumerate()
            .min_by_key(|&(_, &n)| float_ord::FloatOrd(n))
            .map(|(ix, _)| eigens.eigenvectors.column(ix).into_owned())?;
        let normalized = Matrix3::from_iterator(eigenvector.iter().copied());

        let mut svd = normalized.try_svd(true, true, self.epsilon, self.iterations)?;
        svd.singular_values[2] = 0.0;
        let rank_two = svd.recompose().ok()?;

        let fundamental = second.transpose() * rank_two * first;
        let scale = fundamental.norm();
        if scale == 0.0 || !scale.is_finite() {
            return None;
        }
        Some(FundamentalMatrix(fundamental / scale))
    }
}

impl Default for EightPoint {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            iterations: 1000,
        }
    }
}

impl Estimator<FeatureMatch<KeyPoint>> for EightPoint {
    type Model = FundamentalMatrix;
    type ModelIter = Option<FundamentalMatrix>;
    const MIN_SAMPLES: usize = 8;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = FeatureMatch<KeyPoint>> + Clone,
    {
        self.from_matches(data)
    }
}
