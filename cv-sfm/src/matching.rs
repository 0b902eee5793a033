use crate::{Error, MatchMode, Result, TwoViewSettings};
use bitarray::{BitArray, Hamming};
use cv_core::Correspondence;
use log::*;
use space::{Knn, LinearKnn, Metric};

/// A descriptor metric whose distances can be read back as real numbers.
///
/// `space` requires metric units to be unsigned integers so that they are totally ordered.
pub trait Norm<D>: Metric<D> {
    fn real_distance(&self, unit: Self::Unit) -> f64;
}

impl<const B: usize> Norm<BitArray<B>> for Hamming {
    fn real_distance(&self, unit: u32) -> f64 {
        unit.into()
    }
}

/// A real valued descriptor, such as those produced by SIFT or SURF.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatDescriptor(pub Vec<f32>);

/// Manhattan distance between [`FloatDescriptor`]s.
#[derive(Debug, Copy, Clone, Default)]
pub struct L1;

/// Euclidean distance between [`FloatDescriptor`]s.
#[derive(Debug, Copy, Clone, Default)]
pub struct L2;

/// Non-negative floats order the same way as their bit patterns, which makes them a valid unit.
/// Descriptors of different lengths are infinitely far apart.
fn float_unit(
    a: &FloatDescriptor,
    b: &FloatDescriptor,
    term: impl Fn(f64) -> f64,
) -> Option<f64> {
    (a.0.len() == b.0.len()).then(|| {
        a.0.iter()
            .zip(&b.0)
            .map(|(&x, &y)| term(f64::from(x) - f64::from(y)))
            .sum()
    })
}

impl Metric<FloatDescriptor> for L1 {
    type Unit = u64;

    fn distance(&self, a: &FloatDescriptor, b: &FloatDescriptor) -> u64 {
        float_unit(a, b, f64::abs)
            .unwrap_or(f64::INFINITY)
            .to_bits()
    }
}

impl Norm<FloatDescriptor> for L1 {
    fn real_distance(&self, unit: u64) -> f64 {
        f64::from_bits(unit)
    }
}

impl Metric<FloatDescriptor> for L2 {
    type Unit = u64;

    fn distance(&self, a: &FloatDescriptor, b: &FloatDescriptor) -> u64 {
        float_unit(a, b, |d| d * d)
            .map_or(f64::INFINITY, f64::sqrt)
            .to_bits()
    }
}

impl Norm<FloatDescriptor> for L2 {
    fn real_distance(&self, unit: u64) -> f64 {
        f64::from_bits(unit)
    }
}

/// Matches the descriptors of a query image against those of a train image with the ratio test.
///
/// Each query descriptor gathers candidate neighbours according to its [`MatchMode`]. A lone
/// candidate is accepted if `single_matches` is set. Two candidates are accepted only if the
/// best distance is strictly less than `ratio` times the second best. Any other number of
/// candidates is ambiguous and the descriptor is left unmatched.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CorrespondenceMatcher {
    pub mode: MatchMode,
    pub ratio: f64,
    pub radius: f64,
    pub single_matches: bool,
    pub symmetric: bool,
}

impl CorrespondenceMatcher {
    pub fn new(settings: &TwoViewSettings) -> Self {
        Self {
            mode: settings.match_mode,
            ratio: settings.match_ratio,
            radius: settings.match_radius,
            single_matches: settings.single_matches,
            symmetric: false,
        }
    }

    #[must_use]
    pub fn ratio(self, ratio: f64) -> Self {
        Self { ratio, ..self }
    }

    /// Only keep matches that the train descriptor also picks as its own best match.
    ///
    /// Default is `false`.
    #[must_use]
    pub fn symmetric(self, symmetric: bool) -> Self {
        Self { symmetric, ..self }
    }

    /// The candidate neighbours in `train` of one `query` descriptor, nearest first.
    pub fn candidates<D, M>(
        &self,
        knn: &LinearKnn<M, core::slice::Iter<'_, D>>,
        query: &D,
    ) -> Vec<(usize, f64)>
    where
        M: Norm<D>,
    {
        let (count, radius) = match self.mode {
            MatchMode::NearestTwo => (2, f64::INFINITY),
            MatchMode::Radius => (knn.iter.len(), self.radius),
        };
        knn.knn(query, count)
            .into_iter()
            .map(|neighbor| (neighbor.index, knn.metric.real_distance(neighbor.distance)))
            .filter(|&(_, distance)| distance <= radius)
            .collect()
    }

    /// Applies the acceptance rule to a list of candidates sorted nearest first.
    pub fn accept(&self, candidates: &[(usize, f64)]) -> Option<(usize, f64)> {
        match *candidates {
            [single] if self.single_matches => Some(single),
            [best, (_, second)] if best.1 < self.ratio * second => Some(best),
            _ => None,
        }
    }

    /// The accepted train index and distance for every query descriptor.
    pub fn best_matches<D, M>(
        &self,
        metric: M,
        query: &[D],
        train: &[D],
    ) -> Vec<Option<(usize, f64)>>
    where
        M: Norm<D>,
    {
        let knn = LinearKnn {
            metric,
            iter: train.iter(),
        };
        query
            .iter()
            .map(|descriptor| self.accept(&self.candidates(&knn, descriptor)))
            .collect()
    }

    /// Matches every `query` descriptor against the `train` descriptors.
    ///
    /// If the query descriptors were computed over a subset of the keypoints, `query_index[i]`
    /// is the keypoint index of the `i`th query descriptor. Descriptors without a valid entry
    /// are skipped. The result is ordered by query keypoint index and is never empty.
    pub fn match_descriptors<D, M>(
        &self,
        metric: M,
        query: &[D],
        train: &[D],
        query_index: Option<&[usize]>,
    ) -> Result<Vec<Correspondence>>
    where
        M: Norm<D> + Clone,
    {
        let forward = self.best_matches(metric.clone(), query, train);
        let reverse = self
            .symmetric
            .then(|| self.best_matches(metric, train, query));

        let mut correspondences: Vec<Correspondence> = forward
            .into_iter()
            .enumerate()
            .filter_map(|(qix, found)| {
                let (tix, distance) = found?;
                if let Some(reverse) = &reverse {
                    let reciprocal = reverse.get(tix).copied().flatten().map(|(ix, _)| ix);
                    if reciprocal != Some(qix) {
                        return None;
                    }
                }
                let keypoint = match query_index {
                    Some(table) => match table.get(qix) {
                        Some(&keypoint) => keypoint,
                        None => {
                            warn!("query descriptor {} has no entry in the index table", qix);
                            return None;
                        }
                    },
                    None => qix,
                };
                Some(Correspondence::new(keypoint, tix, distance))
            })
            .collect();
        correspondences.sort_by_key(|correspondence| correspondence.query);

        info!(
            "matched {} of {} query descriptors against {} train descriptors",
            correspondences.len(),
            query.len(),
            train.len()
        );
        if correspondences.is_empty() {
            return Err(Error::InsufficientMatches);
        }
        Ok(correspondences)
    }
}

impl Default for CorrespondenceMatcher {
    fn default() -> Self {
        Self::new(&TwoViewSettings::default())
    }
}
