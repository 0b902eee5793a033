use cv_core::sample_consensus::{Consensus, Estimator, Model};
use log::*;
use rand::{seq::index::sample, RngCore};

/// Random sample consensus with an adaptive number of iterations.
///
/// Every iteration estimates models from `MIN_SAMPLES` distinct random data points and counts
/// the data within `threshold` of each model. The number of iterations needed to draw an
/// outlier-free sample with probability `confidence` is re-derived from the best inlier ratio
/// seen so far, capped at `max_iterations`. The winning model is then refit on its inliers
/// until they stop changing.
#[derive(Debug, Clone)]
pub struct Ransac<R> {
    threshold: f64,
    confidence: f64,
    max_iterations: usize,
    local_iterations: usize,
    rng: R,
}

impl<R> Ransac<R>
where
    R: RngCore,
{
    pub fn new(rng: R) -> Self {
        Self {
            threshold: 1.0,
            confidence: 0.99,
            max_iterations: 2000,
            local_iterations: 20,
            rng,
        }
    }

    /// Default is `1.0`.
    #[must_use]
    pub fn threshold(self, threshold: f64) -> Self {
        Self { threshold, ..self }
    }

    /// Default is `0.99`.
    #[must_use]
    pub fn confidence(self, confidence: f64) -> Self {
        Self { confidence, ..self }
    }

    /// Default is `2000`.
    #[must_use]
    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// The most times the model is refit on its own inliers.
    ///
    /// Default is `20`.
    #[must_use]
    pub fn local_iterations(self, local_iterations: usize) -> Self {
        Self {
            local_iterations,
            ..self
        }
    }

    fn inliers<M, Data>(&self, model: &M, data: &[Data]) -> Vec<usize>
    where
        M: Model<Data>,
    {
        data.iter()
            .enumerate()
            .filter(|(_, datum)| model.residual(datum) <= self.threshold)
            .map(|(ix, _)| ix)
            .collect()
    }

    /// The number of iterations after which an outlier-free sample of `sample_size` was drawn
    /// with probability `confidence`, given the fraction of inliers.
    pub fn required_iterations(&self, inlier_ratio: f64, sample_size: usize) -> usize {
        let outlier_free = inlier_ratio.powi(sample_size as i32);
        if outlier_free >= 1.0 {
            return 1;
        }
        if outlier_free <= 0.0 {
            return self.max_iterations;
        }
        let iterations = (1.0 - self.confidence).ln() / (1.0 - outlier_free).ln();
        if iterations.is_finite() {
            (iterations.ceil().max(1.0) as usize).min(self.max_iterations)
        } else {
            self.max_iterations
        }
    }

    /// The model fit on the data at `indices` with the most inliers among all of `data`.
    fn best_fit<E, Data>(
        &self,
        estimator: &E,
        data: &[Data],
        indices: impl Iterator<Item = usize> + Clone,
    ) -> Option<(E::Model, Vec<usize>)>
    where
        E: Estimator<Data>,
        Data: Clone,
    {
        estimator
            .estimate(indices.map(|ix| data[ix].clone()))
            .into_iter()
            .map(|model| {
                let inliers = self.inliers(&model, data);
                (model, inliers)
            })
            .max_by_key(|(_, inliers)| inliers.len())
    }

    /// Refits the model on its inliers until the inlier set stops changing.
    ///
    /// Stops early if a refit loses inliers or after `local_iterations` refits. At the fixed
    /// point the model is the fit of exactly its inliers, so running consensus again on those
    /// inliers returns all of them.
    fn optimize<E, Data>(
        &self,
        estimator: &E,
        data: &[Data],
        mut model: E::Model,
        mut inliers: Vec<usize>,
    ) -> (E::Model, Vec<usize>)
    where
        E: Estimator<Data>,
        Data: Clone,
    {
        for _ in 0..self.local_iterations {
            let (refit, refit_inliers) =
                match self.best_fit(estimator, data, inliers.iter().copied()) {
                    Some(refit) => refit,
                    None => break,
                };
            if refit_inliers.len() < inliers.len() {
                debug!(
                    "refit lost {} inliers",
                    inliers.len() - refit_inliers.len()
                );
                break;
            }
            let settled = refit_inliers == inliers;
            model = refit;
            inliers = refit_inliers;
            if settled {
                break;
            }
        }
        (model, inliers)
    }
}

impl<E, R, Data> Consensus<E, Data> for Ransac<R>
where
    E: Estimator<Data>,
    R: RngCore,
    Data: Clone,
{
    type Inliers = Vec<usize>;

    fn model<I>(&mut self, estimator: &E, data: I) -> Option<E::Model>
    where
        I: Iterator<Item = Data> + Clone,
    {
        self.model_inliers(estimator, data).map(|(model, _)| model)
    }

    fn model_inliers<I>(&mut self, estimator: &E, data: I) -> Option<(E::Model, Self::Inliers)>
    where
        I: Iterator<Item = Data> + Clone,
    {
        let data: Vec<Data> = data.collect();
        if data.len() < E::MIN_SAMPLES {
            return None;
        }

        let mut best: Option<(E::Model, Vec<usize>)> = None;
        let mut required = self.max_iterations;
        let mut iteration = 0;
        while iteration < required {
            iteration += 1;
            let indices = sample(&mut self.rng, data.len(), E::MIN_SAMPLES);
            let samples: Vec<Data> = indices.iter().map(|ix| data[ix].clone()).collect();
            for model in estimator.estimate(samples.iter().cloned()) {
                let inliers = self.inliers(&model, &data);
                let best_len = best.as_ref().map_or(0, |(_, inliers)| inliers.len());
                if inliers.len() > best_len {
                    let ratio = inliers.len() as f64 / data.len() as f64;
                    required = self.required_iterations(ratio, E::MIN_SAMPLES);
                    best = Some((model, inliers));
                }
            }
        }
        // The least squares fit of all the data competes with the sampled models.
        if let Some(candidate) = self.best_fit(estimator, &data, 0..data.len()) {
            let best_len = best.as_ref().map_or(0, |(_, inliers)| inliers.len());
            if !candidate.1.is_empty() && candidate.1.len() >= best_len {
                best = Some(candidate);
            }
        }
        let (model, inliers) = best?;
        debug!(
            "consensus found {} of {} inliers after {} iterations",
            inliers.len(),
            data.len(),
            iteration
        );
        Some(self.optimize(estimator, &data, model, inliers))
    }
}
