use crate::Norm;
use cv_core::{nalgebra::Matrix3, KeyPoint};
use cv_pinhole::CameraIntrinsics;
use log::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// The keypoints of an image and their descriptors. Descriptor `i` belongs to keypoint `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Features<D> {
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: Vec<D>,
}

impl<D> Features<D> {
    /// Pairs up keypoints and descriptors, dropping any trailing unpaired entries.
    pub fn new(mut keypoints: Vec<KeyPoint>, mut descriptors: Vec<D>) -> Self {
        if keypoints.len() != descriptors.len() {
            warn!(
                "got {} keypoints but {} descriptors; truncating to the shorter",
                keypoints.len(),
                descriptors.len()
            );
            let len = keypoints.len().min(descriptors.len());
            keypoints.truncate(len);
            descriptors.truncate(len);
        }
        Self {
            keypoints,
            descriptors,
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Detects keypoints in an image and describes them.
pub trait FeatureExtractor {
    type Pixels;
    type Descriptor;
    /// The metric that descriptors are compared with.
    type Metric: Norm<Self::Descriptor> + Clone;

    fn detect(&self, pixels: &Self::Pixels, detector: &str) -> Vec<KeyPoint>;

    /// Describes the `keypoints`, one descriptor per keypoint.
    fn describe(
        &self,
        pixels: &Self::Pixels,
        keypoints: &[KeyPoint],
        detector: &str,
    ) -> Vec<Self::Descriptor>;

    fn metric(&self) -> Self::Metric;
}

/// Supplies the calibration of an image.
pub trait IntrinsicsSource {
    fn intrinsics<P, D>(&self, image: &Image<P, D>) -> CameraIntrinsics;
}

/// Guesses the calibration from the image dimensions with
/// [`CameraIntrinsics::guess_from_dimensions`].
#[derive(Debug, Copy, Clone, Default)]
pub struct GuessedIntrinsics;

impl IntrinsicsSource for GuessedIntrinsics {
    fn intrinsics<P, D>(&self, image: &Image<P, D>) -> CameraIntrinsics {
        CameraIntrinsics::guess_from_dimensions(image.width, image.height)
    }
}

/// The same known calibration for every image.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FixedIntrinsics(pub CameraIntrinsics);

impl FixedIntrinsics {
    /// Returns `None` unless `matrix` is an invertible calibration matrix.
    pub fn from_matrix(matrix: Matrix3<f64>) -> Option<Self> {
        CameraIntrinsics::from_matrix(matrix).map(Self)
    }
}

impl IntrinsicsSource for FixedIntrinsics {
    fn intrinsics<P, D>(&self, _: &Image<P, D>) -> CameraIntrinsics {
        self.0
    }
}

/// Features of one image, computed at most once per detector.
///
/// The map lock is only held to find the slot of a detector, so different detectors
/// compute concurrently while callers of the same detector wait for the first one.
#[derive(Debug)]
pub struct FeatureCache<D> {
    slots: Mutex<HashMap<String, Arc<OnceLock<Arc<Features<D>>>>>>,
}

impl<D> FeatureCache<D> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the features cached under `detector`, running `compute` if there are none yet.
    pub fn get_or_compute(
        &self,
        detector: &str,
        compute: impl FnOnce() -> Features<D>,
    ) -> Arc<Features<D>> {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(detector.to_owned())
            .or_default()
            .clone();
        slot.get_or_init(|| Arc::new(compute())).clone()
    }

    /// The features under `detector` if they were already computed.
    pub fn get(&self, detector: &str) -> Option<Arc<Features<D>>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(detector)
            .and_then(|slot| slot.get().cloned())
    }
}

impl<D> Default for FeatureCache<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// An image of a reconstruction. The pixel data is only read by the [`FeatureExtractor`].
#[derive(Debug)]
pub struct Image<P, D> {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub pixels: P,
    cache: FeatureCache<D>,
}

impl<P, D> Image<P, D> {
    pub fn new(name: impl Into<String>, width: u32, height: u32, pixels: P) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            pixels,
            cache: FeatureCache::new(),
        }
    }

    pub fn cache(&self) -> &FeatureCache<D> {
        &self.cache
    }

    /// Detects and describes the features of this image, or returns the cached ones.
    pub fn features<E>(&self, extractor: &E, detector: &str) -> Arc<Features<D>>
    where
        E: FeatureExtractor<Pixels = P, Descriptor = D>,
    {
        self.cache.get_or_compute(detector, || {
            let keypoints = extractor.detect(&self.pixels, detector);
            let descriptors = extractor.describe(&self.pixels, &keypoints, detector);
            info!(
                "extracted {} {} features from {}",
                keypoints.len(),
                detector,
                self.name
            );
            Features::new(keypoints, descriptors)
        })
    }
}
