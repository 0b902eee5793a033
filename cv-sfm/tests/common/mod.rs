#![allow(dead_code)]

use bitarray::{BitArray, Hamming};
use cv_core::{
    nalgebra::{Point3, Rotation3, Vector3},
    CameraModel, CameraPoint, CameraToCamera, KeyPoint, Pose, Projective,
};
use cv_pinhole::{CameraIntrinsics, NormalizedKeyPoint};
use cv_sfm::{FeatureExtractor, Image};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::sync::atomic::{AtomicUsize, Ordering};

pub type Descriptor = BitArray<32>;
pub type Pixels = Vec<(KeyPoint, Descriptor)>;
pub type SceneImage = Image<Pixels, Descriptor>;

/// Pretends that the pixels of an image are its features.
#[derive(Default)]
pub struct SyntheticExtractor {
    pub detections: AtomicUsize,
}

impl SyntheticExtractor {
    pub fn detections(&self) -> usize {
        self.detections.load(Ordering::SeqCst)
    }
}

impl FeatureExtractor for SyntheticExtractor {
    type Pixels = Pixels;
    type Descriptor = Descriptor;
    type Metric = Hamming;

    fn detect(&self, pixels: &Pixels, _: &str) -> Vec<KeyPoint> {
        self.detections.fetch_add(1, Ordering::SeqCst);
        pixels.iter().map(|&(keypoint, _)| keypoint).collect()
    }

    fn describe(&self, pixels: &Pixels, keypoints: &[KeyPoint], _: &str) -> Vec<Descriptor> {
        pixels
            .iter()
            .take(keypoints.len())
            .map(|&(_, descriptor)| descriptor)
            .collect()
    }

    fn metric(&self) -> Hamming {
        Hamming
    }
}

/// Two synthetic views of random points.
///
/// The features of image `b` are stored in reverse order, so point `i` is keypoint `i` of
/// image `a` and keypoint `len - 1 - i` of image `b`.
pub struct Scene {
    pub pose: CameraToCamera,
    pub intrinsics: CameraIntrinsics,
    pub points: Vec<Point3<f64>>,
    pub a: SceneImage,
    pub b: SceneImage,
}

impl Scene {
    pub fn new(seed: u64, pose: CameraToCamera, count: usize) -> Self {
        let mut rng = Pcg64::seed_from_u64(seed);
        let intrinsics = CameraIntrinsics::guess_from_dimensions(640, 480);
        let points: Vec<Point3<f64>> = (0..count)
            .map(|_| {
                Point3::new(
                    rng.gen_range(-2.0..2.0),
                    rng.gen_range(-1.5..1.5),
                    rng.gen_range(4.0..8.0),
                )
            })
            .collect();
        let descriptors: Vec<Descriptor> = (0..count)
            .map(|_| BitArray::new(rng.gen::<[u8; 32]>()))
            .collect();
        let project = |point: CameraPoint| {
            let normalized = NormalizedKeyPoint::from_camera_point(point).unwrap();
            intrinsics.uncalibrate(normalized)
        };

        let pixels_a: Pixels = points
            .iter()
            .zip(&descriptors)
            .map(|(&p, &d)| (project(CameraPoint::from_point(p)), d))
            .collect();
        let pixels_b: Pixels = points
            .iter()
            .zip(&descriptors)
            .rev()
            .map(|(&p, &d)| (project(pose.transform(CameraPoint::from_point(p))), d))
            .collect();

        Self {
            pose,
            intrinsics,
            points,
            a: Image::new("a", 640, 480, pixels_a),
            b: Image::new("b", 640, 480, pixels_b),
        }
    }

    /// The train index in image `b` of keypoint `query` of image `a`.
    pub fn train_of(&self, query: usize) -> usize {
        self.points.len() - 1 - query
    }
}

pub fn baseline_pose() -> CameraToCamera {
    CameraToCamera::from_parts(
        Vector3::new(1.0, 0.0, 0.0),
        Rotation3::from_euler_angles(0.01, -0.02, 0.015),
    )
}

/// A small random rotation and a random unit translation.
pub fn random_pose(seed: u64) -> CameraToCamera {
    let mut rng = Pcg64::seed_from_u64(seed);
    let mut unit = || {
        Vector3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        )
    };
    let rotation = Rotation3::new(unit() * 0.1);
    let translation = unit().normalize();
    CameraToCamera::from_parts(translation, rotation)
}
