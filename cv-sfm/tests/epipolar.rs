mod common;

use common::{baseline_pose, random_pose, Scene};
use cv_core::{Correspondence, KeyPoint};
use cv_sfm::{EpipolarEstimator, Error, TwoViewSettings};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// The inliers of the scene followed by `outliers` correspondences to random keypoints.
fn contaminated(
    scene: &Scene,
    outliers: usize,
) -> (Vec<KeyPoint>, Vec<KeyPoint>, Vec<Correspondence>) {
    let mut rng = Pcg64::seed_from_u64(42);
    let mut keypoints_a: Vec<KeyPoint> = scene.a.pixels.iter().map(|&(k, _)| k).collect();
    let mut keypoints_b: Vec<KeyPoint> = scene.b.pixels.iter().map(|&(k, _)| k).collect();
    let mut correspondences: Vec<Correspondence> = (0..scene.points.len())
        .map(|query| Correspondence::new(query, scene.train_of(query), 0.0))
        .collect();
    for _ in 0..outliers {
        correspondences.push(Correspondence::new(
            keypoints_a.len(),
            keypoints_b.len(),
            0.0,
        ));
        keypoints_a.push(KeyPoint::new(
            rng.gen_range(0.0..640.0),
            rng.gen_range(0.0..480.0),
        ));
        keypoints_b.push(KeyPoint::new(
            rng.gen_range(0.0..640.0),
            rng.gen_range(0.0..480.0),
        ));
    }
    (keypoints_a, keypoints_b, correspondences)
}

#[test]
fn outliers_are_pruned() {
    let _ = pretty_env_logger::try_init();
    let scene = Scene::new(10, baseline_pose(), 40);
    let (keypoints_a, keypoints_b, correspondences) = contaminated(&scene, 10);
    let estimator = EpipolarEstimator::new(&TwoViewSettings::default());
    let geometry = estimator
        .estimate(
            &correspondences,
            &keypoints_a,
            &keypoints_b,
            &scene.intrinsics,
            &scene.intrinsics,
        )
        .unwrap();
    // Inliers precede the outliers and keep their order.
    assert!(geometry.correspondences.len() < 45);
    assert_eq!(geometry.correspondences[..40], correspondences[..40]);
}

#[test]
fn pruning_is_idempotent() {
    let _ = pretty_env_logger::try_init();
    let scene = Scene::new(11, baseline_pose(), 40);
    let (keypoints_a, keypoints_b, correspondences) = contaminated(&scene, 10);
    let estimator = EpipolarEstimator::new(&TwoViewSettings::default());
    let estimate = |correspondences: &[Correspondence]| {
        estimator
            .estimate(
                correspondences,
                &keypoints_a,
                &keypoints_b,
                &scene.intrinsics,
                &scene.intrinsics,
            )
            .unwrap()
    };
    let once = estimate(&correspondences);
    let twice = estimate(&once.correspondences);
    assert_eq!(once.correspondences, twice.correspondences);
}

#[test]
fn out_of_bounds_correspondences_are_ignored() {
    let scene = Scene::new(12, baseline_pose(), 20);
    let (keypoints_a, keypoints_b, mut correspondences) = contaminated(&scene, 0);
    correspondences.push(Correspondence::new(1000, 0, 0.0));
    correspondences.push(Correspondence::new(0, 1000, 0.0));
    let geometry = EpipolarEstimator::new(&TwoViewSettings::default())
        .estimate(
            &correspondences,
            &keypoints_a,
            &keypoints_b,
            &scene.intrinsics,
            &scene.intrinsics,
        )
        .unwrap();
    assert_eq!(geometry.correspondences.len(), 20);
}

#[test]
fn too_few_correspondences() {
    let scene = Scene::new(13, baseline_pose(), 20);
    let (keypoints_a, keypoints_b, correspondences) = contaminated(&scene, 0);
    let result = EpipolarEstimator::new(&TwoViewSettings::default()).estimate(
        &correspondences[..7],
        &keypoints_a,
        &keypoints_b,
        &scene.intrinsics,
        &scene.intrinsics,
    );
    assert_eq!(
        result,
        Err(Error::InsufficientGeometry {
            found: 7,
            required: 8
        })
    );
}

/// Noisy inliers followed by `outliers` mismatched pairs of the same keypoints.
///
/// Outliers reuse keypoints of the scene, so dropping them does not change the largest
/// coordinate and with it the inlier threshold.
fn noisy(
    scene: &Scene,
    seed: u64,
    outliers: usize,
) -> (Vec<KeyPoint>, Vec<KeyPoint>, Vec<Correspondence>) {
    let mut rng = Pcg64::seed_from_u64(seed);
    let mut jitter = |keypoint: KeyPoint| {
        KeyPoint::new(
            keypoint.x + rng.gen_range(-1.0..1.0),
            keypoint.y + rng.gen_range(-1.0..1.0),
        )
    };
    let keypoints_a: Vec<KeyPoint> = scene.a.pixels.iter().map(|&(k, _)| jitter(k)).collect();
    let keypoints_b: Vec<KeyPoint> = scene.b.pixels.iter().map(|&(k, _)| jitter(k)).collect();
    let count = scene.points.len();
    let mut correspondences: Vec<Correspondence> = (0..count)
        .map(|query| Correspondence::new(query, scene.train_of(query), 0.0))
        .collect();
    for _ in 0..outliers {
        let query = rng.gen_range(0..count);
        let other = (query + rng.gen_range(1..count)) % count;
        correspondences.push(Correspondence::new(query, scene.train_of(other), 0.0));
    }
    (keypoints_a, keypoints_b, correspondences)
}

#[test]
fn noisy_pruning_is_idempotent() {
    let _ = pretty_env_logger::try_init();
    let estimator = EpipolarEstimator::new(&TwoViewSettings::default());
    for seed in 0..20 {
        let scene = Scene::new(200 + seed, random_pose(seed), 60);
        let (keypoints_a, keypoints_b, correspondences) = noisy(&scene, seed, 15);
        let estimate = |correspondences: &[Correspondence]| {
            estimator
                .estimate(
                    correspondences,
                    &keypoints_a,
                    &keypoints_b,
                    &scene.intrinsics,
                    &scene.intrinsics,
                )
                .unwrap()
        };
        let once = estimate(&correspondences);
        let twice = estimate(&once.correspondences);
        assert_eq!(
            once.correspondences, twice.correspondences,
            "seed {} was pruned further",
            seed
        );
    }
}
