use criterion::{criterion_group, criterion_main, Criterion};
use cv_core::{
    nalgebra::{Point3, Rotation3, Vector3},
    CameraModel, CameraPoint, CameraToCamera, Correspondence, KeyPoint, Pose, WorldToCamera,
};
use cv_pinhole::{CameraIntrinsics, NormalizedKeyPoint};
use cv_sfm::{EpipolarEstimator, Triangulator, TwoViewSettings, View};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

struct Scene {
    intrinsics: CameraIntrinsics,
    pose: CameraToCamera,
    keypoints_a: Vec<KeyPoint>,
    keypoints_b: Vec<KeyPoint>,
    correspondences: Vec<Correspondence>,
}

fn scene(count: usize) -> Scene {
    let mut rng = Pcg64::seed_from_u64(0);
    let intrinsics = CameraIntrinsics::guess_from_dimensions(640, 480);
    let pose = CameraToCamera::from_parts(
        Vector3::new(1.0, 0.0, 0.0),
        Rotation3::from_euler_angles(0.01, -0.02, 0.015),
    );
    let project = |point: CameraPoint| {
        NormalizedKeyPoint::from_camera_point(point).map(|n| intrinsics.uncalibrate(n))
    };
    let (keypoints_a, keypoints_b): (Vec<KeyPoint>, Vec<KeyPoint>) = (0..count)
        .filter_map(|_| {
            let point = CameraPoint::from_point(Point3::new(
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-1.5..1.5),
                rng.gen_range(4.0..8.0),
            ));
            Some((project(point)?, project(pose.transform(point))?))
        })
        .unzip();
    let correspondences = (0..keypoints_a.len())
        .map(|ix| Correspondence::new(ix, ix, 0.0))
        .collect();
    Scene {
        intrinsics,
        pose,
        keypoints_a,
        keypoints_b,
        correspondences,
    }
}

fn triangulate(c: &mut Criterion) {
    let scene = scene(1000);
    let triangulator = Triangulator::default();
    let a = View::new(
        WorldToCamera::identity(),
        scene.intrinsics,
        &scene.keypoints_a,
    );
    let b = View::new(scene.pose.into(), scene.intrinsics, &scene.keypoints_b);
    c.bench_function("triangulate", |bencher| {
        bencher.iter(|| triangulator.triangulate(&a, &b, &scene.correspondences))
    });
}

fn epipolar(c: &mut Criterion) {
    let scene = scene(200);
    let estimator = EpipolarEstimator::new(&TwoViewSettings::default());
    c.bench_function("epipolar", |bencher| {
        bencher.iter(|| {
            estimator.estimate(
                &scene.correspondences,
                &scene.keypoints_a,
                &scene.keypoints_b,
                &scene.intrinsics,
                &scene.intrinsics,
            )
        })
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = triangulate, epipolar
);
criterion_main!(benches);
